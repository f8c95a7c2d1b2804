// src/mcp/mod.rs
// MCP transport (§6): a thin `rmcp` surface over `dispatch::dispatch`.
//
// A server struct holding a `ToolRouter<Self>`, one `#[tool]`-annotated
// method per tool name, and a manual `ServerHandler` impl for
// `list_tools`/`call_tool`. Every tool method converts its typed request
// straight to a `serde_json::Value` and calls through the dispatch boundary
// instead of a bespoke per-tool handler — the dynamic parameter map means
// the interesting validation logic lives in `dispatch::handlers`, not here.

mod requests;
mod resources;

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, PaginatedRequestParam, ReadResourceRequestParam,
    ReadResourceResult, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{schemars, tool, tool_router, ErrorData, ServerHandler};
use serde_json::Value;

use crate::dispatch::{self, ToolContext};
use requests::*;

fn to_params(req: impl serde::Serialize) -> Value {
    serde_json::to_value(req).unwrap_or(Value::Null)
}

/// Converts a handler's `Result<Value>` into the wire-level tool result.
/// Success is pretty-printed JSON text; failure surfaces
/// `MemoryError::to_user_string` so an AI caller sees the example-payload
/// guidance `missing_field` embeds, per §6/§7.
fn tool_result(result: crate::error::Result<Value>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_user_string())])),
    }
}

/// MCP server state: one `ToolContext` shared across every tool call.
#[derive(Clone)]
pub struct MemoryServer {
    ctx: Arc<ToolContext>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MemoryServer {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Store a conversational memory chunk (problem, solution, code change, discussion, etc.)")]
    async fn store_chunk(
        &self,
        Parameters(req): Parameters<StoreChunkRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "store_chunk", to_params(req)).await)
    }

    #[tool(description = "Store an architecture decision with its rationale")]
    async fn store_decision(
        &self,
        Parameters(req): Parameters<StoreDecisionRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "store_decision", to_params(req)).await)
    }

    #[tool(description = "Semantic search over stored memory with progressive relaxation")]
    async fn search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "search", to_params(req)).await)
    }

    #[tool(description = "Get a repository's recent activity and health summary")]
    async fn get_context(
        &self,
        Parameters(req): Parameters<GetContextRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "get_context", to_params(req)).await)
    }

    #[tool(description = "Find chunks similar to a given chunk")]
    async fn find_similar(
        &self,
        Parameters(req): Parameters<FindSimilarRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "find_similar", to_params(req)).await)
    }

    #[tool(description = "List the most common tags for a repository")]
    async fn get_patterns(
        &self,
        Parameters(req): Parameters<GetPatternsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "get_patterns", to_params(req)).await)
    }

    #[tool(description = "Score a repository's memory health (completion, effectiveness, accessibility, freshness)")]
    async fn health(
        &self,
        Parameters(req): Parameters<HealthRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "health", to_params(req)).await)
    }

    #[tool(description = "List chunks related to a given chunk in either direction")]
    async fn suggest_related(
        &self,
        Parameters(req): Parameters<SuggestRelatedRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "suggest_related", to_params(req)).await)
    }

    #[tool(description = "Export a repository's records as json/markdown/archive, paginated")]
    async fn export_project(
        &self,
        Parameters(req): Parameters<ExportProjectRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "export_project", to_params(req)).await)
    }

    #[tool(description = "Export a repository's records (alias of export_project for bulk workflows)")]
    async fn bulk_export(
        &self,
        Parameters(req): Parameters<ExportProjectRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "bulk_export", to_params(req)).await)
    }

    #[tool(description = "Import a conversation, file, or archive into memory, chunked and classified")]
    async fn import_context(
        &self,
        Parameters(req): Parameters<ImportContextRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "import_context", to_params(req)).await)
    }

    #[tool(description = "Bulk-import a conversation, file, or archive (alias of import_context)")]
    async fn bulk_import(
        &self,
        Parameters(req): Parameters<ImportContextRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "bulk_import", to_params(req)).await)
    }

    #[tool(description = "Report service status: version, embeddings availability, record/relationship totals")]
    async fn status(&self, Parameters(req): Parameters<StatusRequest>) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "status", to_params(req)).await)
    }

    #[tool(description = "Detect conflicting records within a repository")]
    async fn conflicts(
        &self,
        Parameters(req): Parameters<ConflictsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "conflicts", to_params(req)).await)
    }

    #[tool(description = "Find continuity gaps: problems without solutions, unresolved threads")]
    async fn continuity(
        &self,
        Parameters(req): Parameters<ContinuityRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "continuity", to_params(req)).await)
    }

    #[tool(description = "Create a thread grouping related chunks")]
    async fn create_thread(
        &self,
        Parameters(req): Parameters<CreateThreadRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "create_thread", to_params(req)).await)
    }

    #[tool(description = "List threads, optionally filtered by repository/status")]
    async fn get_threads(
        &self,
        Parameters(req): Parameters<GetThreadsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "get_threads", to_params(req)).await)
    }

    #[tool(description = "Detect candidate threads in a repository from chunk clustering")]
    async fn detect_threads(
        &self,
        Parameters(req): Parameters<DetectThreadsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "detect_threads", to_params(req)).await)
    }

    #[tool(description = "Update a thread's status, title, or chunk membership")]
    async fn update_thread(
        &self,
        Parameters(req): Parameters<UpdateThreadRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "update_thread", to_params(req)).await)
    }

    #[tool(description = "Compare tag patterns across multiple repositories")]
    async fn analyze_cross_repo_patterns(
        &self,
        Parameters(req): Parameters<AnalyzeCrossRepoPatternsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "analyze_cross_repo_patterns", to_params(req)).await)
    }

    #[tool(description = "Find sibling repositories by name-slug overlap that also hold memory")]
    async fn find_similar_repositories(
        &self,
        Parameters(req): Parameters<FindSimilarRepositoriesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "find_similar_repositories", to_params(req)).await)
    }

    #[tool(description = "Combined health/coverage/continuity/trend dashboard for a repository")]
    async fn memory_health_dashboard(
        &self,
        Parameters(req): Parameters<MemoryHealthDashboardRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "memory_health_dashboard", to_params(req)).await)
    }

    #[tool(description = "Run or inspect the retention-floor decay scheduler")]
    async fn decay_management(
        &self,
        Parameters(req): Parameters<DecayManagementRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "decay_management", to_params(req)).await)
    }

    #[tool(description = "Create a typed relationship edge between two chunks")]
    async fn link(&self, Parameters(req): Parameters<LinkRequest>) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "link", to_params(req)).await)
    }

    #[tool(description = "List a chunk's relationships, optionally filtered by direction/type/confidence")]
    async fn get_relationships(
        &self,
        Parameters(req): Parameters<GetRelationshipsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "get_relationships", to_params(req)).await)
    }

    #[tool(description = "Breadth-first traversal of the relationship graph from a starting chunk")]
    async fn traverse_graph(
        &self,
        Parameters(req): Parameters<TraverseGraphRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "traverse_graph", to_params(req)).await)
    }

    #[tool(description = "Auto-detect relationships for a chunk against recent history")]
    async fn auto_detect_relationships(
        &self,
        Parameters(req): Parameters<AutoDetectRelationshipsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "auto_detect_relationships", to_params(req)).await)
    }

    #[tool(description = "Update a relationship's confidence and confidence factors")]
    async fn update_relationship(
        &self,
        Parameters(req): Parameters<UpdateRelationshipRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "update_relationship", to_params(req)).await)
    }

    #[tool(description = "Score a chunk's freshness and suggest an action (keep/flag/refresh/archive)")]
    async fn check_freshness(
        &self,
        Parameters(req): Parameters<CheckFreshnessRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "check_freshness", to_params(req)).await)
    }

    #[tool(description = "Mark a chunk as refreshed, resetting its freshness clock")]
    async fn mark_refreshed(
        &self,
        Parameters(req): Parameters<MarkRefreshedRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "mark_refreshed", to_params(req)).await)
    }

    #[tool(description = "Generate a bibliography for a set of chunks in a citation style")]
    async fn generate_citations(
        &self,
        Parameters(req): Parameters<GenerateCitationsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "generate_citations", to_params(req)).await)
    }

    #[tool(description = "Format an inline citation token for a bibliography entry index")]
    async fn create_inline_citation(
        &self,
        Parameters(req): Parameters<CreateInlineCitationRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "create_inline_citation", to_params(req)).await)
    }

    #[tool(description = "Run a batched store/update/delete operation with conflict policy and progress tracking")]
    async fn bulk_operation(
        &self,
        Parameters(req): Parameters<BulkOperationRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "bulk_operation", to_params(req)).await)
    }

    #[tool(description = "Poll the progress of a running bulk operation")]
    async fn get_bulk_progress(
        &self,
        Parameters(req): Parameters<GetBulkProgressRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "get_bulk_progress", to_params(req)).await)
    }

    #[tool(description = "Create a named alias: a shortcut, saved query, or chunk collection")]
    async fn create_alias(
        &self,
        Parameters(req): Parameters<CreateAliasRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "create_alias", to_params(req)).await)
    }

    #[tool(description = "Resolve an alias to the records it points at")]
    async fn resolve_alias(
        &self,
        Parameters(req): Parameters<ResolveAliasRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "resolve_alias", to_params(req)).await)
    }

    #[tool(description = "List aliases, optionally filtered by repository")]
    async fn list_aliases(
        &self,
        Parameters(req): Parameters<ListAliasesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(dispatch::dispatch(&self.ctx, "list_aliases", to_params(req)).await)
    }
}

impl ServerHandler for MemoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: rmcp::model::Implementation {
                name: self.ctx.config.service_name.clone(),
                title: Some("Conversational memory engine".into()),
                version: self.ctx.config.service_version.clone(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Stores and retrieves conversational memory across coding sessions: problems, \
                 solutions, decisions, and the relationships between them. Prefer `search` before \
                 `store_chunk` to avoid duplicating existing memory."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }

    fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, ErrorData>> + Send + '_ {
        self.handle_list_resources(request, context)
    }

    fn list_resource_templates(
        &self,
        request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, ErrorData>> + Send + '_
    {
        self.handle_list_resource_templates(request, context)
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, ErrorData>> + Send + '_ {
        self.handle_read_resource(request, context)
    }
}
