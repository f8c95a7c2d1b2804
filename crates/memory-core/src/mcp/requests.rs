// src/mcp/requests.rs
// Typed per-tool request DTOs. These exist purely for the MCP transport's
// JSON Schema generation (`Parameters<T>` below) — every field is converted
// straight back to a `serde_json::Value` map before it reaches
// `dispatch::dispatch`, so there is no duplicated validation here.

use rmcp::schemars;
use serde::Deserialize;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StoreChunkRequest {
    #[schemars(description = "Content to remember")]
    pub content: String,
    #[schemars(description = "Session identifier")]
    pub session_id: String,
    #[schemars(description = "Repository/project this chunk belongs to")]
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub files_modified: Option<Vec<String>>,
    pub tools_used: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    #[schemars(description = "Record type: problem/solution/architecture_decision/code_change/analysis/task/general")]
    pub r#type: Option<String>,
    #[schemars(description = "Outcome: success/partial/failure/unknown")]
    pub outcome: Option<String>,
    #[schemars(description = "Difficulty: trivial/simple/moderate/complex/expert")]
    pub difficulty: Option<String>,
    pub task_status: Option<String>,
    pub task_priority: Option<String>,
    pub client_type: Option<String>,
    #[schemars(description = "Chunk ID this one continues from")]
    pub parent_chunk: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StoreDecisionRequest {
    #[schemars(description = "The decision made")]
    pub decision: String,
    #[schemars(description = "Why it was made")]
    pub rationale: String,
    pub session_id: String,
    pub repository: Option<String>,
    pub tags: Option<Vec<String>>,
    pub client_type: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    #[schemars(description = "Natural-language search query")]
    pub query: String,
    pub repository: Option<String>,
    #[schemars(description = "Restrict to these record types")]
    pub types: Option<Vec<String>>,
    #[schemars(description = "recent/last_month/all_time")]
    pub recency: Option<String>,
    pub limit: Option<u64>,
    pub min_relevance: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetContextRequest {
    pub repository: String,
    #[schemars(description = "Window size in days for the 'recent' bucket")]
    pub recent_days: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindSimilarRequest {
    pub chunk_id: String,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetPatternsRequest {
    pub repository: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct HealthRequest {
    pub repository: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SuggestRelatedRequest {
    pub chunk_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExportProjectRequest {
    pub repository: String,
    #[schemars(description = "json/markdown/archive")]
    pub format: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub include_embeddings: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ImportContextRequest {
    pub repository: Option<String>,
    pub session_id: Option<String>,
    pub source_system: Option<String>,
    #[schemars(description = "Raw conversation text to import")]
    pub conversation: Option<String>,
    pub file_name: Option<String>,
    pub file_content: Option<String>,
    #[schemars(description = "Base64-encoded archive contents")]
    pub archive: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StatusRequest {}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ConflictsRequest {
    pub repository: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ContinuityRequest {
    pub repository: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateThreadRequest {
    pub chunk_ids: Vec<String>,
    #[schemars(description = "debugging/feature/refactor/conversation/review/incident")]
    pub r#type: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetThreadsRequest {
    pub repository: Option<String>,
    #[schemars(description = "active/paused/resolved/abandoned/archived")]
    pub status: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DetectThreadsRequest {
    pub repository: String,
    pub min_thread_size: Option<u64>,
    pub auto_create: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateThreadRequest {
    pub thread_id: String,
    pub status: Option<String>,
    pub title: Option<String>,
    pub add_chunk_ids: Option<Vec<String>>,
    pub remove_chunk_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AnalyzeCrossRepoPatternsRequest {
    pub repositories: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FindSimilarRepositoriesRequest {
    pub repository: String,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MemoryHealthDashboardRequest {
    pub repository: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DecayManagementRequest {
    #[schemars(description = "run_once/status")]
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LinkRequest {
    pub source_id: String,
    pub target_id: String,
    #[schemars(description = "e.g. related_to, causes, blocks, depends_on, parent_child")]
    pub relation_type: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetRelationshipsRequest {
    pub chunk_id: String,
    #[schemars(description = "outgoing/incoming/either")]
    pub direction: Option<String>,
    pub relation_type: Option<String>,
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TraverseGraphRequest {
    pub start_chunk_id: String,
    pub max_depth: Option<u64>,
    pub relation_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AutoDetectRelationshipsRequest {
    pub chunk_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateRelationshipRequest {
    pub relationship_id: String,
    pub confidence: Option<f64>,
    #[schemars(description = "Confidence factor overrides, e.g. {\"user_certainty\": 0.9}")]
    pub factors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CheckFreshnessRequest {
    pub chunk_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MarkRefreshedRequest {
    pub chunk_id: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GenerateCitationsRequest {
    pub chunk_ids: Vec<String>,
    #[schemars(description = "simple/apa/mla/chicago")]
    pub style: Option<String>,
    pub group_by_repository: Option<bool>,
    pub group_by_type: Option<bool>,
    pub include_excerpt: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateInlineCitationRequest {
    #[schemars(description = "1-based bibliography entry index")]
    pub index: u64,
    #[schemars(description = "bracket/caret/paren")]
    pub style: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct BulkOperationRequest {
    #[schemars(description = "store/update/delete")]
    pub operation: String,
    #[schemars(description = "Records (store/update) or chunk IDs (delete)")]
    pub items: Vec<serde_json::Value>,
    pub batch_size: Option<u64>,
    pub max_concurrency: Option<u64>,
    #[schemars(description = "skip/overwrite/merge/fail")]
    pub conflict_policy: Option<String>,
    pub continue_on_error: Option<bool>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetBulkProgressRequest {
    pub operation_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateAliasRequest {
    pub name: String,
    #[schemars(description = "shortcut/query/collection")]
    pub r#type: Option<String>,
    pub description: Option<String>,
    #[schemars(description = "{\"kind\": \"chunk_ids\", \"chunk_ids\": [...]} or {\"kind\": \"query\", \"query\": \"...\", \"limit\": 10}")]
    pub target: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ResolveAliasRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListAliasesRequest {
    pub repository: Option<String>,
}
