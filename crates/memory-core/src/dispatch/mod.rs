// src/dispatch/mod.rs
// `ToolDispatch` (§4.13): the mapping-in/mapping-out boundary every transport
// (rmcp today, anything else tomorrow) calls through. Handlers never see a
// typed request/response DTO — only `serde_json::Value` — so the transport
// layer is the only place that knows about wire schemas.
//
// Dispatch-by-name shape, generalized from a fixed enum of operation kinds
// to a flat tool-name string — a dynamic parameter map needs a mapping gate
// at the dispatch boundary, not a typed enum.

pub mod handlers;

use std::sync::Arc;

use serde_json::Value;

use crate::bulk::{AliasManager, BulkEngine};
use crate::conflicts::ConflictDetector;
use crate::config::EngineConfig;
use crate::decay::DecayScheduler;
use crate::embeddings::Embeddings;
use crate::chunking::Chunking;
use crate::error::{MemoryError, Result};
use crate::relationships::RelationshipGraph;
use crate::search::SearchEngine;
use crate::store::VectorStore;
use crate::threads::ThreadManager;

/// Everything a handler needs, bundled once at startup and shared behind
/// `Arc` by the transport layer (`mcp::MemoryServer` holds one of these).
pub struct ToolContext {
    pub store: Arc<dyn VectorStore>,
    pub embeddings: Arc<dyn Embeddings>,
    pub chunking: Arc<dyn Chunking>,
    pub search_engine: SearchEngine,
    pub relationships: RelationshipGraph,
    pub threads: ThreadManager,
    pub bulk: BulkEngine,
    pub aliases: AliasManager,
    pub decay: Arc<DecayScheduler>,
    pub config: EngineConfig,
}

impl ToolContext {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<dyn Embeddings>,
        chunking: Arc<dyn Chunking>,
        config: EngineConfig,
    ) -> Self {
        let search_engine = SearchEngine::new(
            store.clone(),
            embeddings.clone(),
            crate::search::SearchEngineConfig {
                progressive_search: config.progressive_search,
                relaxed_min_relevance: config.relaxed_min_relevance,
                broadest_min_relevance: config.broadest_min_relevance,
                max_related_repos: config.max_related_repos,
            },
        );
        let decay = Arc::new(DecayScheduler::new(
            store.clone(),
            config.retention_days,
            std::time::Duration::from_secs(config.decay_interval_hours * 3600),
        ));
        Self {
            relationships: RelationshipGraph::new(store.clone()),
            threads: ThreadManager::new(store.clone()),
            bulk: BulkEngine::new(store.clone()),
            aliases: AliasManager::new(store.clone()),
            search_engine,
            decay,
            store,
            embeddings,
            chunking,
            config,
        }
    }
}

/// Dispatches `tool` against `params`, wrapping the call in a tracing span
/// per §4.14. Unknown tool names are a `Validation` error, not a panic — an
/// AI caller may pass a typo'd name and should get a recoverable response.
pub async fn dispatch(ctx: &ToolContext, tool: &str, params: Value) -> Result<Value> {
    let span = tracing::info_span!("tool_dispatch", tool = %tool);
    let _enter = span.enter();
    tracing::debug!(params = %params, "dispatching tool call");

    let result = match tool {
        "store_chunk" => handlers::store_chunk(ctx, &params).await,
        "search" => handlers::search(ctx, &params).await,
        "get_context" => handlers::get_context(ctx, &params).await,
        "store_decision" => handlers::store_decision(ctx, &params).await,
        "find_similar" => handlers::find_similar(ctx, &params).await,
        "get_patterns" => handlers::get_patterns(ctx, &params).await,
        "health" => handlers::health(ctx, &params).await,
        "suggest_related" => handlers::suggest_related(ctx, &params).await,
        "export_project" => handlers::export_project(ctx, &params).await,
        "import_context" => handlers::import_context(ctx, &params).await,
        "status" => handlers::status(ctx, &params).await,
        "conflicts" => handlers::conflicts(ctx, &params).await,
        "continuity" => handlers::continuity(ctx, &params).await,
        "create_thread" => handlers::create_thread(ctx, &params).await,
        "get_threads" => handlers::get_threads(ctx, &params).await,
        "detect_threads" => handlers::detect_threads(ctx, &params).await,
        "update_thread" => handlers::update_thread(ctx, &params).await,
        "analyze_cross_repo_patterns" => handlers::analyze_cross_repo_patterns(ctx, &params).await,
        "find_similar_repositories" => handlers::find_similar_repositories(ctx, &params).await,
        "memory_health_dashboard" => handlers::memory_health_dashboard(ctx, &params).await,
        "decay_management" => handlers::decay_management(ctx, &params).await,
        "link" => handlers::link(ctx, &params).await,
        "get_relationships" => handlers::get_relationships(ctx, &params).await,
        "traverse_graph" => handlers::traverse_graph(ctx, &params).await,
        "auto_detect_relationships" => handlers::auto_detect_relationships(ctx, &params).await,
        "update_relationship" => handlers::update_relationship(ctx, &params).await,
        "check_freshness" => handlers::check_freshness(ctx, &params).await,
        "mark_refreshed" => handlers::mark_refreshed(ctx, &params).await,
        "generate_citations" => handlers::generate_citations(ctx, &params).await,
        "create_inline_citation" => handlers::create_inline_citation(ctx, &params).await,
        "bulk_operation" => handlers::bulk_operation(ctx, &params).await,
        "bulk_import" => handlers::bulk_import(ctx, &params).await,
        "bulk_export" => handlers::bulk_export(ctx, &params).await,
        "create_alias" => handlers::create_alias(ctx, &params).await,
        "resolve_alias" => handlers::resolve_alias(ctx, &params).await,
        "list_aliases" => handlers::list_aliases(ctx, &params).await,
        "get_bulk_progress" => handlers::get_bulk_progress(ctx, &params).await,
        other => Err(MemoryError::Validation(format!("unknown tool '{other}'"))),
    };

    match &result {
        Ok(_) => tracing::info!(tool = %tool, "tool call succeeded"),
        Err(e) => tracing::warn!(tool = %tool, error = %e, "tool call failed"),
    }
    result
}

// ───────────────────────────── param extraction ─────────────────────────────
// Small dynamic-map accessors shared by every handler (§4.13 step 1: validate
// required params with a descriptive error + example payload).

pub(crate) fn require_str<'a>(
    params: &'a Value,
    field: &str,
    tool: &str,
    example: &str,
) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MemoryError::missing_field(tool, field, example))
}

pub(crate) fn opt_str(params: &Value, field: &str) -> Option<String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn opt_str_vec(params: &Value, field: &str) -> Vec<String> {
    params
        .get(field)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn opt_u64(params: &Value, field: &str, default: u64) -> u64 {
    params.get(field).and_then(Value::as_u64).unwrap_or(default)
}

pub(crate) fn opt_f64(params: &Value, field: &str, default: f64) -> f64 {
    params.get(field).and_then(Value::as_f64).unwrap_or(default)
}

pub(crate) fn opt_bool(params: &Value, field: &str, default: bool) -> bool {
    params
        .get(field)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

pub(crate) fn normalized_repository(params: &Value, field: &str) -> String {
    crate::session::normalize_repository(&opt_str(params, field).unwrap_or_default())
}
