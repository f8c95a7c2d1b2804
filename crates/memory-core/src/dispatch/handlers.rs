// src/dispatch/handlers.rs
// One function per tool named in spec §6. Every handler: validates required
// params (step 1), normalizes repository/session (step 2), delegates to the
// relevant engine/manager (step 3), returns a mapping-shaped `Value` (step 4).

use chrono::Utc;
use memory_types::{
    Alias, AliasMetadata, AliasTarget, AliasType, ConfidenceFactors, Record, RecordType,
    RelationType, Relationship, Thread, ThreadType,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::bulk::{BulkOperation, ConflictPolicy};
use crate::citation::{BibliographyOptions, CitationEngine, CitationStyle, InlineStyle};
use crate::conflicts::ConflictDetector;
use crate::error::{MemoryError, Result};
use crate::freshness::FreshnessManager;
use crate::record::{build_record, NewRecordInput};
use crate::search::{Recency, SearchRequest};
use crate::store::{RelationshipQuery, ThreadQuery};
use crate::threads::{CreateThreadInput, DetectionConfig as ThreadDetectionConfig, UpdateThreadInput};

use super::{
    normalized_repository, opt_bool, opt_f64, opt_str, opt_str_vec, opt_u64, require_str,
    ToolContext,
};

fn parse_field<T: DeserializeOwned>(params: &Value, field: &str) -> Result<Option<T>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| MemoryError::Validation(format!("invalid '{field}': {e}"))),
    }
}

fn record_json(record: &Record) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

async fn fetch_record(ctx: &ToolContext, id: &str) -> Result<Record> {
    ctx.store
        .get_by_id(id)
        .await?
        .ok_or_else(|| MemoryError::NotFound(format!("chunk {id}")))
}

// ───────────────────────────── records ─────────────────────────────

pub async fn store_chunk(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let content = require_str(
        params,
        "content",
        "store_chunk",
        "{\"content\": \"...\", \"session_id\": \"s1\"}",
    )?;
    let session_id = require_str(
        params,
        "session_id",
        "store_chunk",
        "{\"content\": \"...\", \"session_id\": \"s1\"}",
    )?;
    let record_type: Option<RecordType> = parse_field(params, "type")?;

    let mut record = build_record(NewRecordInput {
        content: content.to_string(),
        summary: opt_str(params, "summary"),
        record_type,
        repository: opt_str(params, "repository"),
        session: session_id.to_string(),
        branch: opt_str(params, "branch"),
        files_modified: opt_str_vec(params, "files_modified"),
        tools_used: opt_str_vec(params, "tools_used"),
        tags: opt_str_vec(params, "tags"),
        outcome: parse_field(params, "outcome")?,
        difficulty: parse_field(params, "difficulty")?,
        task_status: opt_str(params, "task_status"),
        task_priority: opt_str(params, "task_priority"),
        client_type: opt_str(params, "client_type"),
        parent_chunk: opt_str(params, "parent_chunk"),
    })?;

    if let Ok(embedding) = ctx.embeddings.embed(&record.content).await {
        record.embedding = Some(embedding);
    }
    ctx.store.store(&record).await?;

    if let Some(parent) = ctx.relationships.create_parent_child(&record).await? {
        tracing::debug!(relationship = %parent.id, "created parent_child relationship");
    }

    // Relationship auto-detection runs after the write, best-effort (§4.5/§5).
    let record_for_detection = record.clone();
    let relationships_store = ctx.store.clone();
    tokio::spawn(async move {
        let graph = crate::relationships::RelationshipGraph::new(relationships_store);
        if let Err(e) = graph
            .auto_detect(&record_for_detection, &Default::default())
            .await
        {
            tracing::warn!(error = %e, "relationship auto-detection failed, dropping");
        }
    });

    Ok(json!({
        "chunk_id": record.id,
        "type": record.record_type.as_str(),
        "summary": record.summary,
        "stored_at": record.timestamp.to_rfc3339(),
    }))
}

pub async fn store_decision(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let decision = require_str(
        params,
        "decision",
        "store_decision",
        "{\"decision\": \"use async\", \"rationale\": \"...\", \"session_id\": \"s1\"}",
    )?;
    let rationale = require_str(
        params,
        "rationale",
        "store_decision",
        "{\"decision\": \"use async\", \"rationale\": \"...\", \"session_id\": \"s1\"}",
    )?;
    let session_id = require_str(
        params,
        "session_id",
        "store_decision",
        "{\"decision\": \"use async\", \"rationale\": \"...\", \"session_id\": \"s1\"}",
    )?;

    let content = format!("{decision}\n\nRationale: {rationale}");
    let mut record = build_record(NewRecordInput {
        content,
        summary: Some(decision.to_string()),
        record_type: Some(RecordType::ArchitectureDecision),
        repository: opt_str(params, "repository"),
        session: session_id.to_string(),
        tags: opt_str_vec(params, "tags"),
        client_type: opt_str(params, "client_type"),
        ..Default::default()
    })?;

    if let Ok(embedding) = ctx.embeddings.embed(&record.content).await {
        record.embedding = Some(embedding);
    }
    ctx.store.store(&record).await?;

    Ok(json!({
        "chunk_id": record.id,
        "type": record.record_type.as_str(),
        "summary": record.summary,
        "stored_at": record.timestamp.to_rfc3339(),
    }))
}

pub async fn search(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let query = require_str(params, "query", "search", "{\"query\": \"jwt rotation\"}")?;
    let recency: Recency = opt_str(params, "recency")
        .unwrap_or_default()
        .parse()
        .map_err(MemoryError::Validation)?;
    let types: Vec<RecordType> = opt_str_vec(params, "types")
        .iter()
        .filter_map(|t| t.parse().ok())
        .collect();
    let limit = opt_u64(params, "limit", 10).clamp(1, 50) as usize;
    let min_relevance = opt_f64(params, "min_relevance", 0.7).clamp(0.0, 1.0);

    let request = SearchRequest {
        query: query.to_string(),
        repository: opt_str(params, "repository"),
        types,
        recency,
        limit,
        min_relevance,
    };
    let outcome = ctx.search_engine.search(&request).await?;

    Ok(json!({
        "query": query,
        "total": outcome.results.len(),
        "query_time_ms": outcome.query_time.as_millis(),
        "stage": outcome.stage,
        "results": outcome.results.iter().map(|scored| json!({
            "chunk": record_json(&scored.record),
            "score": scored.score,
            "explanation": scored.explanation,
        })).collect::<Vec<_>>(),
    }))
}

pub async fn get_context(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "get_context", "{\"repository\": \"my-repo\"}")?;
    let recent_days = opt_u64(params, "recent_days", 7).clamp(1, 90);
    let since = Utc::now() - chrono::Duration::days(recent_days as i64);

    let all = ctx.store.get_all_chunks(Some(repository)).await?;
    let recent: Vec<&Record> = all.iter().filter(|r| r.timestamp >= since).collect();

    let health = crate::analytics::AnalyticsEngine::health(&all);
    let patterns = crate::analytics::AnalyticsEngine::patterns(&all);

    Ok(json!({
        "repository": repository,
        "recent_days": recent_days,
        "recent_count": recent.len(),
        "recent": recent.iter().map(|r| record_json(r)).collect::<Vec<_>>(),
        "health_score": health.score,
        "patterns": patterns.iter().map(|p| json!({"tag": p.tag, "count": p.count})).collect::<Vec<_>>(),
    }))
}

pub async fn find_similar(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_id = require_str(params, "chunk_id", "find_similar", "{\"chunk_id\": \"<id>\"}")?;
    let record = fetch_record(ctx, chunk_id).await?;
    let limit = opt_u64(params, "limit", 10).clamp(1, 50) as usize;

    let request = SearchRequest {
        query: record.summary.clone(),
        repository: Some(record.metadata.repository.clone()),
        types: Vec::new(),
        recency: Recency::AllTime,
        limit: limit + 1,
        min_relevance: 0.0,
    };
    let outcome = ctx.search_engine.search_scoped(&request).await?;
    let results: Vec<Value> = outcome
        .results
        .into_iter()
        .filter(|s| s.record.id != chunk_id)
        .take(limit)
        .map(|s| json!({ "chunk": record_json(&s.record), "score": s.score }))
        .collect();

    Ok(json!({ "chunk_id": chunk_id, "similar": results }))
}

pub async fn get_patterns(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "get_patterns", "{\"repository\": \"my-repo\"}")?;
    let records = ctx.store.get_all_chunks(Some(repository)).await?;
    let patterns = crate::analytics::AnalyticsEngine::patterns(&records);
    Ok(json!({
        "repository": repository,
        "patterns": patterns.iter().map(|p| json!({"tag": p.tag, "count": p.count})).collect::<Vec<_>>(),
    }))
}

pub async fn health(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "health", "{\"repository\": \"my-repo\"}")?;
    let records = ctx.store.get_all_chunks(Some(repository)).await?;
    let report = crate::analytics::AnalyticsEngine::health(&records);
    Ok(json!({
        "repository": repository,
        "score": report.score,
        "band": format!("{:?}", report.band),
        "completion": report.completion,
        "effectiveness": report.effectiveness,
        "accessibility": report.accessibility,
        "freshness": report.freshness,
    }))
}

pub async fn suggest_related(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_id = require_str(params, "chunk_id", "suggest_related", "{\"chunk_id\": \"<id>\"}")?;
    let query = RelationshipQuery {
        source_id: Some(chunk_id.to_string()),
        target_id: None,
        relation_type: None,
        min_confidence: None,
    };
    let outgoing = ctx.relationships.get_relationships(&query).await?;
    let query = RelationshipQuery {
        source_id: None,
        target_id: Some(chunk_id.to_string()),
        relation_type: None,
        min_confidence: None,
    };
    let incoming = ctx.relationships.get_relationships(&query).await?;

    Ok(json!({
        "chunk_id": chunk_id,
        "outgoing": outgoing.iter().map(relationship_json).collect::<Vec<_>>(),
        "incoming": incoming.iter().map(relationship_json).collect::<Vec<_>>(),
    }))
}

// ───────────────────────────── export / import ─────────────────────────────

fn parse_export_format(params: &Value) -> crate::bulk::ExportFormat {
    use crate::bulk::ExportFormat::*;
    match opt_str(params, "format").as_deref() {
        Some("markdown") => Markdown,
        Some("archive") => Archive,
        _ => Json,
    }
}

pub async fn export_project(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "export_project", "{\"repository\": \"my-repo\"}")?;
    let page = crate::bulk::import_export::export_page(
        &ctx.store,
        repository,
        parse_export_format(params),
        opt_u64(params, "offset", 0) as usize,
        opt_u64(params, "limit", 0) as usize,
        opt_bool(params, "include_embeddings", false),
    )
    .await?;
    Ok(json!({
        "content": page.content,
        "returned": page.returned,
        "offset": page.offset,
        "has_more": page.has_more,
    }))
}

pub async fn bulk_export(ctx: &ToolContext, params: &Value) -> Result<Value> {
    export_project(ctx, params).await
}

pub async fn import_context(ctx: &ToolContext, params: &Value) -> Result<Value> {
    bulk_import(ctx, params).await
}

pub async fn bulk_import(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = normalized_repository(params, "repository");
    let session_id = opt_str(params, "session_id").unwrap_or_else(|| "import".to_string());
    let source_system = opt_str(params, "source_system").unwrap_or_else(|| "unknown".to_string());

    let source = if let Some(conversation) = opt_str(params, "conversation") {
        crate::bulk::ImportSource::Conversation(conversation)
    } else if let Some(content) = opt_str(params, "file_content") {
        let name = opt_str(params, "file_name").unwrap_or_else(|| "import.txt".to_string());
        crate::bulk::ImportSource::File { name, content }
    } else if let Some(archive) = opt_str(params, "archive") {
        crate::bulk::ImportSource::Archive(archive)
    } else {
        return Err(MemoryError::missing_field(
            "import_context",
            "conversation|file_content|archive",
            "{\"conversation\": \"...\", \"repository\": \"my-repo\", \"session_id\": \"s1\"}",
        ));
    };

    let result = crate::bulk::import_export::import(
        source,
        &repository,
        &session_id,
        &source_system,
        ctx.chunking.as_ref(),
        &ctx.embeddings,
        &ctx.store,
    )
    .await?;

    Ok(json!({ "stored": result.stored, "errors": result.errors }))
}

// ───────────────────────────── status / conflicts / continuity ─────────────

pub async fn status(ctx: &ToolContext, _params: &Value) -> Result<Value> {
    let stats = ctx.store.get_stats().await?;
    Ok(json!({
        "service": ctx.config.service_name,
        "version": ctx.config.service_version,
        "has_embeddings": ctx.config.has_embeddings(),
        "retention_days": ctx.config.retention_days,
        "total_records": stats.total_records,
        "total_relationships": stats.total_relationships,
        "repositories": stats.repositories,
    }))
}

pub async fn conflicts(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "conflicts", "{\"repository\": \"my-repo\"}")?;
    let records = ctx.store.get_all_chunks(Some(repository)).await?;
    let found = ConflictDetector::detect(&records);
    Ok(json!({
        "repository": repository,
        "conflicts": found.iter().map(conflict_json).collect::<Vec<_>>(),
    }))
}

fn conflict_json(c: &crate::conflicts::Conflict) -> Value {
    json!({
        "kind": format!("{:?}", c.kind),
        "severity": format!("{:?}", c.severity),
        "confidence": c.confidence,
        "primary_chunk_id": c.primary_chunk_id,
        "conflict_chunk_id": c.conflict_chunk_id,
        "description": c.description,
        "resolutions": c.resolutions.iter().map(|r| json!({
            "strategy": format!("{:?}", r.strategy),
            "steps": r.steps,
            "benefits": r.benefits,
            "risks": r.risks,
        })).collect::<Vec<_>>(),
    })
}

pub async fn continuity(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "continuity", "{\"repository\": \"my-repo\"}")?;
    let records = ctx.store.get_all_chunks(Some(repository)).await?;
    let issues = crate::analytics::AnalyticsEngine::continuity(&records);
    Ok(json!({
        "repository": repository,
        "issues": issues.iter().map(|i| json!({
            "record_id": i.record_id,
            "reason": i.reason,
            "suggestion": i.suggestion,
        })).collect::<Vec<_>>(),
    }))
}

// ───────────────────────────── threads ─────────────────────────────

fn thread_json(t: &Thread) -> Value {
    serde_json::to_value(t).unwrap_or(Value::Null)
}

pub async fn create_thread(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_ids = opt_str_vec(params, "chunk_ids");
    if chunk_ids.is_empty() {
        return Err(MemoryError::missing_field(
            "create_thread",
            "chunk_ids",
            "{\"chunk_ids\": [\"<id>\"], \"type\": \"debugging\"}",
        ));
    }
    let thread_type: ThreadType = parse_field(params, "type")?.unwrap_or(ThreadType::Conversation);
    let thread = ctx
        .threads
        .create(CreateThreadInput {
            chunk_ids,
            thread_type,
            title: opt_str(params, "title"),
            tags: opt_str_vec(params, "tags"),
            priority: opt_str(params, "priority"),
        })
        .await?;
    Ok(thread_json(&thread))
}

pub async fn get_threads(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let query = ThreadQuery {
        repository: opt_str(params, "repository"),
        status: parse_field(params, "status")?,
        limit: opt_u64(params, "limit", 50) as usize,
    };
    let threads = ctx.threads.list(&query).await?;
    Ok(json!({ "threads": threads.iter().map(thread_json).collect::<Vec<_>>() }))
}

pub async fn detect_threads(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(params, "repository", "detect_threads", "{\"repository\": \"my-repo\"}")?;
    let config = ThreadDetectionConfig {
        min_thread_size: opt_u64(params, "min_thread_size", 2) as usize,
        auto_create: opt_bool(params, "auto_create", true),
    };
    let detected = ctx.threads.detect(repository, &config).await?;
    Ok(json!({
        "repository": repository,
        "detected": detected.iter().map(|d| json!({
            "thread": thread_json(&d.thread),
            "detection_method": d.detection_method,
        })).collect::<Vec<_>>(),
    }))
}

pub async fn update_thread(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let thread_id = require_str(params, "thread_id", "update_thread", "{\"thread_id\": \"<id>\"}")?;
    let input = UpdateThreadInput {
        status: parse_field(params, "status")?,
        title: opt_str(params, "title"),
        add_chunk_ids: opt_str_vec(params, "add_chunk_ids"),
        remove_chunk_ids: opt_str_vec(params, "remove_chunk_ids"),
    };
    let thread = ctx.threads.update(thread_id, input).await?;
    Ok(thread_json(&thread))
}

// ───────────────────────────── analytics ─────────────────────────────

pub async fn analyze_cross_repo_patterns(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repositories = opt_str_vec(params, "repositories");
    if repositories.is_empty() {
        return Err(MemoryError::missing_field(
            "analyze_cross_repo_patterns",
            "repositories",
            "{\"repositories\": [\"repo-a\", \"repo-b\"]}",
        ));
    }
    let mut per_repo = Vec::new();
    for repository in &repositories {
        let records = ctx.store.get_all_chunks(Some(repository)).await?;
        let patterns = crate::analytics::AnalyticsEngine::patterns(&records);
        per_repo.push(json!({
            "repository": repository,
            "patterns": patterns.iter().map(|p| json!({"tag": p.tag, "count": p.count})).collect::<Vec<_>>(),
        }));
    }
    Ok(json!({ "repositories": per_repo }))
}

pub async fn find_similar_repositories(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(
        params,
        "repository",
        "find_similar_repositories",
        "{\"repository\": \"github.com/my-org/my-repo\"}",
    )?;
    let limit = opt_u64(params, "limit", 5) as usize;
    let candidates = candidate_repository_names(repository, limit);
    let mut found = Vec::new();
    for candidate in candidates {
        let count = ctx.store.count_by_repository(&candidate).await?;
        if count > 0 {
            found.push(json!({ "repository": candidate, "record_count": count }));
        }
    }
    Ok(json!({ "repository": repository, "similar": found }))
}

/// Derives sibling repository name candidates by splitting on path/slug
/// separators, same idea as `search::related_repositories` (kept local here
/// since that helper is private to the search-relaxation stage it serves).
fn candidate_repository_names(name: &str, max: usize) -> Vec<String> {
    const SEPARATORS: [char; 4] = ['/', '-', '_', '.'];
    let Some(sep) = SEPARATORS.iter().find(|c| name.contains(**c)).copied() else {
        return Vec::new();
    };
    let parts: Vec<&str> = name.split(sep).collect();
    let mut candidates: Vec<String> = parts
        .iter()
        .filter(|p| p.len() > 2)
        .map(|p| p.to_string())
        .collect();
    candidates.truncate(max);
    candidates
}

pub async fn memory_health_dashboard(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = require_str(
        params,
        "repository",
        "memory_health_dashboard",
        "{\"repository\": \"my-repo\"}",
    )?;
    let records = ctx.store.get_all_chunks(Some(repository)).await?;
    let health = crate::analytics::AnalyticsEngine::health(&records);
    let coverage = crate::analytics::AnalyticsEngine::coverage(&records);
    let continuity_issues = crate::analytics::AnalyticsEngine::continuity(&records);
    let trends = crate::analytics::AnalyticsEngine::trends(&records, 4);

    Ok(json!({
        "repository": repository,
        "health": { "score": health.score, "band": format!("{:?}", health.band) },
        "coverage": {
            "has_architectural_decisions": coverage.has_architectural_decisions,
            "has_code_changes": coverage.has_code_changes,
            "problems_with_solutions": coverage.problems_with_solutions,
            "problems_without_solutions": coverage.problems_without_solutions,
        },
        "continuity_issue_count": continuity_issues.len(),
        "weekly_counts": trends.weekly_counts,
        "trend_direction": format!("{:?}", trends.direction),
    }))
}

pub async fn decay_management(ctx: &ToolContext, params: &Value) -> Result<Value> {
    match opt_str(params, "action").as_deref() {
        Some("run_once") | None => {
            let deleted = ctx.decay.tick_once().await?;
            Ok(json!({ "action": "run_once", "deleted": deleted }))
        }
        Some("status") => Ok(json!({
            "action": "status",
            "retention_days": ctx.config.retention_days,
            "interval_hours": ctx.config.decay_interval_hours,
        })),
        Some(other) => Err(MemoryError::Validation(format!(
            "unknown decay_management action '{other}', expected 'run_once' or 'status'"
        ))),
    }
}

// ───────────────────────────── relationships ─────────────────────────────

fn relationship_json(r: &Relationship) -> Value {
    serde_json::to_value(r).unwrap_or(Value::Null)
}

pub async fn link(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let source_id = require_str(
        params,
        "source_id",
        "link",
        "{\"source_id\": \"<id>\", \"target_id\": \"<id>\", \"relation_type\": \"related_to\"}",
    )?;
    let target_id = require_str(
        params,
        "target_id",
        "link",
        "{\"source_id\": \"<id>\", \"target_id\": \"<id>\", \"relation_type\": \"related_to\"}",
    )?;
    let relation_type: RelationType = parse_field(params, "relation_type")?.ok_or_else(|| {
        MemoryError::missing_field(
            "link",
            "relation_type",
            "{\"source_id\": \"<id>\", \"target_id\": \"<id>\", \"relation_type\": \"related_to\"}",
        )
    })?;
    let confidence = opt_f64(params, "confidence", 1.0).clamp(0.0, 1.0);

    let relationship = Relationship {
        id: memory_types::new_id(),
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        relation_type,
        confidence,
        confidence_source: memory_types::ConfidenceSource::Explicit,
        confidence_factors: ConfidenceFactors::default(),
        validation_count: 0,
        last_validated: None,
        created_at: Utc::now(),
    };
    ctx.store.store_relationship(&relationship).await?;
    Ok(relationship_json(&relationship))
}

pub async fn get_relationships(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_id = require_str(params, "chunk_id", "get_relationships", "{\"chunk_id\": \"<id>\"}")?;
    let direction = opt_str(params, "direction").unwrap_or_else(|| "either".to_string());
    let relation_type: Option<RelationType> = parse_field(params, "relation_type")?;
    let min_confidence = params.get("min_confidence").and_then(Value::as_f64);

    let mut results = Vec::new();
    if direction == "outgoing" || direction == "either" {
        let query = RelationshipQuery {
            source_id: Some(chunk_id.to_string()),
            target_id: None,
            relation_type,
            min_confidence,
        };
        results.extend(ctx.relationships.get_relationships(&query).await?);
    }
    if direction == "incoming" || direction == "either" {
        let query = RelationshipQuery {
            source_id: None,
            target_id: Some(chunk_id.to_string()),
            relation_type,
            min_confidence,
        };
        results.extend(ctx.relationships.get_relationships(&query).await?);
    }
    Ok(json!({
        "chunk_id": chunk_id,
        "relationships": results.iter().map(relationship_json).collect::<Vec<_>>(),
    }))
}

pub async fn traverse_graph(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let start_chunk_id = require_str(
        params,
        "start_chunk_id",
        "traverse_graph",
        "{\"start_chunk_id\": \"<id>\"}",
    )?;
    let max_depth = opt_u64(params, "max_depth", 3).clamp(1, 10) as usize;
    let types: Vec<RelationType> = opt_str_vec(params, "relation_types")
        .iter()
        .filter_map(|t| serde_json::from_value(Value::String(t.clone())).ok())
        .collect();
    let allowed = if types.is_empty() { None } else { Some(types.as_slice()) };

    let result = ctx
        .relationships
        .traverse(start_chunk_id, max_depth, allowed)
        .await?;

    Ok(json!({
        "start_chunk_id": start_chunk_id,
        "nodes": result.nodes.iter().map(|n| json!({
            "chunk_id": n.chunk_id, "degree": n.degree, "centrality": n.centrality,
        })).collect::<Vec<_>>(),
        "paths": result.paths.iter().map(|p| json!({
            "chunk_ids": p.chunk_ids, "score": p.score, "depth": p.depth, "path_type": p.path_type,
        })).collect::<Vec<_>>(),
        "edges": result.edges.iter().map(relationship_json).collect::<Vec<_>>(),
    }))
}

pub async fn auto_detect_relationships(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_id = require_str(
        params,
        "chunk_id",
        "auto_detect_relationships",
        "{\"chunk_id\": \"<id>\"}",
    )?;
    let record = fetch_record(ctx, chunk_id).await?;
    let created = ctx
        .relationships
        .auto_detect(&record, &Default::default())
        .await?;
    Ok(json!({
        "chunk_id": chunk_id,
        "created": created.iter().map(relationship_json).collect::<Vec<_>>(),
    }))
}

pub async fn update_relationship(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let relationship_id = require_str(
        params,
        "relationship_id",
        "update_relationship",
        "{\"relationship_id\": \"<id>\", \"confidence\": 0.9}",
    )?;
    let confidence = opt_f64(params, "confidence", 0.5).clamp(0.0, 1.0);
    let factors: ConfidenceFactors = parse_field(params, "factors")?.unwrap_or_default();
    let updated = ctx
        .relationships
        .update_relationship(relationship_id, confidence, factors)
        .await?;
    Ok(relationship_json(&updated))
}

// ───────────────────────────── freshness ─────────────────────────────

pub async fn check_freshness(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_id = require_str(params, "chunk_id", "check_freshness", "{\"chunk_id\": \"<id>\"}")?;
    let record = fetch_record(ctx, chunk_id).await?;
    let scored = FreshnessManager::score(&record);
    Ok(json!({
        "chunk_id": chunk_id,
        "score": scored.score,
        "action": format!("{:?}", scored.action),
    }))
}

pub async fn mark_refreshed(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_id = require_str(params, "chunk_id", "mark_refreshed", "{\"chunk_id\": \"<id>\"}")?;
    let mut record = fetch_record(ctx, chunk_id).await?;
    FreshnessManager::mark_refreshed(&mut record, opt_str(params, "notes").as_deref());
    ctx.store.update(&record).await?;
    Ok(json!({ "chunk_id": chunk_id, "refreshed_at": Utc::now().to_rfc3339() }))
}

// ───────────────────────────── citations ─────────────────────────────

fn parse_citation_style(params: &Value) -> CitationStyle {
    match opt_str(params, "style").as_deref() {
        Some("apa") => CitationStyle::Apa,
        Some("mla") => CitationStyle::Mla,
        Some("chicago") => CitationStyle::Chicago,
        _ => CitationStyle::Simple,
    }
}

fn parse_inline_style(params: &Value) -> InlineStyle {
    match opt_str(params, "style").as_deref() {
        Some("caret") => InlineStyle::Caret,
        Some("paren") => InlineStyle::Paren,
        _ => InlineStyle::Bracket,
    }
}

pub async fn generate_citations(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let chunk_ids = opt_str_vec(params, "chunk_ids");
    if chunk_ids.is_empty() {
        return Err(MemoryError::missing_field(
            "generate_citations",
            "chunk_ids",
            "{\"chunk_ids\": [\"<id>\"], \"style\": \"apa\"}",
        ));
    }
    let mut records = Vec::with_capacity(chunk_ids.len());
    for id in &chunk_ids {
        records.push(fetch_record(ctx, id).await?);
    }

    let options = BibliographyOptions {
        group_by_repository: opt_bool(params, "group_by_repository", false),
        group_by_type: opt_bool(params, "group_by_type", false),
        include_excerpt: opt_bool(params, "include_excerpt", false),
    };
    let bibliography = CitationEngine::bibliography(&records, parse_citation_style(params), &options);

    Ok(json!({
        "entries": bibliography.entries.iter().map(|e| json!({
            "index": e.index, "record_id": e.record_id, "formatted": e.formatted,
        })).collect::<Vec<_>>(),
        "groups": bibliography.groups,
    }))
}

pub async fn create_inline_citation(_ctx: &ToolContext, params: &Value) -> Result<Value> {
    let index = opt_u64(params, "index", 0);
    if index == 0 {
        return Err(MemoryError::missing_field(
            "create_inline_citation",
            "index",
            "{\"index\": 1, \"style\": \"bracket\"}",
        ));
    }
    let token = CitationEngine::inline(index as usize, parse_inline_style(params));
    Ok(json!({ "token": token }))
}

// ───────────────────────────── bulk / aliases ─────────────────────────────

fn parse_conflict_policy(params: &Value) -> ConflictPolicy {
    match opt_str(params, "conflict_policy").as_deref() {
        Some("overwrite") => ConflictPolicy::Overwrite,
        Some("merge") => ConflictPolicy::Merge,
        Some("fail") => ConflictPolicy::Fail,
        _ => ConflictPolicy::Skip,
    }
}

pub async fn bulk_operation(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let kind = require_str(
        params,
        "operation",
        "bulk_operation",
        "{\"operation\": \"store\", \"items\": [...]}",
    )?;
    let items = params
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let operation = match kind {
        "store" | "update" => {
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                let record: Record = serde_json::from_value(item)
                    .map_err(|e| MemoryError::Validation(format!("invalid bulk item: {e}")))?;
                records.push(record);
            }
            if kind == "store" {
                BulkOperation::Store(records)
            } else {
                BulkOperation::Update(records)
            }
        }
        "delete" => {
            let ids = items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            BulkOperation::Delete(ids)
        }
        other => {
            return Err(MemoryError::Validation(format!(
                "unknown bulk operation '{other}', expected store/update/delete"
            )))
        }
    };

    let config = crate::bulk::BulkConfig {
        batch_size: opt_u64(params, "batch_size", ctx.config.bulk_batch_size as u64) as usize,
        max_concurrency: opt_u64(params, "max_concurrency", ctx.config.bulk_max_concurrency as u64)
            as usize,
        conflict_policy: parse_conflict_policy(params),
        continue_on_error: opt_bool(params, "continue_on_error", false),
        dry_run: opt_bool(params, "dry_run", false),
    };

    let operation_id = ctx.bulk.run(operation, &config).await?;
    let progress = ctx.bulk.get_progress(&operation_id)?;
    Ok(progress_json(&operation_id, &progress))
}

pub async fn get_bulk_progress(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let operation_id = require_str(
        params,
        "operation_id",
        "get_bulk_progress",
        "{\"operation_id\": \"<id>\"}",
    )?;
    let progress = ctx.bulk.get_progress(operation_id)?;
    Ok(progress_json(operation_id, &progress))
}

fn progress_json(operation_id: &str, p: &crate::bulk::OperationProgress) -> Value {
    json!({
        "operation_id": operation_id,
        "status": format!("{:?}", p.status),
        "processed": p.processed,
        "successful": p.successful,
        "failed": p.failed,
        "skipped": p.skipped,
        "current_batch": p.current_batch,
        "total_batches": p.total_batches,
        "elapsed_ms": p.elapsed.as_millis(),
        "estimated_ms": p.estimated.map(|d| d.as_millis()),
        "errors": p.errors,
    })
}

fn alias_json(a: &Alias) -> Value {
    serde_json::to_value(a).unwrap_or(Value::Null)
}

pub async fn create_alias(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let name = require_str(
        params,
        "name",
        "create_alias",
        "{\"name\": \"my-shortcut\", \"type\": \"query\", \"target\": {\"kind\": \"query\", \"query\": \"auth\", \"limit\": 10}}",
    )?;
    let alias_type: AliasType = parse_field(params, "type")?.unwrap_or(AliasType::Shortcut);
    let target: AliasTarget = parse_field(params, "target")?.ok_or_else(|| {
        MemoryError::missing_field(
            "create_alias",
            "target",
            "{\"target\": {\"kind\": \"chunk_ids\", \"chunk_ids\": [\"<id>\"]}}",
        )
    })?;
    let metadata: AliasMetadata = parse_field(params, "metadata")?.unwrap_or_default();

    let alias = ctx
        .aliases
        .create(crate::bulk::alias::CreateAliasInput {
            name: name.to_string(),
            alias_type,
            description: opt_str(params, "description").unwrap_or_default(),
            target,
            metadata,
        })
        .await?;
    Ok(alias_json(&alias))
}

pub async fn resolve_alias(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let name = require_str(params, "name", "resolve_alias", "{\"name\": \"my-shortcut\"}")?;
    let records = ctx.aliases.resolve(name).await?;
    Ok(json!({
        "name": name,
        "records": records.iter().map(record_json).collect::<Vec<_>>(),
    }))
}

pub async fn list_aliases(ctx: &ToolContext, params: &Value) -> Result<Value> {
    let repository = opt_str(params, "repository");
    let aliases = ctx.aliases.list(repository.as_deref()).await?;
    Ok(json!({ "aliases": aliases.iter().map(alias_json).collect::<Vec<_>>() }))
}
