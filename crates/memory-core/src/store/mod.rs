// src/store/mod.rs
// `VectorStore`: the capability the core consumes for persistence,
// embeddings storage, and the relationship graph (§4.3).
//
// The default implementation (`sqlite`) is concrete so the crate is
// buildable end to end, but every caller in this crate only ever touches
// the `VectorStore` trait — the storage engine itself stays swappable.

pub mod sqlite;

use async_trait::async_trait;
use memory_types::{Alias, Record, RecordType, RelationType, Relationship, Thread};

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ThreadQuery {
    pub repository: Option<String>,
    pub status: Option<memory_types::ThreadStatus>,
    pub limit: usize,
}

/// Filters combine conjunctively; `min_relevance` is applied server-side.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Raw natural-language query. Used by embedding-less stores as the
    /// keyword-overlap fallback (§4.4 stage without an embedding provider).
    pub query_text: String,
    pub repository: Option<String>,
    pub types: Vec<RecordType>,
    pub min_relevance: f64,
    pub limit: usize,
    /// `None` = no recency restriction.
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: Record,
    pub score: f64,
    /// Human-readable breakdown sufficient to reconstruct the score (§4.4).
    pub explanation: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub results: Vec<ScoredRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipQuery {
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    pub relation_type: Option<RelationType>,
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub chunk_id: String,
    pub degree: usize,
    pub centrality: f64,
}

#[derive(Debug, Clone)]
pub struct GraphPath {
    pub chunk_ids: Vec<String>,
    pub score: f64,
    pub depth: usize,
    pub path_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct TraverseResult {
    pub paths: Vec<GraphPath>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Relationship>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_records: u64,
    pub total_relationships: u64,
    pub repositories: u64,
}

/// Capability the core consumes for persistence (§4.3). A deployment may
/// back this with SQLite+sqlite-vec (the default, see `sqlite::SqliteStore`),
/// Qdrant, pgvector, or anything else that can honor these semantics.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn health_check(&self) -> Result<()>;

    async fn store(&self, record: &Record) -> Result<()>;
    async fn update(&self, record: &Record) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Record>>;

    /// Search is expected to return results sorted by descending score.
    async fn search(&self, embedding: Option<&[f32]>, filter: &SearchFilter) -> Result<SearchResults>;

    async fn list_by_repository(
        &self,
        repository: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>>;

    async fn count_by_repository(&self, repository: &str) -> Result<u64>;

    /// Delete records older than `retention_days`. Returns the count deleted.
    async fn cleanup(&self, retention_days: u32) -> Result<u64>;

    async fn store_relationship(&self, relationship: &Relationship) -> Result<()>;
    async fn get_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>>;
    async fn get_relationship_by_id(&self, id: &str) -> Result<Option<Relationship>>;
    async fn update_relationship(&self, relationship: &Relationship) -> Result<()>;
    async fn delete_relationship(&self, id: &str) -> Result<()>;

    async fn traverse_graph(
        &self,
        start_chunk_id: &str,
        max_depth: usize,
        allowed_types: Option<&[RelationType]>,
    ) -> Result<TraverseResult>;

    async fn get_stats(&self) -> Result<StoreStats>;
    async fn get_all_chunks(&self, repository: Option<&str>) -> Result<Vec<Record>>;

    /// Record a usage hit for ranking's frequency boost (§4.4).
    async fn record_access(&self, id: &str) -> Result<()>;

    // ───────────────────────────── Threads (§4.6) ─────────────────────────────

    async fn store_thread(&self, thread: &Thread) -> Result<()>;
    async fn update_thread(&self, thread: &Thread) -> Result<()>;
    async fn delete_thread(&self, id: &str) -> Result<()>;
    async fn get_thread_by_id(&self, id: &str) -> Result<Option<Thread>>;
    async fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>>;

    // ───────────────────────────── Aliases (§4.9) ─────────────────────────────

    async fn store_alias(&self, alias: &Alias) -> Result<()>;
    async fn update_alias(&self, alias: &Alias) -> Result<()>;
    async fn delete_alias(&self, id: &str) -> Result<()>;
    async fn get_alias_by_id(&self, id: &str) -> Result<Option<Alias>>;
    async fn get_alias_by_name(&self, name: &str) -> Result<Option<Alias>>;
    async fn list_aliases(&self, repository: Option<&str>) -> Result<Vec<Alias>>;
}
