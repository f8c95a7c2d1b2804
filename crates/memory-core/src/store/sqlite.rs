// src/store/sqlite.rs
// `SqliteStore`: the default `VectorStore`, backed by SQLite + sqlite-vec.
//
// Pool setup and sqlite-vec extension registration with contention retry,
// scope-filtered queries, and ranking boost constants. Connections never
// touch the async runtime directly — every query runs through
// `deadpool_sqlite::Pool::interact`, which hands it to a blocking thread.

use std::path::Path;
use std::str::FromStr;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config, Runtime};
use memory_types::{
    Alias, ConfidenceFactors, ConfidenceSource, Record, RecordMetadata, RecordType, RelationType,
    Relationship, Thread, ThreadStatus, ThreadType,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MemoryError, Result};

use super::{
    GraphNode, GraphPath, RelationshipQuery, ScoredRecord, SearchFilter, SearchResults,
    StoreStats, ThreadQuery, TraverseResult, VectorStore,
};

/// Registers sqlite-vec globally (once per process). Must run before any
/// connection is opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` matches the signature
        // `sqlite3_auto_extension` expects; the transmute only changes the
        // Rust-level function-pointer type, not its calling convention. The
        // symbol is statically linked, so the pointer stays valid for the
        // process lifetime.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Recency half-life, in days, for the freshness-adjacent ranking boost
/// (distinct from `FreshnessManager`'s decay — this one only biases search
/// order, see §4.4).
const RANKING_RECENCY_HALF_LIFE_DAYS: f64 = 90.0;
/// Max fractional boost applied for recency.
const RANKING_RECENCY_MAX_BOOST: f64 = 0.15;
/// Max fractional boost applied for usage frequency, saturating at
/// `USAGE_BOOST_SATURATION` accesses.
const RANKING_USAGE_MAX_BOOST: f64 = 0.20;
const USAGE_BOOST_SATURATION: f64 = 25.0;
/// Max fractional boost for records with denormalized relationships already
/// attached.
const RANKING_RELATIONSHIP_MAX_BOOST: f64 = 0.10;
const RELATIONSHIP_BOOST_SATURATION: f64 = 5.0;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    repository TEXT NOT NULL,
    record_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    related_chunks_json TEXT NOT NULL DEFAULT '[]',
    client_type TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT
);
CREATE INDEX IF NOT EXISTS idx_records_repository ON records(repository);
CREATE INDEX IF NOT EXISTS idx_records_session ON records(session_id);
CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type);
CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp DESC);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    confidence_source TEXT NOT NULL,
    confidence_factors_json TEXT NOT NULL DEFAULT '{}',
    validation_count INTEGER NOT NULL DEFAULT 0,
    last_validated TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);

CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    thread_type TEXT NOT NULL,
    status TEXT NOT NULL,
    repository TEXT NOT NULL,
    chunk_ids_json TEXT NOT NULL DEFAULT '[]',
    session_ids_json TEXT NOT NULL DEFAULT '[]',
    tags_json TEXT NOT NULL DEFAULT '[]',
    priority TEXT,
    start_time TEXT NOT NULL,
    last_update TEXT NOT NULL,
    end_time TEXT
);
CREATE INDEX IF NOT EXISTS idx_threads_repository ON threads(repository);
CREATE INDEX IF NOT EXISTS idx_threads_status ON threads(status);

CREATE TABLE IF NOT EXISTS aliases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    alias_type TEXT NOT NULL,
    description TEXT NOT NULL,
    target_json TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed TEXT
);
CREATE INDEX IF NOT EXISTS idx_aliases_name ON aliases(name);
";

fn vec_table_sql(dimensions: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_records USING vec0(
            embedding float[{dimensions}],
            +chunk_id TEXT
        );"
    )
}

/// SQLite-backed `VectorStore`. One pool per process; safe to share across
/// tasks (`Arc<SqliteStore>`).
pub struct SqliteStore {
    pool: deadpool_sqlite::Pool,
    dimensions: usize,
}

impl SqliteStore {
    /// Open (creating if absent) a pooled SQLite database at `path`.
    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        ensure_sqlite_vec_registered();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MemoryError::Storage(format!("failed to create db directory: {e}"))
                })?;
            }
        }
        let conn_str = path.to_string_lossy().to_string();
        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| MemoryError::Storage(format!("pool builder failed: {e}")))?
            .max_size(8)
            .build()
            .map_err(|e| MemoryError::Storage(format!("pool build failed: {e}")))?;
        Ok(Self { pool, dimensions })
    }

    /// Open a pooled in-memory database (shared cache so every connection in
    /// the pool sees the same state) — used by tests.
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        ensure_sqlite_vec_registered();
        let uri = format!(
            "file:memdb_{}?mode=memory&cache=shared",
            memory_types::new_id()
        );
        let cfg = Config::new(&uri);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| MemoryError::Storage(format!("pool builder failed: {e}")))?
            .max_size(1)
            .build()
            .map_err(|e| MemoryError::Storage(format!("pool build failed: {e}")))?;
        Ok(Self { pool, dimensions })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to get pooled connection: {e}")))?;
        conn.interact(move |c| f(c))
            .await
            .map_err(|e| MemoryError::Storage(format!("interact failed: {e}")))?
    }

}

fn to_json<T: Serialize>(v: &T) -> Result<String> {
    serde_json::to_string(v).map_err(MemoryError::from)
}

fn from_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(MemoryError::from)
}

fn enum_to_str<T: Serialize>(v: &T) -> String {
    serde_json::to_value(v)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn str_to_enum<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(MemoryError::from)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::Storage(format!("bad timestamp {s:?}: {e}")))
}

fn row_to_record(row: &Row) -> rusqlite::Result<Record> {
    let metadata_json: String = row.get("metadata_json")?;
    let related_json: String = row.get("related_chunks_json")?;
    let record_type_str: String = row.get("record_type")?;
    let timestamp_str: String = row.get("timestamp")?;
    let access_count: i64 = row.get("access_count")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;

    let metadata: RecordMetadata = from_json(&metadata_json).map_err(to_sqlite_err)?;
    let related_chunks: Vec<String> = from_json(&related_json).unwrap_or_default();
    let record_type =
        RecordType::from_str(&record_type_str).map_err(|e| to_sqlite_err(MemoryError::Storage(e)))?;
    let timestamp = parse_timestamp(&timestamp_str).map_err(to_sqlite_err)?;

    Ok(Record {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        timestamp,
        record_type,
        content: row.get("content")?,
        summary: row.get("summary")?,
        embedding: None,
        metadata,
        related_chunks,
        client_type: row.get("client_type")?,
        access_count: access_count.max(0) as u64,
        last_accessed: last_accessed
            .map(|s| parse_timestamp(&s))
            .transpose()
            .map_err(to_sqlite_err)?,
    })
}

fn to_sqlite_err(e: MemoryError) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let relation_type_str: String = row.get("relation_type")?;
    let confidence_source_str: String = row.get("confidence_source")?;
    let factors_json: String = row.get("confidence_factors_json")?;
    let created_at_str: String = row.get("created_at")?;
    let last_validated_str: Option<String> = row.get("last_validated")?;
    let validation_count: i64 = row.get("validation_count")?;

    let relation_type = RelationType::from_str(&relation_type_str)
        .map_err(|e| to_sqlite_err(MemoryError::Storage(e)))?;
    let confidence_source: ConfidenceSource =
        str_to_enum(&confidence_source_str).map_err(to_sqlite_err)?;
    let confidence_factors: ConfidenceFactors = from_json(&factors_json).unwrap_or_default();
    let created_at = parse_timestamp(&created_at_str).map_err(to_sqlite_err)?;
    let last_validated = last_validated_str
        .map(|s| parse_timestamp(&s))
        .transpose()
        .map_err(to_sqlite_err)?;

    Ok(Relationship {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        relation_type,
        confidence: row.get("confidence")?,
        confidence_source,
        confidence_factors,
        validation_count: validation_count.max(0) as u32,
        last_validated,
        created_at,
    })
}

fn row_to_thread(row: &Row) -> rusqlite::Result<Thread> {
    let thread_type_str: String = row.get("thread_type")?;
    let status_str: String = row.get("status")?;
    let chunk_ids_json: String = row.get("chunk_ids_json")?;
    let session_ids_json: String = row.get("session_ids_json")?;
    let tags_json: String = row.get("tags_json")?;
    let start_time_str: String = row.get("start_time")?;
    let last_update_str: String = row.get("last_update")?;
    let end_time_str: Option<String> = row.get("end_time")?;

    let thread_type: ThreadType = str_to_enum(&thread_type_str).map_err(to_sqlite_err)?;
    let status: ThreadStatus = str_to_enum(&status_str).map_err(to_sqlite_err)?;

    Ok(Thread {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        thread_type,
        status,
        repository: row.get("repository")?,
        chunk_ids: from_json(&chunk_ids_json).unwrap_or_default(),
        session_ids: from_json(&session_ids_json).unwrap_or_default(),
        tags: from_json(&tags_json).unwrap_or_default(),
        priority: row.get("priority")?,
        start_time: parse_timestamp(&start_time_str).map_err(to_sqlite_err)?,
        last_update: parse_timestamp(&last_update_str).map_err(to_sqlite_err)?,
        end_time: end_time_str
            .map(|s| parse_timestamp(&s))
            .transpose()
            .map_err(to_sqlite_err)?,
    })
}

fn row_to_alias(row: &Row) -> rusqlite::Result<Alias> {
    let target_json: String = row.get("target_json")?;
    let metadata_json: String = row.get("metadata_json")?;
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    let last_accessed_str: Option<String> = row.get("last_accessed")?;
    let access_count: i64 = row.get("access_count")?;

    Ok(Alias {
        id: row.get("id")?,
        name: row.get("name")?,
        alias_type: str_to_enum(&row.get::<_, String>("alias_type")?).map_err(to_sqlite_err)?,
        description: row.get("description")?,
        target: from_json(&target_json).map_err(to_sqlite_err)?,
        metadata: from_json(&metadata_json).unwrap_or_default(),
        access_count: access_count.max(0) as u64,
        created_at: parse_timestamp(&created_at_str).map_err(to_sqlite_err)?,
        updated_at: parse_timestamp(&updated_at_str).map_err(to_sqlite_err)?,
        last_accessed: last_accessed_str
            .map(|s| parse_timestamp(&s))
            .transpose()
            .map_err(to_sqlite_err)?,
    })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn recency_boost(timestamp: DateTime<Utc>) -> f64 {
    let days = (Utc::now() - timestamp).num_seconds().max(0) as f64 / 86400.0;
    1.0 + RANKING_RECENCY_MAX_BOOST * (-days / RANKING_RECENCY_HALF_LIFE_DAYS).exp()
}

fn usage_boost(access_count: u64) -> f64 {
    1.0 + RANKING_USAGE_MAX_BOOST * (access_count as f64 / USAGE_BOOST_SATURATION).min(1.0)
}

fn relationship_boost(related_chunks: usize) -> f64 {
    1.0 + RANKING_RELATIONSHIP_MAX_BOOST
        * (related_chunks as f64 / RELATIONSHIP_BOOST_SATURATION).min(1.0)
}

fn token_overlap_score(query: &str, haystack: &str) -> f64 {
    let q: std::collections::HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if q.is_empty() {
        return 0.0;
    }
    let h: std::collections::HashSet<String> = haystack
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let overlap = q.intersection(&h).count();
    overlap as f64 / q.len() as f64
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn initialize(&self) -> Result<()> {
        let dimensions = self.dimensions;
        self.with_conn(move |conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute_batch(&vec_table_sql(dimensions))?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }

    async fn store(&self, record: &Record) -> Result<()> {
        let record = record.clone();
        let dimensions = self.dimensions;
        self.with_conn(move |conn| {
            let metadata_json = to_json(&record.metadata).map_err(to_sqlite_err)?;
            let related_json = to_json(&record.related_chunks).map_err(to_sqlite_err)?;
            conn.execute(
                "INSERT INTO records (
                    id, session_id, repository, record_type, timestamp, content, summary,
                    metadata_json, related_chunks_json, client_type, access_count, last_accessed
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.session_id,
                    record.metadata.repository,
                    record.record_type.as_str(),
                    record.timestamp.to_rfc3339(),
                    record.content,
                    record.summary,
                    metadata_json,
                    related_json,
                    record.client_type,
                    record.access_count as i64,
                    record.last_accessed.map(|t| t.to_rfc3339()),
                ],
            )?;

            if let Some(embedding) = &record.embedding {
                if embedding.len() != dimensions {
                    return Err(MemoryError::Validation(format!(
                        "embedding has {} dimensions, store expects {dimensions}",
                        embedding.len()
                    )));
                }
                conn.execute(
                    "INSERT INTO vec_records (rowid, embedding, chunk_id)
                     VALUES ((SELECT COALESCE(MAX(rowid), 0) + 1 FROM vec_records), ?1, ?2)",
                    params![embedding_to_blob(embedding), record.id],
                )?;
            }
            Ok(())
        })
        .await
    }

    async fn update(&self, record: &Record) -> Result<()> {
        let record = record.clone();
        let dimensions = self.dimensions;
        self.with_conn(move |conn| {
            let metadata_json = to_json(&record.metadata).map_err(to_sqlite_err)?;
            let related_json = to_json(&record.related_chunks).map_err(to_sqlite_err)?;
            let changed = conn.execute(
                "UPDATE records SET
                    session_id = ?2, repository = ?3, record_type = ?4, content = ?5,
                    summary = ?6, metadata_json = ?7, related_chunks_json = ?8,
                    client_type = ?9, access_count = ?10, last_accessed = ?11
                 WHERE id = ?1",
                params![
                    record.id,
                    record.session_id,
                    record.metadata.repository,
                    record.record_type.as_str(),
                    record.content,
                    record.summary,
                    metadata_json,
                    related_json,
                    record.client_type,
                    record.access_count as i64,
                    record.last_accessed.map(|t| t.to_rfc3339()),
                ],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!("record {}", record.id)));
            }

            conn.execute(
                "DELETE FROM vec_records WHERE chunk_id = ?1",
                params![record.id],
            )?;
            if let Some(embedding) = &record.embedding {
                if embedding.len() != dimensions {
                    return Err(MemoryError::Validation(format!(
                        "embedding has {} dimensions, store expects {dimensions}",
                        embedding.len()
                    )));
                }
                conn.execute(
                    "INSERT INTO vec_records (rowid, embedding, chunk_id)
                     VALUES ((SELECT COALESCE(MAX(rowid), 0) + 1 FROM vec_records), ?1, ?2)",
                    params![embedding_to_blob(embedding), record.id],
                )?;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM vec_records WHERE chunk_id = ?1", params![id])?;
            conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
            conn.execute(
                "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM records WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()
            .map_err(MemoryError::from)
        })
        .await
    }

    async fn search(&self, embedding: Option<&[f32]>, filter: &SearchFilter) -> Result<SearchResults> {
        let filter = filter.clone();
        let embedding = embedding.map(|e| e.to_vec());
        let fetch_limit = (filter.limit.max(1) * 3).min(500);

        self.with_conn(move |conn| {
            let mut candidates: Vec<(Record, f64, String)> = Vec::new();

            if let Some(embedding) = &embedding {
                let blob = embedding_to_blob(embedding);
                let mut sql = String::from(
                    "SELECT r.*, vec_distance_cosine(v.embedding, ?1) as distance
                     FROM vec_records v
                     JOIN records r ON r.id = v.chunk_id
                     WHERE 1=1",
                );
                let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(blob)];
                push_filter_clauses(&mut sql, &mut args, &filter);
                sql.push_str(" ORDER BY distance LIMIT ?");
                args.push(Box::new(fetch_limit as i64));

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(args), |row| {
                    let distance: f64 = row.get("distance")?;
                    let record = row_to_record(row)?;
                    Ok((record, 1.0 - distance.clamp(0.0, 2.0) / 2.0))
                })?;
                for row in rows {
                    let (record, base_score) = row?;
                    candidates.push((record, base_score, "semantic".to_string()));
                }
            } else {
                let mut sql = String::from("SELECT * FROM records r WHERE 1=1");
                let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
                push_filter_clauses(&mut sql, &mut args, &filter);
                sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
                args.push(Box::new(fetch_limit as i64));

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(args), row_to_record)?;
                for row in rows {
                    let record = row?;
                    let haystack = format!("{} {}", record.content, record.summary);
                    let score = token_overlap_score(&filter.query_text, &haystack);
                    candidates.push((record, score, "keyword".to_string()));
                }
            }

            let mut scored: Vec<ScoredRecord> = candidates
                .into_iter()
                .map(|(record, base, method)| {
                    let recency = recency_boost(record.timestamp);
                    let usage = usage_boost(record.access_count);
                    let relationship = relationship_boost(record.related_chunks.len());
                    let score = (base * recency * usage * relationship).clamp(0.0, 1.0);
                    let explanation = format!(
                        "{method} base={base:.3} recency={recency:.3} usage={usage:.3} relationship={relationship:.3}"
                    );
                    ScoredRecord {
                        record,
                        score,
                        explanation,
                    }
                })
                .filter(|s| s.score >= filter.min_relevance)
                .collect();

            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(filter.limit.max(1));

            Ok(SearchResults { results: scored })
        })
        .await
    }

    async fn list_by_repository(
        &self,
        repository: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM records WHERE repository = ?1 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![repository, limit as i64, offset as i64], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn count_by_repository(&self, repository: &str) -> Result<u64> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE repository = ?1",
                params![repository],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn cleanup(&self, retention_days: u32) -> Result<u64> {
        self.with_conn(move |conn| {
            let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
            let ids: Vec<String> = {
                let mut stmt = conn.prepare("SELECT id FROM records WHERE timestamp < ?1")?;
                stmt.query_map(params![cutoff], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            for id in &ids {
                conn.execute("DELETE FROM vec_records WHERE chunk_id = ?1", params![id])?;
                conn.execute(
                    "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                    params![id],
                )?;
            }
            let deleted = conn.execute("DELETE FROM records WHERE timestamp < ?1", params![cutoff])?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn store_relationship(&self, relationship: &Relationship) -> Result<()> {
        let relationship = relationship.clone();
        self.with_conn(move |conn| {
            let factors_json = to_json(&relationship.confidence_factors).map_err(to_sqlite_err)?;
            conn.execute(
                "INSERT INTO relationships (
                    id, source_id, target_id, relation_type, confidence, confidence_source,
                    confidence_factors_json, validation_count, last_validated, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    relationship.id,
                    relationship.source_id,
                    relationship.target_id,
                    relationship.relation_type.as_str(),
                    relationship.confidence,
                    enum_to_str(&relationship.confidence_source),
                    factors_json,
                    relationship.validation_count as i64,
                    relationship.last_validated.map(|t| t.to_rfc3339()),
                    relationship.created_at.to_rfc3339(),
                ],
            )?;

            conn.execute(
                "UPDATE records SET related_chunks_json = json_insert(
                    CASE WHEN related_chunks_json = '' THEN '[]' ELSE related_chunks_json END,
                    '$[#]', ?2
                 ) WHERE id = ?1 AND NOT EXISTS (
                    SELECT 1 FROM json_each(related_chunks_json) WHERE value = ?2
                 )",
                params![relationship.source_id, relationship.target_id],
            )
            .ok();
            Ok(())
        })
        .await
    }

    async fn get_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM relationships WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(source) = &query.source_id {
                sql.push_str(" AND source_id = ?");
                args.push(Box::new(source.clone()));
            }
            if let Some(target) = &query.target_id {
                sql.push_str(" AND target_id = ?");
                args.push(Box::new(target.clone()));
            }
            if let Some(relation_type) = &query.relation_type {
                sql.push_str(" AND relation_type = ?");
                args.push(Box::new(relation_type.as_str().to_string()));
            }
            if let Some(min_confidence) = query.min_confidence {
                sql.push_str(" AND confidence >= ?");
                args.push(Box::new(min_confidence));
            }
            sql.push_str(" ORDER BY created_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), row_to_relationship)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_relationship_by_id(&self, id: &str) -> Result<Option<Relationship>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM relationships WHERE id = ?1",
                params![id],
                row_to_relationship,
            )
            .optional()
            .map_err(MemoryError::from)
        })
        .await
    }

    async fn update_relationship(&self, relationship: &Relationship) -> Result<()> {
        let relationship = relationship.clone();
        self.with_conn(move |conn| {
            let factors_json = to_json(&relationship.confidence_factors).map_err(to_sqlite_err)?;
            let changed = conn.execute(
                "UPDATE relationships SET
                    confidence = ?2, confidence_source = ?3, confidence_factors_json = ?4,
                    validation_count = ?5, last_validated = ?6
                 WHERE id = ?1",
                params![
                    relationship.id,
                    relationship.confidence,
                    enum_to_str(&relationship.confidence_source),
                    factors_json,
                    relationship.validation_count as i64,
                    relationship.last_validated.map(|t| t.to_rfc3339()),
                ],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!(
                    "relationship {}",
                    relationship.id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_relationship(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM relationships WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn traverse_graph(
        &self,
        start_chunk_id: &str,
        max_depth: usize,
        allowed_types: Option<&[RelationType]>,
    ) -> Result<TraverseResult> {
        let start = start_chunk_id.to_string();
        let allowed: Option<Vec<String>> =
            allowed_types.map(|types| types.iter().map(|t| t.as_str().to_string()).collect());

        self.with_conn(move |conn| {
            let mut edges: Vec<Relationship> = Vec::new();
            let mut frontier = vec![start.clone()];
            let mut visited = std::collections::HashSet::new();
            visited.insert(start.clone());
            let mut depths = std::collections::HashMap::new();
            depths.insert(start.clone(), 0usize);
            // child -> (parent, edge confidence, edge relation type), one entry
            // per node the BFS first reaches; lets us reconstruct the full
            // chunk_id chain for a node instead of just its last hop.
            let mut parent: std::collections::HashMap<String, (String, f64, String)> =
                std::collections::HashMap::new();

            for depth in 0..max_depth {
                if frontier.is_empty() {
                    break;
                }
                let mut next_frontier = Vec::new();
                for node in &frontier {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM relationships WHERE source_id = ?1 OR target_id = ?1",
                    )?;
                    let rows = stmt
                        .query_map(params![node], row_to_relationship)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    for rel in rows {
                        if let Some(allowed) = &allowed {
                            if !allowed.contains(&rel.relation_type.as_str().to_string()) {
                                continue;
                            }
                        }
                        let other = if &rel.source_id == node {
                            rel.target_id.clone()
                        } else {
                            rel.source_id.clone()
                        };
                        if visited.insert(other.clone()) {
                            depths.insert(other.clone(), depth + 1);
                            next_frontier.push(other.clone());
                            parent.insert(
                                other.clone(),
                                (node.clone(), rel.confidence, rel.relation_type.as_str().to_string()),
                            );
                        }
                        edges.push(rel);
                    }
                }
                frontier = next_frontier;
            }

            // Only leaves of the traversal tree (nodes nobody else was
            // discovered through) produce a path; an intermediate stop is
            // already a prefix of its leaf's chain.
            let has_child: std::collections::HashSet<&String> =
                parent.values().map(|(p, _, _)| p).collect();
            let mut paths: Vec<GraphPath> = parent
                .keys()
                .filter(|leaf| !has_child.contains(leaf))
                .map(|leaf| {
                    let mut chunk_ids = vec![leaf.clone()];
                    let mut confidences = Vec::new();
                    let mut path_type = String::new();
                    let mut cur = leaf.clone();
                    while let Some((p, conf, rtype)) = parent.get(&cur) {
                        confidences.push(*conf);
                        path_type = rtype.clone();
                        chunk_ids.push(p.clone());
                        cur = p.clone();
                    }
                    chunk_ids.reverse();
                    GraphPath {
                        depth: *depths.get(leaf).unwrap_or(&0),
                        score: confidences.into_iter().fold(1.0, |acc, c| acc * c),
                        chunk_ids,
                        path_type,
                    }
                })
                .collect();
            paths.sort_by(|a, b| a.chunk_ids.cmp(&b.chunk_ids));

            let mut degree: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
            for edge in &edges {
                *degree.entry(edge.source_id.clone()).or_insert(0) += 1;
                *degree.entry(edge.target_id.clone()).or_insert(0) += 1;
            }
            let max_degree = degree.values().copied().max().unwrap_or(1).max(1) as f64;
            let nodes: Vec<GraphNode> = visited
                .into_iter()
                .map(|chunk_id| {
                    let d = *degree.get(&chunk_id).unwrap_or(&0);
                    GraphNode {
                        chunk_id,
                        degree: d,
                        centrality: d as f64 / max_degree,
                    }
                })
                .collect();

            edges.sort_by(|a, b| a.id.cmp(&b.id));
            edges.dedup_by(|a, b| a.id == b.id);

            Ok(TraverseResult { paths, nodes, edges })
        })
        .await
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let total_records: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
            let total_relationships: i64 =
                conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))?;
            let repositories: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT repository) FROM records",
                [],
                |r| r.get(0),
            )?;
            Ok(StoreStats {
                total_records: total_records.max(0) as u64,
                total_relationships: total_relationships.max(0) as u64,
                repositories: repositories.max(0) as u64,
            })
        })
        .await
    }

    async fn get_all_chunks(&self, repository: Option<&str>) -> Result<Vec<Record>> {
        let repository = repository.map(str::to_string);
        self.with_conn(move |conn| {
            let rows = match repository {
                Some(repo) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM records WHERE repository = ?1 ORDER BY timestamp DESC",
                    )?;
                    stmt.query_map(params![repo], row_to_record)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare("SELECT * FROM records ORDER BY timestamp DESC")?;
                    stmt.query_map([], row_to_record)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(rows)
        })
        .await
    }

    async fn record_access(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "UPDATE records SET access_count = access_count + 1, last_accessed = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!("record {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn store_thread(&self, thread: &Thread) -> Result<()> {
        let thread = thread.clone();
        self.with_conn(move |conn| {
            let chunk_ids_json = to_json(&thread.chunk_ids).map_err(to_sqlite_err)?;
            let session_ids_json = to_json(&thread.session_ids).map_err(to_sqlite_err)?;
            let tags_json = to_json(&thread.tags).map_err(to_sqlite_err)?;
            conn.execute(
                "INSERT INTO threads (
                    id, title, description, thread_type, status, repository,
                    chunk_ids_json, session_ids_json, tags_json, priority,
                    start_time, last_update, end_time
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    thread.id,
                    thread.title,
                    thread.description,
                    enum_to_str(&thread.thread_type),
                    enum_to_str(&thread.status),
                    thread.repository,
                    chunk_ids_json,
                    session_ids_json,
                    tags_json,
                    thread.priority,
                    thread.start_time.to_rfc3339(),
                    thread.last_update.to_rfc3339(),
                    thread.end_time.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_thread(&self, thread: &Thread) -> Result<()> {
        let thread = thread.clone();
        self.with_conn(move |conn| {
            let chunk_ids_json = to_json(&thread.chunk_ids).map_err(to_sqlite_err)?;
            let session_ids_json = to_json(&thread.session_ids).map_err(to_sqlite_err)?;
            let tags_json = to_json(&thread.tags).map_err(to_sqlite_err)?;
            let changed = conn.execute(
                "UPDATE threads SET
                    title = ?2, description = ?3, thread_type = ?4, status = ?5, repository = ?6,
                    chunk_ids_json = ?7, session_ids_json = ?8, tags_json = ?9, priority = ?10,
                    last_update = ?11, end_time = ?12
                 WHERE id = ?1",
                params![
                    thread.id,
                    thread.title,
                    thread.description,
                    enum_to_str(&thread.thread_type),
                    enum_to_str(&thread.status),
                    thread.repository,
                    chunk_ids_json,
                    session_ids_json,
                    tags_json,
                    thread.priority,
                    thread.last_update.to_rfc3339(),
                    thread.end_time.map(|t| t.to_rfc3339()),
                ],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!("thread {}", thread.id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_thread(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM threads WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn get_thread_by_id(&self, id: &str) -> Result<Option<Thread>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM threads WHERE id = ?1", params![id], row_to_thread)
                .optional()
                .map_err(MemoryError::from)
        })
        .await
    }

    async fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM threads WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(repository) = &query.repository {
                sql.push_str(" AND repository = ?");
                args.push(Box::new(repository.clone()));
            }
            if let Some(status) = &query.status {
                sql.push_str(" AND status = ?");
                args.push(Box::new(enum_to_str(status)));
            }
            sql.push_str(" ORDER BY last_update DESC");
            if query.limit > 0 {
                sql.push_str(" LIMIT ?");
                args.push(Box::new(query.limit as i64));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), row_to_thread)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn store_alias(&self, alias: &Alias) -> Result<()> {
        let alias = alias.clone();
        self.with_conn(move |conn| {
            let target_json = to_json(&alias.target).map_err(to_sqlite_err)?;
            let metadata_json = to_json(&alias.metadata).map_err(to_sqlite_err)?;
            conn.execute(
                "INSERT INTO aliases (
                    id, name, alias_type, description, target_json, metadata_json,
                    access_count, created_at, updated_at, last_accessed
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    alias.id,
                    alias.name,
                    enum_to_str(&alias.alias_type),
                    alias.description,
                    target_json,
                    metadata_json,
                    alias.access_count as i64,
                    alias.created_at.to_rfc3339(),
                    alias.updated_at.to_rfc3339(),
                    alias.last_accessed.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_alias(&self, alias: &Alias) -> Result<()> {
        let alias = alias.clone();
        self.with_conn(move |conn| {
            let target_json = to_json(&alias.target).map_err(to_sqlite_err)?;
            let metadata_json = to_json(&alias.metadata).map_err(to_sqlite_err)?;
            let changed = conn.execute(
                "UPDATE aliases SET
                    name = ?2, alias_type = ?3, description = ?4, target_json = ?5,
                    metadata_json = ?6, access_count = ?7, updated_at = ?8, last_accessed = ?9
                 WHERE id = ?1",
                params![
                    alias.id,
                    alias.name,
                    enum_to_str(&alias.alias_type),
                    alias.description,
                    target_json,
                    metadata_json,
                    alias.access_count as i64,
                    alias.updated_at.to_rfc3339(),
                    alias.last_accessed.map(|t| t.to_rfc3339()),
                ],
            )?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!("alias {}", alias.id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_alias(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM aliases WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn get_alias_by_id(&self, id: &str) -> Result<Option<Alias>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM aliases WHERE id = ?1", params![id], row_to_alias)
                .optional()
                .map_err(MemoryError::from)
        })
        .await
    }

    async fn get_alias_by_name(&self, name: &str) -> Result<Option<Alias>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM aliases WHERE name = ?1",
                params![name],
                row_to_alias,
            )
            .optional()
            .map_err(MemoryError::from)
        })
        .await
    }

    async fn list_aliases(&self, repository: Option<&str>) -> Result<Vec<Alias>> {
        let repository = repository.map(str::to_string);
        self.with_conn(move |conn| {
            let rows = match repository {
                Some(repo) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM aliases WHERE json_extract(metadata_json, '$.repository') = ?1 ORDER BY name",
                    )?;
                    stmt.query_map(params![repo], row_to_alias)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare("SELECT * FROM aliases ORDER BY name")?;
                    stmt.query_map([], row_to_alias)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(rows)
        })
        .await
    }
}

fn push_filter_clauses(
    sql: &mut String,
    args: &mut Vec<Box<dyn rusqlite::ToSql>>,
    filter: &SearchFilter,
) {
    if let Some(repository) = &filter.repository {
        sql.push_str(" AND r.repository = ?");
        args.push(Box::new(repository.clone()));
    }
    if !filter.types.is_empty() {
        let placeholders = filter
            .types
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" AND r.record_type IN ({placeholders})"));
        for t in &filter.types {
            args.push(Box::new(t.as_str().to_string()));
        }
    }
    if let Some(since) = filter.since {
        sql.push_str(" AND r.timestamp >= ?");
        args.push(Box::new(since.to_rfc3339()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::{Difficulty, Outcome, RecordMetadata, GLOBAL_REPOSITORY};

    fn sample_record(id: &str, content: &str) -> Record {
        Record {
            id: id.to_string(),
            session_id: format!("{GLOBAL_REPOSITORY}::s1"),
            timestamp: Utc::now(),
            record_type: RecordType::Discussion,
            content: content.to_string(),
            summary: content.to_string(),
            embedding: None,
            metadata: RecordMetadata {
                repository: GLOBAL_REPOSITORY.to_string(),
                branch: None,
                files_modified: Vec::new(),
                tools_used: Vec::new(),
                tags: Vec::new(),
                outcome: Outcome::default(),
                difficulty: Difficulty::default(),
                task_status: None,
                task_priority: None,
                extended_metadata: memory_types::ExtendedMetadata::new(),
            },
            related_chunks: Vec::new(),
            client_type: None,
            access_count: 0,
            last_accessed: None,
        }
    }

    #[tokio::test]
    async fn store_and_fetch_round_trips() {
        let store = SqliteStore::open_in_memory(8).unwrap();
        store.initialize().await.unwrap();

        let record = sample_record("r1", "hello world");
        store.store(&record).await.unwrap();

        let fetched = store.get_by_id("r1").await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = SqliteStore::open_in_memory(8).unwrap();
        store.initialize().await.unwrap();
        store.store(&sample_record("r1", "x")).await.unwrap();
        store.delete("r1").await.unwrap();
        assert!(store.get_by_id("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keyword_search_finds_overlap() {
        let store = SqliteStore::open_in_memory(8).unwrap();
        store.initialize().await.unwrap();
        store
            .store(&sample_record("r1", "fixed the authentication bug"))
            .await
            .unwrap();
        store
            .store(&sample_record("r2", "unrelated database migration"))
            .await
            .unwrap();

        let filter = SearchFilter {
            query_text: "authentication bug".to_string(),
            limit: 5,
            ..Default::default()
        };
        let results = store.search(None, &filter).await.unwrap();
        assert_eq!(results.results.first().unwrap().record.id, "r1");
    }

    #[tokio::test]
    async fn record_access_increments_count() {
        let store = SqliteStore::open_in_memory(8).unwrap();
        store.initialize().await.unwrap();
        store.store(&sample_record("r1", "x")).await.unwrap();
        store.record_access("r1").await.unwrap();
        let fetched = store.get_by_id("r1").await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 1);
    }

    fn sample_relationship(id: &str, source: &str, target: &str, confidence: f64) -> Relationship {
        Relationship {
            id: id.to_string(),
            source_id: source.to_string(),
            target_id: target.to_string(),
            relation_type: RelationType::LedTo,
            confidence,
            confidence_source: memory_types::ConfidenceSource::Explicit,
            confidence_factors: Default::default(),
            validation_count: 0,
            last_validated: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn traverse_graph_chain_yields_one_full_depth_path() {
        let store = SqliteStore::open_in_memory(8).unwrap();
        store.initialize().await.unwrap();
        store.store(&sample_record("x", "x")).await.unwrap();
        store.store(&sample_record("y", "y")).await.unwrap();
        store.store(&sample_record("z", "z")).await.unwrap();
        store
            .store_relationship(&sample_relationship("r1", "x", "y", 0.8))
            .await
            .unwrap();
        store
            .store_relationship(&sample_relationship("r2", "y", "z", 0.5))
            .await
            .unwrap();

        let result = store.traverse_graph("x", 2, None).await.unwrap();
        assert_eq!(result.paths.len(), 1);
        let path = &result.paths[0];
        assert_eq!(path.chunk_ids, vec!["x", "y", "z"]);
        assert_eq!(path.depth, 2);
        assert!((path.score - 0.4).abs() < 1e-9);

        let y_node = result.nodes.iter().find(|n| n.chunk_id == "y").unwrap();
        assert_eq!(y_node.degree, 2);
    }
}
