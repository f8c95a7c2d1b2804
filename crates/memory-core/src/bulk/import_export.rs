// src/bulk/import_export.rs
// Import/export halves of §4.9: conversation/file/archive ingestion via
// `Chunking`, and paginated json/markdown/archive export.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use memory_types::Record;
use serde::{Deserialize, Serialize};

use crate::chunking::{ChunkMeta, Chunking};
use crate::embeddings::Embeddings;
use crate::error::{MemoryError, Result};
use crate::store::VectorStore;

pub const DEFAULT_EXPORT_PAGE: usize = 100;
pub const MAX_EXPORT_PAGE: usize = 500;

#[derive(Debug, Clone)]
pub enum ImportSource {
    Conversation(String),
    File { name: String, content: String },
    /// Base64-encoded JSON archive (`{"chunks": [...]}, ...}`, see `ArchiveFile`).
    Archive(String),
}

#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub stored: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveFile {
    repository: String,
    export_date: String,
    chunks: Vec<Record>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// §4.9 Import: conversation/file delegate to `Chunking`; archive decodes
/// directly. Every imported record is tagged `imported` + `source_system`,
/// gets an embedding (best-effort), and is stored.
pub async fn import(
    source: ImportSource,
    repository: &str,
    session: &str,
    source_system: &str,
    chunking: &dyn Chunking,
    embeddings: &Arc<dyn Embeddings>,
    store: &Arc<dyn VectorStore>,
) -> Result<ImportResult> {
    let mut records = match source {
        ImportSource::Conversation(text) => {
            let meta = ChunkMeta {
                repository: Some(repository.to_string()),
                branch: None,
                client_type: Some(source_system.to_string()),
                tags: vec!["imported".to_string(), source_system.to_string()],
            };
            vec![chunking.create_chunk(session, &text, meta).await?]
        }
        ImportSource::File { name, content } => {
            let meta = ChunkMeta {
                repository: Some(repository.to_string()),
                branch: None,
                client_type: Some(source_system.to_string()),
                tags: vec!["imported".to_string(), source_system.to_string(), name],
            };
            vec![chunking.create_chunk(session, &content, meta).await?]
        }
        ImportSource::Archive(encoded) => {
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|e| MemoryError::Validation(format!("invalid base64 archive: {e}")))?;
            let archive: ArchiveFile = serde_json::from_slice(&bytes)
                .map_err(|e| MemoryError::Validation(format!("invalid archive JSON: {e}")))?;
            archive
                .chunks
                .into_iter()
                .map(|mut record| {
                    record.metadata.repository = repository.to_string();
                    for tag in ["imported", source_system] {
                        if !record.metadata.tags.iter().any(|t| t == tag) {
                            record.metadata.tags.push(tag.to_string());
                        }
                    }
                    record
                })
                .collect()
        }
    };

    let mut result = ImportResult::default();
    for record in &mut records {
        if record.embedding.is_none() {
            match embeddings.embed(&record.content).await {
                Ok(vector) => record.embedding = Some(vector),
                Err(e) => {
                    tracing::debug!("import proceeding without embedding: {e}");
                }
            }
        }
        match store.store(record).await {
            Ok(()) => result.stored.push(record.id.clone()),
            Err(e) => result.errors.push(e.to_string()),
        }
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
    Archive,
}

#[derive(Debug, Clone)]
pub struct ExportPage {
    pub content: String,
    pub returned: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// §4.9 Export: paginated (default 100, max 500), optionally excluding
/// embeddings; archive format is base64 over the same JSON shape `import`
/// reads back.
pub async fn export_page(
    store: &Arc<dyn VectorStore>,
    repository: &str,
    format: ExportFormat,
    offset: usize,
    limit: usize,
    include_embeddings: bool,
) -> Result<ExportPage> {
    let limit = if limit == 0 {
        DEFAULT_EXPORT_PAGE
    } else {
        limit.min(MAX_EXPORT_PAGE)
    };
    // Overfetch by one to detect `has_more` without a separate count query.
    let mut records = store
        .list_by_repository(repository, limit + 1, offset)
        .await?;
    let has_more = records.len() > limit;
    records.truncate(limit);
    if !include_embeddings {
        for record in &mut records {
            record.embedding = None;
        }
    }

    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&records)
            .map_err(|e| MemoryError::Internal(format!("export serialize: {e}")))?,
        ExportFormat::Markdown => render_markdown(&records),
        ExportFormat::Archive => {
            let archive = ArchiveFile {
                repository: repository.to_string(),
                export_date: chrono::Utc::now().to_rfc3339(),
                chunks: records.clone(),
                metadata: serde_json::json!({ "count": records.len() }),
            };
            let json = serde_json::to_vec(&archive)
                .map_err(|e| MemoryError::Internal(format!("archive serialize: {e}")))?;
            BASE64.encode(json)
        }
    };

    Ok(ExportPage {
        content,
        returned: records.len(),
        offset,
        has_more,
    })
}

fn render_markdown(records: &[Record]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&format!("## {}\n\n", record.summary));
        out.push_str(&format!(
            "- type: {}\n- session: {}\n- timestamp: {}\n\n",
            record.record_type,
            record.session_id,
            record.timestamp.to_rfc3339()
        ));
        out.push_str(&record.content);
        out.push_str("\n\n---\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::HeuristicChunking;
    use crate::embeddings::NoopEmbeddings;
    use crate::store::sqlite::SqliteStore;
    use memory_types::GLOBAL_REPOSITORY;

    #[tokio::test]
    async fn import_conversation_tags_and_stores() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let embeddings: Arc<dyn Embeddings> = Arc::new(NoopEmbeddings::new(8));
        let chunking = HeuristicChunking;

        let result = import(
            ImportSource::Conversation("Fixed the login bug by rotating the token".to_string()),
            GLOBAL_REPOSITORY,
            "s1",
            "claude-code",
            &chunking,
            &embeddings,
            &store,
        )
        .await
        .unwrap();

        assert_eq!(result.stored.len(), 1);
        let record = store.get_by_id(&result.stored[0]).await.unwrap().unwrap();
        assert!(record.metadata.tags.contains(&"imported".to_string()));
        assert!(record.metadata.tags.contains(&"claude-code".to_string()));
    }

    #[tokio::test]
    async fn export_pages_are_disjoint() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        for i in 0..250 {
            let mut record = crate::record::build_record(crate::record::NewRecordInput {
                content: format!("record {i}"),
                session: "s1".to_string(),
                repository: Some(GLOBAL_REPOSITORY.to_string()),
                ..Default::default()
            })
            .unwrap();
            record.timestamp = chrono::Utc::now() - chrono::Duration::seconds(i);
            store.store(&record).await.unwrap();
        }

        let page1 = export_page(&store, GLOBAL_REPOSITORY, ExportFormat::Json, 0, 100, false)
            .await
            .unwrap();
        let page2 = export_page(&store, GLOBAL_REPOSITORY, ExportFormat::Json, 100, 100, false)
            .await
            .unwrap();
        assert_eq!(page1.returned, 100);
        assert!(page1.has_more);
        assert_ne!(page1.content, page2.content);
    }
}
