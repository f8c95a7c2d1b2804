// src/threads/mod.rs
// `ThreadManager` (§4.6): grouping records into coherent threads, detection,
// and lifecycle.
//
// Same thin-manager-over-`VectorStore` shape as `relationships::RelationshipGraph`,
// reusing the session/temporal-window conventions already established in
// `relationships::detect::temporal`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use memory_types::{Record, Thread, ThreadStatus, ThreadType};

use crate::error::{MemoryError, Result};
use crate::store::{ThreadQuery, VectorStore};

/// Records within this many seconds of each other, in the same session, are
/// candidates for the same detected thread (mirrors
/// `relationships::detect::TEMPORAL_WINDOW_SECONDS`, but wider — threads
/// group a conversation arc, not a single causal hop).
const DETECTION_WINDOW_SECONDS: i64 = 4 * 3600;

#[derive(Debug, Clone)]
pub struct CreateThreadInput {
    pub chunk_ids: Vec<String>,
    pub thread_type: ThreadType,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateThreadInput {
    pub status: Option<ThreadStatus>,
    pub title: Option<String>,
    pub add_chunk_ids: Vec<String>,
    pub remove_chunk_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub min_thread_size: usize,
    /// When false, detected threads are persisted for the caller to preview
    /// and then rolled back (deleted) unless explicitly kept.
    pub auto_create: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_thread_size: 2,
            auto_create: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectedThread {
    pub thread: Thread,
    pub detection_method: String,
}

pub struct ThreadManager {
    store: Arc<dyn VectorStore>,
}

impl ThreadManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// §4.6 creation: load the records, derive a title, record contributing
    /// sessions and the repository of the first chunk, persist.
    pub async fn create(&self, input: CreateThreadInput) -> Result<Thread> {
        if input.chunk_ids.is_empty() {
            return Err(MemoryError::Validation(
                "chunk_ids must not be empty. Example: {\"chunk_ids\": [\"<id>\"], \"type\": \"debugging\"}"
                    .to_string(),
            ));
        }

        let mut records = Vec::with_capacity(input.chunk_ids.len());
        for id in &input.chunk_ids {
            let record = self
                .store
                .get_by_id(id)
                .await?
                .ok_or_else(|| MemoryError::NotFound(format!("chunk {id}")))?;
            records.push(record);
        }

        let repository = records[0].metadata.repository.clone();
        if let Some(other) = records
            .iter()
            .find(|r| r.metadata.repository != repository)
        {
            return Err(MemoryError::Validation(format!(
                "all chunk_ids must belong to the same repository: chunk {} is in {:?}, expected {:?}",
                other.id, other.metadata.repository, repository
            )));
        }
        let title = input
            .title
            .unwrap_or_else(|| derive_title(&records));

        let mut session_ids = Vec::new();
        for record in &records {
            if !session_ids.contains(&record.session_id) {
                session_ids.push(record.session_id.clone());
            }
        }

        let now = Utc::now();
        let thread = Thread {
            id: memory_types::new_id(),
            title,
            description: String::new(),
            thread_type: input.thread_type,
            status: ThreadStatus::Active,
            repository,
            chunk_ids: input.chunk_ids,
            session_ids,
            tags: input.tags,
            priority: input.priority,
            start_time: records.iter().map(|r| r.timestamp).min().unwrap_or(now),
            last_update: now,
            end_time: None,
        };
        self.store.store_thread(&thread).await?;
        Ok(thread)
    }

    /// §4.6 update: status/title replace, add is set-union, remove filters;
    /// `last_update` is always bumped.
    pub async fn update(&self, id: &str, input: UpdateThreadInput) -> Result<Thread> {
        let mut thread = self
            .store
            .get_thread_by_id(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("thread {id}")))?;

        if let Some(status) = input.status {
            if status == ThreadStatus::Complete || status == ThreadStatus::Abandoned {
                thread.end_time.get_or_insert(Utc::now());
            }
            thread.status = status;
        }
        if let Some(title) = input.title {
            thread.title = title;
        }
        for chunk_id in input.add_chunk_ids {
            thread.add_chunk(chunk_id);
        }
        for chunk_id in &input.remove_chunk_ids {
            thread.remove_chunk(chunk_id);
        }
        thread.last_update = Utc::now();

        self.store.update_thread(&thread).await?;
        Ok(thread)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Thread>> {
        self.store.get_thread_by_id(id).await
    }

    pub async fn list(&self, query: &ThreadQuery) -> Result<Vec<Thread>> {
        self.store.list_threads(query).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_thread(id).await
    }

    /// §4.6 detection: cluster a repository's records by temporal proximity +
    /// session identity + type-transition patterns. When `auto_create` is
    /// false the caller gets to preview the persisted candidates; rollback
    /// (deleting them) is the caller's responsibility via `discard_preview`.
    pub async fn detect(
        &self,
        repository: &str,
        config: &DetectionConfig,
    ) -> Result<Vec<DetectedThread>> {
        let records = self.store.get_all_chunks(Some(repository)).await?;
        let clusters = cluster_by_session_and_time(&records);

        let mut detected = Vec::new();
        for cluster in clusters {
            if cluster.len() < config.min_thread_size {
                continue;
            }
            let chunk_ids: Vec<String> = cluster.iter().map(|r| r.id.clone()).collect();
            let mut session_ids = Vec::new();
            for record in &cluster {
                if !session_ids.contains(&record.session_id) {
                    session_ids.push(record.session_id.clone());
                }
            }
            let thread_type = infer_thread_type(&cluster);
            let now = Utc::now();
            let thread = Thread {
                id: memory_types::new_id(),
                title: derive_title(&cluster),
                description: String::new(),
                thread_type,
                status: ThreadStatus::Active,
                repository: repository.to_string(),
                chunk_ids,
                session_ids,
                tags: Vec::new(),
                priority: None,
                start_time: cluster.iter().map(|r| r.timestamp).min().unwrap_or(now),
                last_update: now,
                end_time: None,
            };
            self.store.store_thread(&thread).await?;
            detected.push(DetectedThread {
                thread,
                detection_method: "temporal_session_cluster".to_string(),
            });
        }

        if !config.auto_create {
            for d in &detected {
                self.store.delete_thread(&d.thread.id).await?;
            }
        }
        Ok(detected)
    }
}

fn derive_title(records: &[Record]) -> String {
    records
        .iter()
        .max_by_key(|r| r.summary.len())
        .map(|r| r.summary.clone())
        .unwrap_or_else(|| "untitled thread".to_string())
}

fn infer_thread_type(records: &[Record]) -> ThreadType {
    use memory_types::RecordType::*;
    if records
        .iter()
        .any(|r| r.record_type == ArchitectureDecision)
    {
        ThreadType::Architecture
    } else if records.iter().any(|r| r.record_type == Problem) {
        ThreadType::Debugging
    } else if records.iter().any(|r| r.record_type == Task) {
        ThreadType::Feature
    } else if records.iter().any(|r| r.record_type == Question) {
        ThreadType::ProblemSolving
    } else {
        ThreadType::Conversation
    }
}

fn cluster_by_session_and_time(records: &[Record]) -> Vec<Vec<Record>> {
    let mut by_session: HashMap<&str, Vec<&Record>> = HashMap::new();
    for record in records {
        by_session
            .entry(record.session_id.as_str())
            .or_default()
            .push(record);
    }

    let mut clusters = Vec::new();
    for mut group in by_session.into_values() {
        group.sort_by_key(|r| r.timestamp);
        let mut current: Vec<Record> = Vec::new();
        for record in group {
            if let Some(last) = current.last() {
                let gap = (record.timestamp - last.timestamp).num_seconds().abs();
                if gap > DETECTION_WINDOW_SECONDS {
                    clusters.push(std::mem::take(&mut current));
                }
            }
            current.push(record.clone());
        }
        if !current.is_empty() {
            clusters.push(current);
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use memory_types::{Difficulty, Outcome, RecordMetadata, RecordType, GLOBAL_REPOSITORY};

    fn record(id: &str, session: &str, minutes_offset: i64) -> Record {
        Record {
            id: id.to_string(),
            session_id: session.to_string(),
            timestamp: Utc::now() + chrono::Duration::minutes(minutes_offset),
            record_type: RecordType::Discussion,
            content: "some content about a topic".to_string(),
            summary: "some content about a topic".to_string(),
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
    async fn create_thread_persists_and_derives_repository() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        store.store(&record("r1", "s1", 0)).await.unwrap();
        store.store(&record("r2", "s1", 5)).await.unwrap();

        let manager = ThreadManager::new(store);
        let thread = manager
            .create(CreateThreadInput {
                chunk_ids: vec!["r1".into(), "r2".into()],
                thread_type: ThreadType::Debugging,
                title: None,
                tags: vec![],
                priority: None,
            })
            .await
            .unwrap();

        assert_eq!(thread.repository, GLOBAL_REPOSITORY);
        assert_eq!(thread.chunk_ids.len(), 2);
    }

    #[tokio::test]
    async fn create_thread_rejects_chunks_from_different_repositories() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let mut other = record("r2", "s1", 5);
        other.metadata.repository = "github.com/other/repo".to_string();
        store.store(&record("r1", "s1", 0)).await.unwrap();
        store.store(&other).await.unwrap();

        let manager = ThreadManager::new(store);
        let result = manager
            .create(CreateThreadInput {
                chunk_ids: vec!["r1".into(), "r2".into()],
                thread_type: ThreadType::Debugging,
                title: None,
                tags: vec![],
                priority: None,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn detect_without_auto_create_rolls_back() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        store.store(&record("r1", "s1", 0)).await.unwrap();
        store.store(&record("r2", "s1", 5)).await.unwrap();

        let manager = ThreadManager::new(store.clone());
        let config = DetectionConfig {
            min_thread_size: 2,
            auto_create: false,
        };
        let detected = manager
            .detect(GLOBAL_REPOSITORY, &config)
            .await
            .unwrap();
        assert_eq!(detected.len(), 1);
        assert!(store
            .get_thread_by_id(&detected[0].thread.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_bumps_last_update_and_adds_chunks() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        store.store(&record("r1", "s1", 0)).await.unwrap();

        let manager = ThreadManager::new(store);
        let thread = manager
            .create(CreateThreadInput {
                chunk_ids: vec!["r1".into()],
                thread_type: ThreadType::Conversation,
                title: Some("t".into()),
                tags: vec![],
                priority: None,
            })
            .await
            .unwrap();
        let before = thread.last_update;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = manager
            .update(
                &thread.id,
                UpdateThreadInput {
                    add_chunk_ids: vec!["r2".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.last_update > before);
        assert!(updated.chunk_ids.contains(&"r2".to_string()));
    }
}
