// src/bulk/mod.rs
// `BulkEngine` (§4.9): batched store/update/delete with bounded concurrency,
// pollable progress, conflict policy, dry run; plus import/export and alias
// resolution, split into sibling modules.
//
// Worker-pool shape: bounded concurrency via a semaphore, one permit per
// in-flight batch, generalized from a single resource kind to store/update/
// delete.

pub(crate) mod alias;
pub(crate) mod import_export;

pub use alias::AliasManager;
pub use import_export::{ExportFormat, ExportPage, ImportSource};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use memory_types::Record;
use tokio::sync::Semaphore;

use crate::error::{MemoryError, Result};
use crate::store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Skip,
    Overwrite,
    Merge,
    Fail,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Skip
    }
}

pub enum BulkOperation {
    Store(Vec<Record>),
    Update(Vec<Record>),
    Delete(Vec<String>),
}

impl BulkOperation {
    fn len(&self) -> usize {
        match self {
            BulkOperation::Store(v) => v.len(),
            BulkOperation::Update(v) => v.len(),
            BulkOperation::Delete(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub conflict_policy: ConflictPolicy,
    pub continue_on_error: bool,
    pub dry_run: bool,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrency: 3,
            conflict_policy: ConflictPolicy::default(),
            continue_on_error: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OperationProgress {
    pub operation_id: String,
    pub status: OperationStatus,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    pub elapsed: Duration,
    pub estimated: Option<Duration>,
    pub errors: Vec<String>,
}

impl OperationProgress {
    fn new(operation_id: String, total_batches: usize) -> Self {
        Self {
            operation_id,
            status: OperationStatus::Pending,
            processed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            current_batch: 0,
            total_batches,
            elapsed: Duration::ZERO,
            estimated: None,
            errors: Vec::new(),
        }
    }
}

struct OperationHandle {
    started: Instant,
    total_items: usize,
}

pub struct BulkEngine {
    store: Arc<dyn VectorStore>,
    progress: Mutex<HashMap<String, OperationProgress>>,
    handles: Mutex<HashMap<String, OperationHandle>>,
}

impl BulkEngine {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            progress: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_progress(&self, operation_id: &str) -> Result<OperationProgress> {
        self.progress
            .lock()
            .unwrap()
            .get(operation_id)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(format!("bulk operation {operation_id}")))
    }

    /// Runs the operation to completion and returns its final `operation_id`
    /// (progress remains queryable via `get_progress` afterward).
    pub async fn run(&self, operation: BulkOperation, config: &BulkConfig) -> Result<String> {
        let operation_id = memory_types::new_id();
        let total_items = operation.len();
        let batch_size = config.batch_size.max(1);
        let total_batches = total_items.div_ceil(batch_size);

        {
            let mut progress = self.progress.lock().unwrap();
            progress.insert(
                operation_id.clone(),
                OperationProgress::new(operation_id.clone(), total_batches),
            );
            self.handles.lock().unwrap().insert(
                operation_id.clone(),
                OperationHandle {
                    started: Instant::now(),
                    total_items,
                },
            );
        }
        self.set_status(&operation_id, OperationStatus::Running);

        if config.dry_run {
            self.finish(&operation_id, total_items, 0, 0, Vec::new());
            return Ok(operation_id);
        }

        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let mut batch_futures = Vec::new();

        match operation {
            BulkOperation::Store(records) => {
                for (batch_index, batch) in records.chunks(batch_size).enumerate() {
                    let batch = batch.to_vec();
                    let store = self.store.clone();
                    let semaphore = semaphore.clone();
                    let policy = config.conflict_policy;
                    batch_futures.push(Box::pin(async move {
                        let _permit = semaphore.acquire_owned().await.unwrap();
                        run_store_batch(&store, &batch, policy).await
                            .map(|r| (batch_index, r))
                    })
                        as std::pin::Pin<Box<dyn std::future::Future<Output = Result<(usize, BatchOutcome)>> + Send>>);
                }
            }
            BulkOperation::Update(records) => {
                for (batch_index, batch) in records.chunks(batch_size).enumerate() {
                    let batch = batch.to_vec();
                    let store = self.store.clone();
                    let semaphore = semaphore.clone();
                    batch_futures.push(Box::pin(async move {
                        let _permit = semaphore.acquire_owned().await.unwrap();
                        run_update_batch(&store, &batch).await.map(|r| (batch_index, r))
                    })
                        as std::pin::Pin<Box<dyn std::future::Future<Output = Result<(usize, BatchOutcome)>> + Send>>);
                }
            }
            BulkOperation::Delete(ids) => {
                for (batch_index, batch) in ids.chunks(batch_size).enumerate() {
                    let batch = batch.to_vec();
                    let store = self.store.clone();
                    let semaphore = semaphore.clone();
                    batch_futures.push(Box::pin(async move {
                        let _permit = semaphore.acquire_owned().await.unwrap();
                        run_delete_batch(&store, &batch).await.map(|r| (batch_index, r))
                    })
                        as std::pin::Pin<Box<dyn std::future::Future<Output = Result<(usize, BatchOutcome)>> + Send>>);
                }
            }
        }

        let results = futures::future::join_all(batch_futures).await;

        let mut successful = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut errors = Vec::new();
        let mut completed_batches = 0;
        let mut aborted = false;

        let mut ordered: Vec<(usize, BatchOutcome)> = Vec::new();
        for result in results {
            match result {
                Ok(pair) => ordered.push(pair),
                Err(e) => {
                    errors.push(e.to_string());
                    if !config.continue_on_error {
                        aborted = true;
                    }
                }
            }
        }
        ordered.sort_by_key(|(i, _)| *i);

        for (_, outcome) in ordered {
            successful += outcome.successful;
            failed += outcome.failed;
            skipped += outcome.skipped;
            errors.extend(outcome.errors);
            completed_batches += 1;
            self.update_batch_progress(&operation_id, completed_batches, successful, failed, skipped);
            if failed > 0 && !config.continue_on_error {
                aborted = true;
                break;
            }
        }

        let status = if aborted || (failed > 0 && !errors.is_empty() && !config.continue_on_error) {
            OperationStatus::Failed
        } else {
            OperationStatus::Completed
        };
        self.finish_with_status(&operation_id, successful, failed, skipped, errors, status);

        Ok(operation_id)
    }

    fn set_status(&self, operation_id: &str, status: OperationStatus) {
        if let Some(p) = self.progress.lock().unwrap().get_mut(operation_id) {
            p.status = status;
        }
    }

    fn update_batch_progress(
        &self,
        operation_id: &str,
        current_batch: usize,
        successful: usize,
        failed: usize,
        skipped: usize,
    ) {
        let elapsed = self
            .handles
            .lock()
            .unwrap()
            .get(operation_id)
            .map(|h| h.started.elapsed())
            .unwrap_or_default();
        let mut progress = self.progress.lock().unwrap();
        if let Some(p) = progress.get_mut(operation_id) {
            p.current_batch = current_batch;
            p.processed = successful + failed + skipped;
            p.successful = successful;
            p.failed = failed;
            p.skipped = skipped;
            p.elapsed = elapsed;
            if current_batch > 0 && p.total_batches > current_batch {
                let per_batch = elapsed.as_secs_f64() / current_batch as f64;
                p.estimated = Some(Duration::from_secs_f64(
                    per_batch * (p.total_batches - current_batch) as f64,
                ));
            }
        }
    }

    fn finish(
        &self,
        operation_id: &str,
        processed: usize,
        successful: usize,
        failed: usize,
        errors: Vec<String>,
    ) {
        self.finish_with_status(
            operation_id,
            successful,
            failed,
            processed.saturating_sub(successful + failed),
            errors,
            OperationStatus::Completed,
        );
    }

    fn finish_with_status(
        &self,
        operation_id: &str,
        successful: usize,
        failed: usize,
        skipped: usize,
        errors: Vec<String>,
        status: OperationStatus,
    ) {
        let elapsed = self
            .handles
            .lock()
            .unwrap()
            .get(operation_id)
            .map(|h| h.started.elapsed())
            .unwrap_or_default();
        let mut progress = self.progress.lock().unwrap();
        if let Some(p) = progress.get_mut(operation_id) {
            p.status = status;
            p.successful = successful;
            p.failed = failed;
            p.skipped = skipped;
            p.processed = successful + failed + skipped;
            p.elapsed = elapsed;
            p.estimated = Some(Duration::ZERO);
            p.errors = errors;
        }
    }
}

struct BatchOutcome {
    successful: usize,
    failed: usize,
    skipped: usize,
    errors: Vec<String>,
}

async fn run_store_batch(
    store: &Arc<dyn VectorStore>,
    records: &[Record],
    policy: ConflictPolicy,
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome {
        successful: 0,
        failed: 0,
        skipped: 0,
        errors: Vec::new(),
    };
    for record in records {
        let exists = store.get_by_id(&record.id).await?.is_some();
        if exists {
            match policy {
                ConflictPolicy::Skip => {
                    outcome.skipped += 1;
                    continue;
                }
                ConflictPolicy::Fail => {
                    return Err(MemoryError::Conflict(format!(
                        "record {} already exists",
                        record.id
                    )));
                }
                ConflictPolicy::Overwrite | ConflictPolicy::Merge => {
                    if let Err(e) = store.update(record).await {
                        outcome.failed += 1;
                        outcome.errors.push(e.to_string());
                        continue;
                    }
                    outcome.successful += 1;
                    continue;
                }
            }
        }
        match store.store(record).await {
            Ok(()) => outcome.successful += 1,
            Err(e) => {
                outcome.failed += 1;
                outcome.errors.push(e.to_string());
            }
        }
    }
    Ok(outcome)
}

async fn run_update_batch(store: &Arc<dyn VectorStore>, records: &[Record]) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome {
        successful: 0,
        failed: 0,
        skipped: 0,
        errors: Vec::new(),
    };
    for record in records {
        match store.update(record).await {
            Ok(()) => outcome.successful += 1,
            Err(e) => {
                outcome.failed += 1;
                outcome.errors.push(e.to_string());
            }
        }
    }
    Ok(outcome)
}

async fn run_delete_batch(store: &Arc<dyn VectorStore>, ids: &[String]) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome {
        successful: 0,
        failed: 0,
        skipped: 0,
        errors: Vec::new(),
    };
    for id in ids {
        match store.delete(id).await {
            Ok(()) => outcome.successful += 1,
            Err(e) => {
                outcome.failed += 1;
                outcome.errors.push(e.to_string());
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use memory_types::{Difficulty, Outcome, RecordMetadata, RecordType, GLOBAL_REPOSITORY};
    use chrono::Utc;

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            session_id: "s1".to_string(),
            timestamp: Utc::now(),
            record_type: RecordType::Discussion,
            content: "x".to_string(),
            summary: "x".to_string(),
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
    async fn bulk_store_batches_and_completes() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let engine = BulkEngine::new(store.clone());

        let records: Vec<Record> = (0..120).map(|i| record(&format!("r{i}"))).collect();
        let config = BulkConfig {
            batch_size: 50,
            max_concurrency: 3,
            ..Default::default()
        };
        let op_id = engine
            .run(BulkOperation::Store(records), &config)
            .await
            .unwrap();

        let progress = engine.get_progress(&op_id).unwrap();
        assert_eq!(progress.status, OperationStatus::Completed);
        assert_eq!(progress.successful, 120);
        assert_eq!(progress.total_batches, 3);
    }

    #[tokio::test]
    async fn dry_run_does_not_write() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let engine = BulkEngine::new(store.clone());

        let config = BulkConfig {
            dry_run: true,
            ..Default::default()
        };
        engine
            .run(BulkOperation::Store(vec![record("r1")]), &config)
            .await
            .unwrap();

        assert!(store.get_by_id("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conflict_skip_policy_skips_existing() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        store.store(&record("r1")).await.unwrap();

        let engine = BulkEngine::new(store);
        let op_id = engine
            .run(
                BulkOperation::Store(vec![record("r1")]),
                &BulkConfig::default(),
            )
            .await
            .unwrap();
        let progress = engine.get_progress(&op_id).unwrap();
        assert_eq!(progress.skipped, 1);
    }
}
