// src/decay.rs
// `DecayScheduler` (§4.11): an independent long-running task that enforces
// the retention floor and leaves an audit trail behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use memory_types::{Difficulty, Outcome, Record, RecordMetadata, RecordType, GLOBAL_REPOSITORY};
use tokio_util::sync::CancellationToken;

use crate::store::VectorStore;

const SYSTEM_CLEANUP_SESSION: &str = "system-cleanup";

pub struct DecayScheduler {
    store: Arc<dyn VectorStore>,
    retention_days: u32,
    interval: Duration,
}

impl DecayScheduler {
    pub fn new(store: Arc<dyn VectorStore>, retention_days: u32, interval: Duration) -> Self {
        Self {
            store,
            retention_days,
            interval,
        }
    }

    /// Runs until `cancel` fires. Spawn this as its own task at system start.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // first tick fires immediately; consume it.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("decay scheduler cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        tracing::error!(error = %e, "decay scheduler tick panicked/failed, continuing");
                    }
                }
            }
        }
    }

    /// One cleanup pass, exposed separately so a CLI `decay run-once`
    /// subcommand and tests don't need the full ticking loop.
    pub async fn tick_once(&self) -> crate::error::Result<u64> {
        let deleted = self.store.cleanup(self.retention_days).await?;
        if deleted > 0 {
            tracing::info!(deleted, "decay scheduler cleaned up stale records");
            let record = synthetic_cleanup_record(deleted, self.retention_days);
            if let Err(e) = self.store.store(&record).await {
                tracing::warn!(error = %e, "failed to record decay-scheduler audit entry");
            }
        }
        Ok(deleted)
    }
}

fn synthetic_cleanup_record(deleted: u64, retention_days: u32) -> Record {
    Record {
        id: memory_types::new_id(),
        session_id: format!("{GLOBAL_REPOSITORY}::{SYSTEM_CLEANUP_SESSION}"),
        timestamp: Utc::now(),
        record_type: RecordType::Analysis,
        content: format!(
            "Decay scheduler removed {deleted} record(s) older than the {retention_days}-day retention window."
        ),
        summary: format!("Decay cleanup removed {deleted} record(s)"),
        embedding: None,
        metadata: RecordMetadata {
            repository: GLOBAL_REPOSITORY.to_string(),
            branch: None,
            files_modified: Vec::new(),
            tools_used: Vec::new(),
            tags: vec!["system".to_string(), "decay".to_string()],
            outcome: Outcome::Success,
            difficulty: Difficulty::Simple,
            task_status: None,
            task_priority: None,
            extended_metadata: memory_types::ExtendedMetadata::new(),
        },
        related_chunks: Vec::new(),
        client_type: Some("decay-scheduler".to_string()),
        access_count: 0,
        last_accessed: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{build_record, NewRecordInput};
    use crate::store::sqlite::SqliteStore;

    #[tokio::test]
    async fn tick_once_records_audit_entry_on_deletion() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();

        let mut old_record = build_record(NewRecordInput {
            content: "ancient record".to_string(),
            session: "s1".to_string(),
            repository: Some(GLOBAL_REPOSITORY.to_string()),
            ..Default::default()
        })
        .unwrap();
        old_record.timestamp = Utc::now() - chrono::Duration::days(400);
        store.store(&old_record).await.unwrap();

        let scheduler = DecayScheduler::new(store.clone(), 90, Duration::from_secs(86400));
        let deleted = scheduler.tick_once().await.unwrap();
        assert_eq!(deleted, 1);

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_records, 1); // the synthetic audit record remains
    }

    #[tokio::test]
    async fn tick_once_is_quiet_when_nothing_to_clean() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let scheduler = DecayScheduler::new(store, 90, Duration::from_secs(86400));
        assert_eq!(scheduler.tick_once().await.unwrap(), 0);
    }
}
