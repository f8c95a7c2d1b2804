// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars.

use std::path::PathBuf;

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_f64(name: &str, default: f64) -> f64 {
    read_env(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn read_u32(name: &str, default: u32) -> u32 {
    read_env(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn read_u64(name: &str, default: u64) -> u64 {
    read_env(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn read_bool(name: &str, default: bool) -> bool {
    read_env(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Engine-wide configuration, loaded once from the environment.
///
/// Every env var this engine reads is covered here; this struct is the
/// single place that reads them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service_name: String,
    pub service_version: String,

    pub db_path: PathBuf,
    pub db_pool_size: u32,

    pub embeddings_url: Option<String>,
    pub embeddings_api_key: Option<String>,
    pub embeddings_model: String,
    pub embeddings_dimensions: usize,

    /// Retention floor in days (§3 invariant 7: defaults to 90, never below it).
    pub retention_days: u32,

    pub progressive_search: bool,
    pub relaxed_min_relevance: f64,
    pub broadest_min_relevance: f64,
    pub max_related_repos: usize,

    pub bulk_batch_size: usize,
    pub bulk_max_concurrency: usize,

    pub decay_interval_hours: u64,
}

impl EngineConfig {
    pub const MIN_RETENTION_DAYS: u32 = 90;

    pub fn from_env() -> Self {
        let db_path = read_env("MEMORY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs_home()
                    .join(".claude-memory")
                    .join("memory.db")
            });

        let retention_days =
            read_u32("MEMORY_RETENTION_DAYS", Self::MIN_RETENTION_DAYS).max(Self::MIN_RETENTION_DAYS);

        let config = Self {
            service_name: read_env("SERVICE_NAME").unwrap_or_else(|| "claude-memory".to_string()),
            service_version: read_env("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            db_path,
            db_pool_size: read_u32("MEMORY_DB_POOL_SIZE", 8),
            embeddings_url: read_env("MEMORY_EMBEDDINGS_URL"),
            embeddings_api_key: read_env("MEMORY_EMBEDDINGS_API_KEY"),
            embeddings_model: read_env("MEMORY_EMBEDDINGS_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embeddings_dimensions: read_u32("MEMORY_EMBEDDINGS_DIMENSIONS", 1536) as usize,
            retention_days,
            progressive_search: read_bool("MEMORY_PROGRESSIVE_SEARCH", true),
            relaxed_min_relevance: read_f64("MEMORY_RELAXED_MIN_RELEVANCE", 0.4),
            broadest_min_relevance: read_f64("MEMORY_BROADEST_MIN_RELEVANCE", 0.15),
            max_related_repos: read_u32("MEMORY_MAX_RELATED_REPOS", 5) as usize,
            bulk_batch_size: read_u32("MEMORY_BULK_BATCH_SIZE", 50) as usize,
            bulk_max_concurrency: read_u32("MEMORY_BULK_MAX_CONCURRENCY", 3) as usize,
            decay_interval_hours: read_u64("MEMORY_DECAY_INTERVAL_HOURS", 24),
        };
        config.log_summary();
        config
    }

    pub fn has_embeddings(&self) -> bool {
        self.embeddings_url.is_some()
    }

    fn log_summary(&self) {
        tracing::info!(
            service = %self.service_name,
            version = %self.service_version,
            db_path = %self.db_path.display(),
            embeddings = self.has_embeddings(),
            retention_days = self.retention_days,
            "engine configuration loaded"
        );
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_floor_is_enforced() {
        // SAFETY: test-only env mutation, single-threaded within this test.
        unsafe { std::env::set_var("MEMORY_RETENTION_DAYS", "10") };
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.retention_days, EngineConfig::MIN_RETENTION_DAYS);
        unsafe { std::env::remove_var("MEMORY_RETENTION_DAYS") };
    }
}
