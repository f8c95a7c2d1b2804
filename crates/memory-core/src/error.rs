// src/error.rs
// Standardized error type for the memory engine.

use thiserror::Error;

/// Main error type for the memory engine.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Missing/malformed parameter. Message should include a literal example
    /// payload when a required field is missing, per §6/§7.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("scope violation: {0}")]
    ScopeViolation(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Validation error that embeds a usage example, so AI callers can
    /// self-correct without round-tripping a schema lookup.
    pub fn missing_field(tool: &str, field: &str, example: &str) -> Self {
        MemoryError::Validation(format!(
            "'{field}' is required for {tool}. Example: {example}"
        ))
    }

    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::Storage(err.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for MemoryError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        MemoryError::Storage(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for MemoryError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        MemoryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Internal(format!("json: {err}"))
    }
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        MemoryError::Storage(format!("embeddings request failed: {err}"))
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            MemoryError::Timeout("background task cancelled".into())
        } else {
            MemoryError::Internal(err.to_string())
        }
    }
}

impl From<anyhow::Error> for MemoryError {
    fn from(err: anyhow::Error) -> Self {
        MemoryError::Internal(err.to_string())
    }
}
