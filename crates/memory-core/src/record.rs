// src/record.rs
// RecordModel: construction, normalization, and validation of `Record`s.

use chrono::Utc;
use memory_types::{Difficulty, Outcome, Record, RecordMetadata, RecordType, GLOBAL_REPOSITORY};

use crate::error::{MemoryError, Result};
use crate::session;

/// Input accepted by `store_chunk` / `store_decision` / similar handlers,
/// before a `Record` exists.
#[derive(Debug, Clone, Default)]
pub struct NewRecordInput {
    pub content: String,
    pub summary: Option<String>,
    pub record_type: Option<RecordType>,
    pub repository: Option<String>,
    pub session: String,
    pub branch: Option<String>,
    pub files_modified: Vec<String>,
    pub tools_used: Vec<String>,
    pub tags: Vec<String>,
    pub outcome: Option<Outcome>,
    pub difficulty: Option<Difficulty>,
    pub task_status: Option<String>,
    pub task_priority: Option<String>,
    pub client_type: Option<String>,
    pub parent_chunk: Option<String>,
}

/// Normalize a repository identifier per §4.1:
/// - empty → `_global`
/// - URL-like (contains `.` and looks like a host) → kept as-is
/// - otherwise passed through unchanged; probing a local VCS remote is a
///   caller-side concern (outside the core, per §1 non-goals on transport).
pub fn normalize_repository(repo: &str) -> String {
    let trimmed = repo.trim();
    if trimmed.is_empty() {
        return GLOBAL_REPOSITORY.to_string();
    }
    trimmed.to_string()
}

/// Build a validated `Record` from handler input. Rejects empty content or
/// empty session per the invariants in spec §3.
pub fn build_record(input: NewRecordInput) -> Result<Record> {
    if input.content.trim().is_empty() {
        return Err(MemoryError::Validation(
            "content must not be empty".to_string(),
        ));
    }
    if input.session.trim().is_empty() {
        return Err(MemoryError::Validation(
            "session_id must not be empty".to_string(),
        ));
    }

    let repository = normalize_repository(input.repository.as_deref().unwrap_or(""));
    // `input.session` may itself look like `other::thing` — treat that as a
    // literal session name, not a repository override; `repository` above is
    // the only source of the repo-part so the invariant
    // extract_repository(session_id) == metadata.repository always holds.
    let session_id = session::compose(&repository, &session::normalize(&input.session));

    let mut extended_metadata = memory_types::ExtendedMetadata::new();
    if let Some(parent) = &input.parent_chunk {
        extended_metadata.insert(
            "parent_chunk".to_string(),
            serde_json::Value::String(parent.clone()),
        );
    }

    let summary = input
        .summary
        .unwrap_or_else(|| derive_summary(&input.content));

    Ok(Record {
        id: memory_types::new_id(),
        session_id,
        timestamp: Utc::now(),
        record_type: input.record_type.unwrap_or(RecordType::Discussion),
        content: input.content,
        summary,
        embedding: None,
        metadata: RecordMetadata {
            repository,
            branch: input.branch,
            files_modified: input.files_modified,
            tools_used: input.tools_used,
            tags: input.tags,
            outcome: input.outcome.unwrap_or_default(),
            difficulty: input.difficulty.unwrap_or_default(),
            task_status: input.task_status,
            task_priority: input.task_priority,
            extended_metadata,
        },
        related_chunks: Vec::new(),
        client_type: input.client_type,
        access_count: 0,
        last_accessed: None,
    })
}

/// Derive a short label from content when the caller doesn't supply one:
/// first non-empty line, truncated to ~120 chars on a word boundary.
pub fn derive_summary(content: &str) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(content.trim());

    const MAX: usize = 120;
    if first_line.chars().count() <= MAX {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(MAX).collect();
    match truncated.rfind(' ') {
        Some(idx) if idx > MAX / 2 => format!("{}…", &truncated[..idx]),
        _ => format!("{truncated}…"),
    }
}

/// Validate that an embedding's dimensionality matches the deployment's
/// fixed dimension (§3 invariant 5).
pub fn validate_embedding_dimensions(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(MemoryError::Validation(format!(
            "embedding has {} dimensions, expected {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_repository_normalizes_to_global() {
        assert_eq!(normalize_repository(""), GLOBAL_REPOSITORY);
        assert_eq!(normalize_repository("   "), GLOBAL_REPOSITORY);
    }

    #[test]
    fn url_like_repository_is_kept_as_is() {
        assert_eq!(
            normalize_repository("github.com/x/y"),
            "github.com/x/y"
        );
    }

    #[test]
    fn build_record_rejects_empty_content() {
        let input = NewRecordInput {
            content: "   ".into(),
            session: "s1".into(),
            ..Default::default()
        };
        assert!(build_record(input).is_err());
    }

    #[test]
    fn build_record_rejects_empty_session() {
        let input = NewRecordInput {
            content: "hello".into(),
            session: "".into(),
            ..Default::default()
        };
        assert!(build_record(input).is_err());
    }

    #[test]
    fn session_id_is_always_composite() {
        let input = NewRecordInput {
            content: "hello".into(),
            session: "auth-fix".into(),
            repository: Some("github.com/x/y".into()),
            ..Default::default()
        };
        let record = build_record(input).unwrap();
        assert_eq!(
            session::extract_repository(&record.session_id),
            record.metadata.repository
        );
    }

    #[test]
    fn session_with_embedded_separator_does_not_override_repository() {
        let input = NewRecordInput {
            content: "hello".into(),
            session: "otherrepo::sess1".into(),
            repository: Some("github.com/x/y".into()),
            ..Default::default()
        };
        let record = build_record(input).unwrap();
        assert_eq!(
            session::extract_repository(&record.session_id),
            "github.com/x/y"
        );
        assert_eq!(record.metadata.repository, "github.com/x/y");
    }

    #[test]
    fn embedding_dimension_mismatch_is_rejected() {
        assert!(validate_embedding_dimensions(&[0.0; 10], 1536).is_err());
        assert!(validate_embedding_dimensions(&[0.0; 1536], 1536).is_ok());
    }
}
