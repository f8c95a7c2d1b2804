// src/chunking.rs
// `Chunking` capability: classifies raw text into a record type.
//
// Per §1 this is an external collaborator — the core only depends on its
// `create_chunk` contract. A heuristic default implementation is provided so
// `bulk_import`'s conversation/file import paths (§4.9) have something to
// call without requiring a caller to bring their own classifier.

use async_trait::async_trait;
use memory_types::{Record, RecordType};

use crate::error::Result;
use crate::record::{build_record, NewRecordInput};

/// Minimal metadata a chunking call needs beyond the raw content.
#[derive(Debug, Clone, Default)]
pub struct ChunkMeta {
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub client_type: Option<String>,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait Chunking: Send + Sync {
    /// Classify `content` into a `Record`, scoped to `session`.
    async fn create_chunk(&self, session: &str, content: &str, meta: ChunkMeta) -> Result<Record>;
}

/// Heuristic keyword-based classifier: good enough for import paths that
/// don't carry an explicit type, not intended to compete with an LLM-backed
/// implementation a caller may substitute.
pub struct HeuristicChunking;

impl HeuristicChunking {
    fn classify(content: &str) -> RecordType {
        let lower = content.to_lowercase();
        const PROBLEM_MARKERS: &[&str] = &["error", "bug", "fails", "broken", "issue", "crash"];
        const SOLUTION_MARKERS: &[&str] = &["fixed", "resolved", "solution", "works now"];
        const DECISION_MARKERS: &[&str] = &["decided to", "we will use", "architecture", "adopt"];
        const CODE_MARKERS: &[&str] = &["diff --git", "```", "fn ", "def ", "class ", "commit"];
        const TASK_MARKERS: &[&str] = &["todo", "task:", "next steps", "plan to"];
        const QUESTION_MARKERS: &[&str] = &["?"];

        if DECISION_MARKERS.iter().any(|m| lower.contains(m)) {
            RecordType::ArchitectureDecision
        } else if SOLUTION_MARKERS.iter().any(|m| lower.contains(m)) {
            RecordType::Solution
        } else if PROBLEM_MARKERS.iter().any(|m| lower.contains(m)) {
            RecordType::Problem
        } else if CODE_MARKERS.iter().any(|m| lower.contains(m)) {
            RecordType::CodeChange
        } else if TASK_MARKERS.iter().any(|m| lower.contains(m)) {
            RecordType::Task
        } else if QUESTION_MARKERS.iter().any(|m| lower.contains(m)) && lower.trim_end().ends_with('?')
        {
            RecordType::Question
        } else {
            RecordType::Discussion
        }
    }
}

#[async_trait]
impl Chunking for HeuristicChunking {
    async fn create_chunk(&self, session: &str, content: &str, meta: ChunkMeta) -> Result<Record> {
        let record_type = Self::classify(content);
        build_record(NewRecordInput {
            content: content.to_string(),
            summary: None,
            record_type: Some(record_type),
            repository: meta.repository,
            session: session.to_string(),
            branch: meta.branch,
            files_modified: Vec::new(),
            tools_used: Vec::new(),
            tags: meta.tags,
            outcome: None,
            difficulty: None,
            task_status: None,
            task_priority: None,
            client_type: meta.client_type,
            parent_chunk: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn classifies_problem_text() {
        let chunker = HeuristicChunking;
        let record = chunker
            .create_chunk("s1", "Got an error when running the build", ChunkMeta::default())
            .await
            .unwrap();
        assert_eq!(record.record_type, RecordType::Problem);
    }

    #[tokio::test]
    async fn classifies_solution_text() {
        let chunker = HeuristicChunking;
        let record = chunker
            .create_chunk("s1", "Fixed the JWT bug by rotating the secret", ChunkMeta::default())
            .await
            .unwrap();
        assert_eq!(record.record_type, RecordType::Solution);
    }

    #[tokio::test]
    async fn classifies_question_text() {
        let chunker = HeuristicChunking;
        let record = chunker
            .create_chunk("s1", "Should we use REST or GraphQL here?", ChunkMeta::default())
            .await
            .unwrap();
        assert_eq!(record.record_type, RecordType::Question);
    }
}
