// crates/memory-types/src/lib.rs
//! Shared types for the claude-memory engine (native, dependency-light).
//!
//! Kept separate from `memory-core` so the wire-level shapes can be reused by
//! anything that needs to talk about records without pulling in storage,
//! embeddings, or MCP plumbing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel repository used for cross-project / non-repo-scoped records.
pub const GLOBAL_REPOSITORY: &str = "_global";

/// Generate a new opaque record/relationship/thread/alias ID.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ───────────────────────────── Record ─────────────────────────────

/// One unit of durable memory: a problem, a solution, a decision, a code
/// change, or any other kind of record listed in [`RecordType`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Record {
    pub id: String,
    /// Composite `"<repository>::<session>"` — see `SessionScope`.
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub content: String,
    pub summary: String,
    /// Omitted from most responses; present when a caller asks for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: RecordMetadata,
    /// Denormalized back-reference to related record IDs (see invariant 3 in spec).
    #[serde(default)]
    pub related_chunks: Vec<String>,
    /// Which tool/agent produced the record (e.g. `"store_chunk"`, `"claude-code"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_type: Option<String>,
    /// Usage-frequency input to the ranking bonus (§4.4).
    #[serde(default)]
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Record {
    /// True if this record can be treated as a default/sentinel-repo record.
    pub fn is_global(&self) -> bool {
        self.metadata.repository == GLOBAL_REPOSITORY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Problem,
    Solution,
    ArchitectureDecision,
    CodeChange,
    Discussion,
    SessionSummary,
    Analysis,
    Verification,
    Question,
    Task,
    TaskUpdate,
    TaskProgress,
}

impl RecordType {
    pub const ALL: [RecordType; 12] = [
        RecordType::Problem,
        RecordType::Solution,
        RecordType::ArchitectureDecision,
        RecordType::CodeChange,
        RecordType::Discussion,
        RecordType::SessionSummary,
        RecordType::Analysis,
        RecordType::Verification,
        RecordType::Question,
        RecordType::Task,
        RecordType::TaskUpdate,
        RecordType::TaskProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Problem => "problem",
            RecordType::Solution => "solution",
            RecordType::ArchitectureDecision => "architecture_decision",
            RecordType::CodeChange => "code_change",
            RecordType::Discussion => "discussion",
            RecordType::SessionSummary => "session_summary",
            RecordType::Analysis => "analysis",
            RecordType::Verification => "verification",
            RecordType::Question => "question",
            RecordType::Task => "task",
            RecordType::TaskUpdate => "task_update",
            RecordType::TaskProgress => "task_progress",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown record type '{s}'"))
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Success,
    Failed,
    Abandoned,
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::InProgress
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Simple,
    Moderate,
    Complex,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Moderate
    }
}

/// Open mapping from string to JSON value. Recognized keys include
/// `parent_chunk`, `language_versions`, `dependencies`, `last_refreshed`,
/// `decision_type` — callers may add others freely.
pub type ExtendedMetadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecordMetadata {
    /// Canonical project identifier; `_global` if not set.
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    /// Duplicates preserved, order preserved.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_priority: Option<String>,
    #[serde(default)]
    pub extended_metadata: ExtendedMetadata,
}

impl RecordMetadata {
    pub fn get_extended(&self, key: &str) -> Option<&serde_json::Value> {
        self.extended_metadata.get(key)
    }

    pub fn parent_chunk(&self) -> Option<&str> {
        self.get_extended("parent_chunk").and_then(|v| v.as_str())
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.get_extended("last_refreshed")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

// ───────────────────────────── Relationship ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    LedTo,
    SolvedBy,
    DependsOn,
    Enables,
    ConflictsWith,
    Supersedes,
    RelatedTo,
    FollowsUp,
    Precedes,
    LearnedFrom,
    Teaches,
    Exemplifies,
    ReferencedBy,
    References,
    ParentChild,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::LedTo => "led_to",
            RelationType::SolvedBy => "solved_by",
            RelationType::DependsOn => "depends_on",
            RelationType::Enables => "enables",
            RelationType::ConflictsWith => "conflicts_with",
            RelationType::Supersedes => "supersedes",
            RelationType::RelatedTo => "related_to",
            RelationType::FollowsUp => "follows_up",
            RelationType::Precedes => "precedes",
            RelationType::LearnedFrom => "learned_from",
            RelationType::Teaches => "teaches",
            RelationType::Exemplifies => "exemplifies",
            RelationType::ReferencedBy => "referenced_by",
            RelationType::References => "references",
            RelationType::ParentChild => "parent_child",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    Explicit,
    Detected,
    Inferred,
}

/// Decomposition of a relationship's confidence score. Any factor not
/// supplied is simply absent — this is an open decomposition, not a fixed
/// tuple, so new factor names can be added without a schema break.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConfidenceFactors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_certainty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causal: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub confidence: f64,
    pub confidence_source: ConfidenceSource,
    #[serde(default)]
    pub confidence_factors: ConfidenceFactors,
    #[serde(default)]
    pub validation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ───────────────────────────── Thread ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThreadType {
    Conversation,
    ProblemSolving,
    Feature,
    Debugging,
    Architecture,
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Complete,
    Paused,
    Abandoned,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub thread_type: ThreadType,
    pub status: ThreadStatus,
    pub repository: String,
    /// Deduplicated, order of first insertion preserved.
    #[serde(default)]
    pub chunk_ids: Vec<String>,
    #[serde(default)]
    pub session_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Thread {
    /// Add a chunk ID if not already present. Returns true if it was added.
    pub fn add_chunk(&mut self, chunk_id: String) -> bool {
        if self.chunk_ids.contains(&chunk_id) {
            return false;
        }
        self.chunk_ids.push(chunk_id);
        true
    }

    /// Remove a chunk ID. Returns true if it was present.
    pub fn remove_chunk(&mut self, chunk_id: &str) -> bool {
        let before = self.chunk_ids.len();
        self.chunk_ids.retain(|id| id != chunk_id);
        self.chunk_ids.len() != before
    }

    pub fn add_session(&mut self, session_id: String) {
        if !self.session_ids.contains(&session_id) {
            self.session_ids.push(session_id);
        }
    }
}

// ───────────────────────────── Alias ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AliasType {
    Tag,
    Shortcut,
    Query,
    Collection,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AliasTarget {
    ChunkIds { chunk_ids: Vec<String> },
    Query {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        repository: Option<String>,
        limit: usize,
    },
    Filter { repository: String },
    Collection {
        name: String,
        chunk_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AliasMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Alias {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub alias_type: AliasType,
    pub description: String,
    pub target: AliasTarget,
    #[serde(default)]
    pub metadata: AliasMetadata,
    #[serde(default)]
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_round_trips_through_str() {
        for t in RecordType::ALL {
            let parsed: RecordType = t.as_str().parse().expect("parse");
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn thread_add_chunk_is_idempotent() {
        let mut thread = Thread {
            id: new_id(),
            title: "t".into(),
            description: String::new(),
            thread_type: ThreadType::Debugging,
            status: ThreadStatus::Active,
            repository: GLOBAL_REPOSITORY.into(),
            chunk_ids: vec![],
            session_ids: vec![],
            tags: vec![],
            priority: None,
            start_time: Utc::now(),
            last_update: Utc::now(),
            end_time: None,
        };
        assert!(thread.add_chunk("a".into()));
        assert!(!thread.add_chunk("a".into()));
        assert_eq!(thread.chunk_ids, vec!["a".to_string()]);
    }
}
