// src/conflicts/mod.rs
// `ConflictDetector` (§4.7): contradiction detection across a repository's
// records, with a ranked resolution-strategy list per conflict.
//
// Same cheap token-overlap similarity style as `store::sqlite::token_overlap_score`,
// generalized here to a symmetric Jaccard-like measure over long tokens
// (`shared/min(|w1|,|w2|)`) rather than the query-vs-haystack asymmetric
// form, which doesn't fit two-record comparison.

use std::collections::HashSet;

use memory_types::{Record, RecordType};

/// Opposing keyword pairs used for `Architectural` conflicts (§4.7).
const OPPOSING_PAIRS: &[(&str, &str)] = &[
    ("sync", "async"),
    ("sql", "nosql"),
    ("rest", "graphql"),
    ("microservice", "monolith"),
    ("client-side", "server-side"),
    ("synchronous", "asynchronous"),
    ("relational", "document"),
];

/// Opposing keyword pairs for `Technical` conflicts: implementation choices
/// on a code change or solution, not an architecture-wide decision.
const TECHNICAL_OPPOSING_PAIRS: &[(&str, &str)] = &[
    ("mutable", "immutable"),
    ("stateful", "stateless"),
    ("eager loading", "lazy loading"),
    ("polling", "event-driven"),
    ("caching enabled", "caching disabled"),
];

/// Opposing keyword pairs for `Methodology` conflicts: how work gets done,
/// not what gets built.
const METHODOLOGY_OPPOSING_PAIRS: &[(&str, &str)] = &[
    ("agile", "waterfall"),
    ("manual testing", "automated testing"),
    ("top-down", "bottom-up"),
    ("trunk-based", "feature branch"),
];

/// Opposing keyword pairs for `Pattern` conflicts: competing design
/// patterns applied to similar problems.
const PATTERN_OPPOSING_PAIRS: &[(&str, &str)] = &[
    ("singleton", "dependency injection"),
    ("inheritance", "composition"),
    ("tight coupling", "loose coupling"),
    ("global state", "immutable state"),
];

/// Phrases signalling a later record reverses an earlier decision, used by
/// `decision_reversal_conflict`.
const REVERSAL_MARKERS: &[&str] = &[
    "no longer",
    "reverted",
    "rolled back",
    "deprecated",
    "abandoned",
    "reversed the decision",
    "overturned",
];

const SIMILARITY_THRESHOLD: f64 = 0.3;
const MIN_TOKEN_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Outcome,
    Architectural,
    Temporal,
    Technical,
    Decision,
    Methodology,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    AcceptLatest,
    AcceptHighest,
    Merge,
    ManualReview,
    Contextual,
    Evolutionary,
    DomainSpecific,
}

impl ResolutionStrategy {
    fn steps(&self) -> &'static [&'static str] {
        match self {
            ResolutionStrategy::AcceptLatest => {
                &["Identify the more recent record", "Mark the older one superseded"]
            }
            ResolutionStrategy::AcceptHighest => {
                &["Compare confidence/outcome quality", "Keep the stronger record"]
            }
            ResolutionStrategy::Merge => {
                &["Extract the non-conflicting parts of both", "Store a merged record"]
            }
            ResolutionStrategy::ManualReview => {
                &["Flag both records for a human to read", "Wait for an explicit decision"]
            }
            ResolutionStrategy::Contextual => {
                &["Check whether both records apply in disjoint contexts", "Scope each to its context"]
            }
            ResolutionStrategy::Evolutionary => {
                &["Treat the newer record as an evolution of the older one", "Link them explicitly"]
            }
            ResolutionStrategy::DomainSpecific => {
                &["Apply a domain rule specific to this conflict kind"]
            }
        }
    }

    fn benefits(&self) -> &'static str {
        match self {
            ResolutionStrategy::AcceptLatest => "fast, no human in the loop",
            ResolutionStrategy::AcceptHighest => "favors the more reliable record",
            ResolutionStrategy::Merge => "preserves information from both records",
            ResolutionStrategy::ManualReview => "avoids silently discarding either record",
            ResolutionStrategy::Contextual => "keeps both records valid in their own scope",
            ResolutionStrategy::Evolutionary => "preserves history as a causal chain",
            ResolutionStrategy::DomainSpecific => "tailored to the specific conflict kind",
        }
    }

    fn risks(&self) -> &'static str {
        match self {
            ResolutionStrategy::AcceptLatest => "recency isn't always correctness",
            ResolutionStrategy::AcceptHighest => "requires a reliable quality signal",
            ResolutionStrategy::Merge => "may produce an incoherent combined record",
            ResolutionStrategy::ManualReview => "blocks until a human acts",
            ResolutionStrategy::Contextual => "requires the contexts to actually be disjoint",
            ResolutionStrategy::Evolutionary => "assumes a causal link that may not exist",
            ResolutionStrategy::DomainSpecific => "only as good as the rule it encodes",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionOption {
    pub strategy: ResolutionStrategy,
    pub steps: Vec<String>,
    pub benefits: String,
    pub risks: String,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub confidence: f64,
    pub primary_chunk_id: String,
    pub conflict_chunk_id: String,
    pub description: String,
    /// Ranked; `resolutions[0]` is the recommended strategy.
    pub resolutions: Vec<ResolutionOption>,
}

pub struct ConflictDetector;

impl ConflictDetector {
    pub fn detect(records: &[Record]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                let a = &records[i];
                let b = &records[j];
                if let Some(conflict) = outcome_conflict(a, b) {
                    conflicts.push(conflict);
                }
                if let Some(conflict) = architectural_conflict(a, b) {
                    conflicts.push(conflict);
                }
                if let Some(conflict) = opposing_keyword_conflict(
                    a,
                    b,
                    ConflictKind::Technical,
                    Severity::Medium,
                    0.7,
                    TECHNICAL_OPPOSING_PAIRS,
                    &[RecordType::CodeChange, RecordType::Solution],
                ) {
                    conflicts.push(conflict);
                }
                if let Some(conflict) = opposing_keyword_conflict(
                    a,
                    b,
                    ConflictKind::Methodology,
                    Severity::Low,
                    0.6,
                    METHODOLOGY_OPPOSING_PAIRS,
                    &[],
                ) {
                    conflicts.push(conflict);
                }
                if let Some(conflict) = opposing_keyword_conflict(
                    a,
                    b,
                    ConflictKind::Pattern,
                    Severity::Low,
                    0.6,
                    PATTERN_OPPOSING_PAIRS,
                    &[
                        RecordType::CodeChange,
                        RecordType::Solution,
                        RecordType::ArchitectureDecision,
                    ],
                ) {
                    conflicts.push(conflict);
                }
                if let Some(conflict) = decision_reversal_conflict(a, b) {
                    conflicts.push(conflict);
                }
                if let Some(conflict) = temporal_status_conflict(a, b) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// `shared / min(|w1|, |w2|)` per §4.7.
fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    let denom = ta.len().min(tb.len());
    if denom == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / denom as f64
}

fn resolutions_for(kind: ConflictKind) -> Vec<ResolutionOption> {
    let ranked: &[ResolutionStrategy] = match kind {
        ConflictKind::Outcome => &[
            ResolutionStrategy::AcceptLatest,
            ResolutionStrategy::ManualReview,
            ResolutionStrategy::Contextual,
        ],
        ConflictKind::Architectural => &[
            ResolutionStrategy::ManualReview,
            ResolutionStrategy::Evolutionary,
            ResolutionStrategy::Contextual,
            ResolutionStrategy::AcceptLatest,
        ],
        _ => &[
            ResolutionStrategy::Contextual,
            ResolutionStrategy::ManualReview,
            ResolutionStrategy::DomainSpecific,
        ],
    };
    ranked
        .iter()
        .map(|strategy| ResolutionOption {
            strategy: *strategy,
            steps: strategy.steps().iter().map(|s| s.to_string()).collect(),
            benefits: strategy.benefits().to_string(),
            risks: strategy.risks().to_string(),
        })
        .collect()
}

fn outcome_conflict(a: &Record, b: &Record) -> Option<Conflict> {
    use memory_types::Outcome::*;
    if a.session_id == b.session_id {
        return None;
    }
    let opposite = matches!(
        (a.metadata.outcome, b.metadata.outcome),
        (Success, Failed) | (Failed, Success)
    );
    if !opposite {
        return None;
    }
    let sim = similarity(&a.summary, &b.summary);
    if sim <= SIMILARITY_THRESHOLD {
        return None;
    }
    Some(Conflict {
        kind: ConflictKind::Outcome,
        severity: Severity::Medium,
        confidence: sim,
        primary_chunk_id: a.id.clone(),
        conflict_chunk_id: b.id.clone(),
        description: format!(
            "\"{}\" reports success while \"{}\" reports failure on a similar task",
            a.summary, b.summary
        ),
        resolutions: resolutions_for(ConflictKind::Outcome),
    })
}

fn architectural_conflict(a: &Record, b: &Record) -> Option<Conflict> {
    if a.record_type != RecordType::ArchitectureDecision
        || b.record_type != RecordType::ArchitectureDecision
    {
        return None;
    }
    let a_lower = a.content.to_lowercase();
    let b_lower = b.content.to_lowercase();
    for (left, right) in OPPOSING_PAIRS {
        let a_has_left = a_lower.contains(left);
        let b_has_right = b_lower.contains(right);
        let a_has_right = a_lower.contains(right);
        let b_has_left = b_lower.contains(left);
        if (a_has_left && b_has_right) || (a_has_right && b_has_left) {
            return Some(Conflict {
                kind: ConflictKind::Architectural,
                severity: Severity::High,
                confidence: 0.8,
                primary_chunk_id: a.id.clone(),
                conflict_chunk_id: b.id.clone(),
                description: format!(
                    "architecture decisions disagree on {left} vs {right}"
                ),
                resolutions: resolutions_for(ConflictKind::Architectural),
            });
        }
    }
    None
}

/// Shared shape for `Technical`/`Methodology`/`Pattern`: a pair of records
/// whose content names opposite sides of a keyword pair. `allowed_types`
/// restricts which `RecordType`s may participate; an empty slice means any.
fn opposing_keyword_conflict(
    a: &Record,
    b: &Record,
    kind: ConflictKind,
    severity: Severity,
    confidence: f64,
    pairs: &[(&str, &str)],
    allowed_types: &[RecordType],
) -> Option<Conflict> {
    if !allowed_types.is_empty()
        && (!allowed_types.contains(&a.record_type) || !allowed_types.contains(&b.record_type))
    {
        return None;
    }
    let a_lower = a.content.to_lowercase();
    let b_lower = b.content.to_lowercase();
    for (left, right) in pairs {
        let a_has_left = a_lower.contains(left);
        let b_has_right = b_lower.contains(right);
        let a_has_right = a_lower.contains(right);
        let b_has_left = b_lower.contains(left);
        if (a_has_left && b_has_right) || (a_has_right && b_has_left) {
            return Some(Conflict {
                kind,
                severity,
                confidence,
                primary_chunk_id: a.id.clone(),
                conflict_chunk_id: b.id.clone(),
                description: format!("{kind:?} conflict: disagreement on {left} vs {right}"),
                resolutions: resolutions_for(kind),
            });
        }
    }
    None
}

/// `Decision`: a later architecture decision whose content reads as a
/// reversal of an earlier, topically similar one.
fn decision_reversal_conflict(a: &Record, b: &Record) -> Option<Conflict> {
    if a.record_type != RecordType::ArchitectureDecision
        || b.record_type != RecordType::ArchitectureDecision
    {
        return None;
    }
    let (earlier, later) = if a.timestamp <= b.timestamp { (a, b) } else { (b, a) };
    let later_lower = later.content.to_lowercase();
    if !REVERSAL_MARKERS.iter().any(|m| later_lower.contains(m)) {
        return None;
    }
    let sim = similarity(&earlier.summary, &later.summary);
    if sim <= SIMILARITY_THRESHOLD {
        return None;
    }
    Some(Conflict {
        kind: ConflictKind::Decision,
        severity: Severity::Medium,
        confidence: sim,
        primary_chunk_id: earlier.id.clone(),
        conflict_chunk_id: later.id.clone(),
        description: format!(
            "\"{}\" appears reversed by the later decision \"{}\"",
            earlier.summary, later.summary
        ),
        resolutions: resolutions_for(ConflictKind::Decision),
    })
}

/// `Temporal`: a task's tracked status regresses (completed/done followed
/// by blocked/failed) on what looks like the same piece of work.
fn temporal_status_conflict(a: &Record, b: &Record) -> Option<Conflict> {
    let (earlier, later) = if a.timestamp <= b.timestamp { (a, b) } else { (b, a) };
    let sim = similarity(&earlier.summary, &later.summary);
    if sim <= SIMILARITY_THRESHOLD {
        return None;
    }
    let regressed = matches!(
        (
            earlier.metadata.task_status.as_deref().map(str::to_lowercase).as_deref(),
            later.metadata.task_status.as_deref().map(str::to_lowercase).as_deref(),
        ),
        (Some("completed"), Some("blocked"))
            | (Some("completed"), Some("failed"))
            | (Some("done"), Some("blocked"))
            | (Some("done"), Some("failed"))
    );
    if !regressed {
        return None;
    }
    Some(Conflict {
        kind: ConflictKind::Temporal,
        severity: Severity::Low,
        confidence: sim,
        primary_chunk_id: earlier.id.clone(),
        conflict_chunk_id: later.id.clone(),
        description: format!(
            "task status regressed from {:?} to {:?} on a similar task",
            earlier.metadata.task_status, later.metadata.task_status
        ),
        resolutions: resolutions_for(ConflictKind::Temporal),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memory_types::{Difficulty, Outcome, RecordMetadata, GLOBAL_REPOSITORY};

    fn record(id: &str, session: &str, record_type: RecordType, content: &str, outcome: Outcome) -> Record {
        Record {
            id: id.to_string(),
            session_id: session.to_string(),
            timestamp: Utc::now(),
            record_type,
            content: content.to_string(),
            summary: content.to_string(),
            embedding: None,
            metadata: RecordMetadata {
                repository: GLOBAL_REPOSITORY.to_string(),
                branch: None,
                files_modified: Vec::new(),
                tools_used: Vec::new(),
                tags: Vec::new(),
                outcome,
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

    #[test]
    fn detects_outcome_conflict_on_similar_summaries() {
        let a = record(
            "a",
            "s1",
            RecordType::Solution,
            "deployed the payment gateway integration successfully",
            Outcome::Success,
        );
        let b = record(
            "b",
            "s2",
            RecordType::Solution,
            "the payment gateway integration deployment failed",
            Outcome::Failed,
        );
        let conflicts = ConflictDetector::detect(&[a, b]);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::Outcome));
    }

    #[test]
    fn detects_architectural_conflict_on_opposing_keywords() {
        let a = record(
            "a",
            "s1",
            RecordType::ArchitectureDecision,
            "we will use a synchronous request flow",
            Outcome::default(),
        );
        let b = record(
            "b",
            "s1",
            RecordType::ArchitectureDecision,
            "decided to use an asynchronous request flow",
            Outcome::default(),
        );
        let conflicts = ConflictDetector::detect(&[a, b]);
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Architectural));
        assert_eq!(
            conflicts[0].resolutions[0].strategy,
            ResolutionStrategy::ManualReview
        );
    }

    #[test]
    fn no_conflict_for_dissimilar_records() {
        let a = record("a", "s1", RecordType::Solution, "fixed the login bug", Outcome::Success);
        let b = record("b", "s2", RecordType::Solution, "migrated the database schema", Outcome::Failed);
        assert!(ConflictDetector::detect(&[a, b]).is_empty());
    }

    #[test]
    fn detects_technical_conflict_on_opposing_keywords() {
        let a = record(
            "a",
            "s1",
            RecordType::CodeChange,
            "switched the session cache to mutable shared state",
            Outcome::default(),
        );
        let b = record(
            "b",
            "s1",
            RecordType::CodeChange,
            "refactored the session cache to immutable shared state",
            Outcome::default(),
        );
        let conflicts = ConflictDetector::detect(&[a, b]);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::Technical));
    }

    #[test]
    fn detects_methodology_conflict_on_opposing_keywords() {
        let a = record(
            "a",
            "s1",
            RecordType::Discussion,
            "the team runs agile sprints for this project",
            Outcome::default(),
        );
        let b = record(
            "b",
            "s1",
            RecordType::Discussion,
            "this project follows a waterfall process",
            Outcome::default(),
        );
        let conflicts = ConflictDetector::detect(&[a, b]);
        assert!(conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Methodology));
    }

    #[test]
    fn detects_pattern_conflict_on_opposing_keywords() {
        let a = record(
            "a",
            "s1",
            RecordType::Solution,
            "resolved it with a singleton manager",
            Outcome::default(),
        );
        let b = record(
            "b",
            "s1",
            RecordType::Solution,
            "resolved it with dependency injection instead",
            Outcome::default(),
        );
        let conflicts = ConflictDetector::detect(&[a, b]);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::Pattern));
    }

    #[test]
    fn detects_decision_reversal_conflict() {
        let mut earlier = record(
            "a",
            "s1",
            RecordType::ArchitectureDecision,
            "decided to adopt the new billing service architecture",
            Outcome::default(),
        );
        earlier.timestamp = Utc::now() - chrono::Duration::days(10);
        let mut later = record(
            "b",
            "s2",
            RecordType::ArchitectureDecision,
            "the new billing service architecture decision was reverted",
            Outcome::default(),
        );
        later.timestamp = Utc::now();
        let conflicts = ConflictDetector::detect(&[earlier, later]);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::Decision));
    }

    #[test]
    fn detects_temporal_status_regression_conflict() {
        let mut earlier = record(
            "a",
            "s1",
            RecordType::Task,
            "migrate the user profile service to the new schema",
            Outcome::default(),
        );
        earlier.timestamp = Utc::now() - chrono::Duration::days(5);
        earlier.metadata.task_status = Some("completed".to_string());
        let mut later = record(
            "b",
            "s2",
            RecordType::Task,
            "migrate the user profile service to the new schema",
            Outcome::default(),
        );
        later.timestamp = Utc::now();
        later.metadata.task_status = Some("blocked".to_string());
        let conflicts = ConflictDetector::detect(&[earlier, later]);
        assert!(conflicts.iter().any(|c| c.kind == ConflictKind::Temporal));
    }
}
