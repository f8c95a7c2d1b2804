// src/relationships/detect.rs
// Auto-detection heuristics (§4.5): each detector inspects a (new, candidate)
// record pair drawn from the recent-records window and, if it fires, returns
// a relation type with a type-specific default confidence.

use memory_types::{Record, RecordType, RelationType};

/// One emitted candidate edge, direction `new -> candidate` unless noted.
pub struct Candidate {
    pub relation_type: RelationType,
    pub confidence: f64,
}

const TEMPORAL_WINDOW_SECONDS: i64 = 3600;

/// Close-in-time + same session.
pub fn temporal(new: &Record, candidate: &Record) -> Option<Candidate> {
    if new.session_id != candidate.session_id {
        return None;
    }
    let delta = (new.timestamp - candidate.timestamp).num_seconds().abs();
    if delta <= TEMPORAL_WINDOW_SECONDS {
        Some(Candidate {
            relation_type: RelationType::FollowsUp,
            confidence: 0.6,
        })
    } else {
        None
    }
}

/// problem -> solution, architecture_decision -> code_change.
pub fn causal(new: &Record, candidate: &Record) -> Option<Candidate> {
    use RecordType::*;
    match (candidate.record_type, new.record_type) {
        (Problem, Solution) => Some(Candidate {
            relation_type: RelationType::SolvedBy,
            confidence: 0.75,
        }),
        (ArchitectureDecision, CodeChange) => Some(Candidate {
            relation_type: RelationType::LedTo,
            confidence: 0.7,
        }),
        _ => None,
    }
}

/// The new record's content mentions the candidate by summary or ID.
pub fn reference(new: &Record, candidate: &Record) -> Option<Candidate> {
    let content = new.content.to_lowercase();
    let summary = candidate.summary.to_lowercase();
    let mentions_id = content.contains(&candidate.id.to_lowercase());
    let mentions_summary = !summary.trim().is_empty()
        && summary.len() > 8
        && content.contains(summary.trim_end_matches('…').trim());
    if mentions_id || mentions_summary {
        Some(Candidate {
            relation_type: RelationType::References,
            confidence: 0.55,
        })
    } else {
        None
    }
}

/// Shared tags + complementary types (problem/question <-> solution).
pub fn problem_solution(new: &Record, candidate: &Record) -> Option<Candidate> {
    let shared_tags = new
        .metadata
        .tags
        .iter()
        .any(|t| candidate.metadata.tags.contains(t));
    if !shared_tags {
        return None;
    }
    use RecordType::*;
    let complementary = matches!(
        (candidate.record_type, new.record_type),
        (Problem, Solution) | (Question, Solution) | (Solution, Problem) | (Solution, Question)
    );
    if complementary {
        Some(Candidate {
            relation_type: RelationType::SolvedBy,
            confidence: 0.65,
        })
    } else {
        None
    }
}

pub fn run_all(new: &Record, candidate: &Record) -> Vec<Candidate> {
    [temporal, causal, reference, problem_solution]
        .iter()
        .filter_map(|detector| detector(new, candidate))
        .collect()
}
