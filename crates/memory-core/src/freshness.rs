// src/freshness.rs
// `FreshnessManager` (§4.8): staleness scoring and the refresh workflow.

use chrono::Utc;
use memory_types::{Record, RecordType};

const TYPE_BOOST_DEFAULT_MIN: f64 = 1.0;
const TYPE_BOOST_DEFAULT_MAX: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessAction {
    Delete,
    Summarize,
    Update,
    Fresh,
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessScore {
    pub score: f64,
    pub action: FreshnessAction,
}

pub struct FreshnessManager;

impl FreshnessManager {
    /// §4.8: age decay × type boost × relationship boost, clamped to [0,1].
    pub fn score(record: &Record) -> FreshnessScore {
        let reference = record
            .metadata
            .last_refreshed()
            .unwrap_or(record.timestamp);
        let days = (Utc::now() - reference).num_seconds().max(0) as f64 / 86400.0;

        let base = age_decay(days);
        let boost = type_boost(record) * relationship_boost(record.related_chunks.len());
        let score = (base * boost).clamp(0.0, 1.0);

        FreshnessScore {
            score,
            action: action_for(score),
        }
    }

    /// `MarkRefreshed(id, notes)`: sets `extended_metadata.last_refreshed` to
    /// now, optionally recording `notes`. Resets the age-input for the next
    /// `score()` call.
    pub fn mark_refreshed(record: &mut Record, notes: Option<&str>) {
        record.metadata.extended_metadata.insert(
            "last_refreshed".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
        if let Some(notes) = notes {
            record.metadata.extended_metadata.insert(
                "refresh_notes".to_string(),
                serde_json::Value::String(notes.to_string()),
            );
        }
    }
}

fn age_decay(days: f64) -> f64 {
    if days < 7.0 {
        1.0 - 0.01 * days
    } else if days < 30.0 {
        // Linear interpolation from the 7-day value down to ~0.7 at 30 days.
        let at_seven = 1.0 - 0.01 * 7.0;
        let t = (days - 7.0) / (30.0 - 7.0);
        at_seven + (0.7 - at_seven) * t
    } else {
        0.6_f64.powf((days - 30.0) / 30.0)
    }
}

fn type_boost(record: &Record) -> f64 {
    match record.record_type {
        RecordType::ArchitectureDecision => 2.0,
        RecordType::Solution if record.metadata.outcome == memory_types::Outcome::Success => 1.8,
        RecordType::Problem => 1.5,
        RecordType::CodeChange => 1.3,
        RecordType::Task => {
            let mut boost = 1.4;
            if record.metadata.task_priority.as_deref() == Some("high") {
                boost *= 1.3;
            }
            if record.metadata.task_status.as_deref() == Some("completed") {
                boost *= 1.5;
            }
            boost
        }
        _ => TYPE_BOOST_DEFAULT_MIN + (TYPE_BOOST_DEFAULT_MAX - TYPE_BOOST_DEFAULT_MIN) * 0.5,
    }
}

fn relationship_boost(related_chunks: usize) -> f64 {
    1.0 + related_chunks as f64 / 10.0
}

fn action_for(score: f64) -> FreshnessAction {
    if score < 0.1 {
        FreshnessAction::Delete
    } else if score < 0.4 {
        FreshnessAction::Summarize
    } else if score < 0.7 {
        FreshnessAction::Update
    } else {
        FreshnessAction::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::{Difficulty, Outcome, RecordMetadata, GLOBAL_REPOSITORY};

    fn record(days_old: i64, record_type: RecordType) -> Record {
        Record {
            id: "r1".to_string(),
            session_id: "s1".to_string(),
            timestamp: Utc::now() - chrono::Duration::days(days_old),
            record_type,
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

    #[test]
    fn fresh_record_scores_high() {
        let r = record(0, RecordType::ArchitectureDecision);
        let fresh = FreshnessManager::score(&r);
        assert_eq!(fresh.action, FreshnessAction::Fresh);
    }

    #[test]
    fn old_discussion_is_a_delete_candidate() {
        let r = record(400, RecordType::Discussion);
        let fresh = FreshnessManager::score(&r);
        assert!(fresh.score < 0.1);
        assert_eq!(fresh.action, FreshnessAction::Delete);
    }

    #[test]
    fn mark_refreshed_resets_age_input() {
        let mut r = record(400, RecordType::Discussion);
        FreshnessManager::mark_refreshed(&mut r, Some("re-verified"));
        let fresh = FreshnessManager::score(&r);
        assert_eq!(fresh.action, FreshnessAction::Fresh);
        assert_eq!(
            r.metadata.get_extended("refresh_notes").and_then(|v| v.as_str()),
            Some("re-verified")
        );
    }
}
