// src/analytics.rs
// `AnalyticsEngine` (§4.10): health, coverage, continuity, patterns, trends
// over a repository's records.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use memory_types::{Outcome, Record, RecordType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub score: f64,
    pub band: HealthBand,
    pub completion: f64,
    pub effectiveness: f64,
    pub accessibility: f64,
    pub freshness: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub has_architectural_decisions: bool,
    pub problems_with_solutions: usize,
    pub problems_without_solutions: usize,
    pub has_code_changes: bool,
}

#[derive(Debug, Clone)]
pub struct ContinuityIssue {
    pub record_id: String,
    pub reason: String,
    pub suggestion: String,
}

#[derive(Debug, Clone)]
pub struct PatternReport {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone)]
pub struct TrendReport {
    /// Most recent week first.
    pub weekly_counts: Vec<usize>,
    pub direction: TrendDirection,
}

pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn health(records: &[Record]) -> HealthReport {
        if records.is_empty() {
            return HealthReport {
                score: 0.0,
                band: HealthBand::Critical,
                completion: 0.0,
                effectiveness: 0.0,
                accessibility: 0.0,
                freshness: 0.0,
            };
        }

        let completion = completion_ratio(records);
        let effectiveness = effectiveness_ratio(records);
        let accessibility = accessibility_ratio(records);
        let freshness = freshness_ratio(records);

        let score =
            100.0 * (completion * 0.30 + effectiveness * 0.30 + accessibility * 0.25 + freshness * 0.15);

        HealthReport {
            score,
            band: band_for(score),
            completion,
            effectiveness,
            accessibility,
            freshness,
        }
    }

    pub fn coverage(records: &[Record]) -> CoverageReport {
        let mut report = CoverageReport::default();
        report.has_architectural_decisions = records
            .iter()
            .any(|r| r.record_type == RecordType::ArchitectureDecision);
        report.has_code_changes = records.iter().any(|r| r.record_type == RecordType::CodeChange);

        for record in records.iter().filter(|r| r.record_type == RecordType::Problem) {
            let solved = records.iter().any(|other| {
                other.record_type == RecordType::Solution
                    && other.session_id == record.session_id
                    && other.timestamp >= record.timestamp
            });
            if solved {
                report.problems_with_solutions += 1;
            } else {
                report.problems_without_solutions += 1;
            }
        }
        report
    }

    pub fn continuity(records: &[Record]) -> Vec<ContinuityIssue> {
        let mut issues = Vec::new();
        for record in records {
            let incomplete = matches!(
                record.metadata.outcome,
                Outcome::InProgress | Outcome::Failed
            );
            if incomplete {
                issues.push(ContinuityIssue {
                    record_id: record.id.clone(),
                    reason: format!("outcome is {:?}", record.metadata.outcome),
                    suggestion: "follow up and record a resolution".to_string(),
                });
                continue;
            }
            if record.record_type == RecordType::Problem {
                let solved_later = records.iter().any(|other| {
                    other.record_type == RecordType::Solution
                        && other.session_id == record.session_id
                        && other.timestamp > record.timestamp
                });
                if !solved_later {
                    issues.push(ContinuityIssue {
                        record_id: record.id.clone(),
                        reason: "problem has no later solution in the same session".to_string(),
                        suggestion: "store the eventual fix with store_decision or store_chunk"
                            .to_string(),
                    });
                }
            }
        }
        issues
    }

    pub fn patterns(records: &[Record]) -> Vec<PatternReport> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in records {
            for tag in &record.metadata.tags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        let mut patterns: Vec<PatternReport> = counts
            .into_iter()
            .filter(|(_, count)| *count >= 3)
            .map(|(tag, count)| PatternReport {
                tag: tag.to_string(),
                count,
            })
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count));
        patterns
    }

    pub fn trends(records: &[Record], weeks: usize) -> TrendReport {
        let now = Utc::now();
        let mut weekly_counts = vec![0usize; weeks];
        for record in records {
            if let Some(week) = week_index(now, record.timestamp) {
                if week < weeks {
                    weekly_counts[week] += 1;
                }
            }
        }

        let direction = if weekly_counts.len() > 2 && weekly_counts[2] > 0 {
            let recent = weekly_counts[0] as f64;
            let third = weekly_counts[2] as f64;
            if recent >= third * 1.5 {
                TrendDirection::Increasing
            } else if recent <= third * 0.5 {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            }
        } else {
            TrendDirection::Stable
        };

        TrendReport {
            weekly_counts,
            direction,
        }
    }
}

fn week_index(now: DateTime<Utc>, timestamp: DateTime<Utc>) -> Option<usize> {
    let delta = now.signed_duration_since(timestamp);
    if delta < Duration::zero() {
        return None;
    }
    Some((delta.num_days() / 7) as usize)
}

fn completion_ratio(records: &[Record]) -> f64 {
    let total = records.len() as f64;
    let complete = records
        .iter()
        .filter(|r| !matches!(r.metadata.outcome, Outcome::InProgress))
        .count() as f64;
    complete / total
}

fn effectiveness_ratio(records: &[Record]) -> f64 {
    let total = records.len() as f64;
    let successful = records
        .iter()
        .filter(|r| r.metadata.outcome == Outcome::Success)
        .count() as f64;
    successful / total
}

fn accessibility_ratio(records: &[Record]) -> f64 {
    let total = records.len() as f64;
    let accessed = records.iter().filter(|r| r.access_count > 0).count() as f64;
    accessed / total
}

fn freshness_ratio(records: &[Record]) -> f64 {
    let total = records.len() as f64;
    let scored: f64 = records
        .iter()
        .map(|r| crate::freshness::FreshnessManager::score(r).score)
        .sum();
    scored / total
}

fn band_for(score: f64) -> HealthBand {
    if score >= 80.0 {
        HealthBand::Excellent
    } else if score >= 60.0 {
        HealthBand::Good
    } else if score >= 40.0 {
        HealthBand::Fair
    } else if score >= 20.0 {
        HealthBand::Poor
    } else {
        HealthBand::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::{Difficulty, RecordMetadata, GLOBAL_REPOSITORY};

    fn record(
        id: &str,
        session: &str,
        record_type: RecordType,
        outcome: Outcome,
        days_ago: i64,
        tags: Vec<String>,
    ) -> Record {
        Record {
            id: id.to_string(),
            session_id: session.to_string(),
            timestamp: Utc::now() - Duration::days(days_ago),
            record_type,
            content: "x".to_string(),
            summary: "x".to_string(),
            embedding: None,
            metadata: RecordMetadata {
                repository: GLOBAL_REPOSITORY.to_string(),
                branch: None,
                files_modified: Vec::new(),
                tools_used: Vec::new(),
                tags,
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
    fn coverage_pairs_problems_with_later_solutions() {
        let problem = record("p1", "s1", RecordType::Problem, Outcome::Success, 2, vec![]);
        let solution = record("s1id", "s1", RecordType::Solution, Outcome::Success, 1, vec![]);
        let report = AnalyticsEngine::coverage(&[problem, solution]);
        assert_eq!(report.problems_with_solutions, 1);
        assert_eq!(report.problems_without_solutions, 0);
    }

    #[test]
    fn continuity_flags_unsolved_problem() {
        let problem = record("p1", "s1", RecordType::Problem, Outcome::Success, 5, vec![]);
        let issues = AnalyticsEngine::continuity(&[problem]);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn patterns_require_at_least_three_occurrences() {
        let records = vec![
            record("a", "s1", RecordType::Discussion, Outcome::Success, 1, vec!["auth".into()]),
            record("b", "s1", RecordType::Discussion, Outcome::Success, 1, vec!["auth".into()]),
            record("c", "s1", RecordType::Discussion, Outcome::Success, 1, vec!["auth".into()]),
        ];
        let patterns = AnalyticsEngine::patterns(&records);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].tag, "auth");
    }

    #[test]
    fn health_empty_is_critical() {
        let health = AnalyticsEngine::health(&[]);
        assert_eq!(health.band, HealthBand::Critical);
    }
}
