// src/citation.rs
// `CitationEngine` (§4.12): bibliography + inline citation tokens over a set
// of records.

use memory_types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationStyle {
    Simple,
    Apa,
    Mla,
    Chicago,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineStyle {
    Bracket, // [n]
    Caret,   // ^n
    Paren,   // (n)
}

#[derive(Debug, Clone, Default)]
pub struct BibliographyOptions {
    pub group_by_repository: bool,
    pub group_by_type: bool,
    pub include_excerpt: bool,
}

#[derive(Debug, Clone)]
pub struct BibliographyEntry {
    pub index: usize,
    pub record_id: String,
    pub formatted: String,
}

#[derive(Debug, Clone)]
pub struct Bibliography {
    pub entries: Vec<BibliographyEntry>,
    /// Present when the options requested grouping: (group label, entry indices).
    pub groups: Vec<(String, Vec<usize>)>,
}

pub struct CitationEngine;

impl CitationEngine {
    pub fn bibliography(
        records: &[Record],
        style: CitationStyle,
        options: &BibliographyOptions,
    ) -> Bibliography {
        let entries: Vec<BibliographyEntry> = records
            .iter()
            .enumerate()
            .map(|(i, record)| BibliographyEntry {
                index: i + 1,
                record_id: record.id.clone(),
                formatted: format_entry(record, style, options.include_excerpt),
            })
            .collect();

        let groups = if options.group_by_repository {
            group_by(records, |r| r.metadata.repository.clone())
        } else if options.group_by_type {
            group_by(records, |r| r.record_type.as_str().to_string())
        } else {
            Vec::new()
        };

        Bibliography { entries, groups }
    }

    /// Inline citation token for the `n`-th (1-based) bibliography entry.
    pub fn inline(n: usize, style: InlineStyle) -> String {
        match style {
            InlineStyle::Bracket => format!("[{n}]"),
            InlineStyle::Caret => format!("^{n}"),
            InlineStyle::Paren => format!("({n})"),
        }
    }
}

fn group_by(records: &[Record], key: impl Fn(&Record) -> String) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let label = key(record);
        match groups.iter_mut().find(|(g, _)| *g == label) {
            Some((_, indices)) => indices.push(i + 1),
            None => groups.push((label, vec![i + 1])),
        }
    }
    groups
}

fn format_entry(record: &Record, style: CitationStyle, include_excerpt: bool) -> String {
    let date = record.timestamp.format("%Y-%m-%d");
    let repo = &record.metadata.repository;
    let mut formatted = match style {
        CitationStyle::Simple => format!("{} ({}, {})", record.summary, repo, date),
        CitationStyle::Apa => format!("{repo}. ({date}). {}.", record.summary),
        CitationStyle::Mla => format!("\"{}.\" {repo}, {date}.", record.summary),
        CitationStyle::Chicago => format!("{repo}, \"{}\", {date}.", record.summary),
    };
    if include_excerpt {
        let excerpt: String = record.content.chars().take(160).collect();
        formatted.push_str(&format!(" — \"{excerpt}\""));
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memory_types::{Difficulty, Outcome, RecordMetadata, RecordType, GLOBAL_REPOSITORY};

    fn record(id: &str, repo: &str) -> Record {
        Record {
            id: id.to_string(),
            session_id: "s1".to_string(),
            timestamp: Utc::now(),
            record_type: RecordType::Solution,
            content: "fixed the bug by rotating the secret".to_string(),
            summary: "fixed the bug".to_string(),
            embedding: None,
            metadata: RecordMetadata {
                repository: repo.to_string(),
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
    fn bibliography_groups_by_repository() {
        let records = vec![record("a", "repo-one"), record("b", "repo-two")];
        let bib = CitationEngine::bibliography(
            &records,
            CitationStyle::Simple,
            &BibliographyOptions {
                group_by_repository: true,
                ..Default::default()
            },
        );
        assert_eq!(bib.groups.len(), 2);
    }

    #[test]
    fn inline_tokens_match_style() {
        assert_eq!(CitationEngine::inline(3, InlineStyle::Bracket), "[3]");
        assert_eq!(CitationEngine::inline(3, InlineStyle::Caret), "^3");
        assert_eq!(CitationEngine::inline(3, InlineStyle::Paren), "(3)");
    }

    #[test]
    fn apa_entry_includes_repository_and_summary() {
        let records = vec![record("a", GLOBAL_REPOSITORY)];
        let bib = CitationEngine::bibliography(
            &records,
            CitationStyle::Apa,
            &BibliographyOptions::default(),
        );
        assert!(bib.entries[0].formatted.contains(GLOBAL_REPOSITORY));
        assert!(bib.entries[0].formatted.contains("fixed the bug"));
    }
}
