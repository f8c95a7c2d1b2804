// src/session.rs
// SessionScope: composite `<repository>::<session>` discipline.
//
// Multi-tenant isolation: two users with session "debug" in different
// repositories must never cross-read. All read/write paths that accept a
// session_id MUST compose the repository-scoped form before hitting storage.

use std::time::{SystemTime, UNIX_EPOCH};

const SEPARATOR: &str = "::";
const MAX_SESSION_LEN: usize = 200;
const GENERIC_WORDS: [&str; 5] = ["session", "test", "demo", "example", "default"];

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compose a repository and a raw session name into the storage-level
/// composite session ID. `repo` defaults to `"unknown"` when empty.
pub fn compose(repo: &str, session: &str) -> String {
    let repo = if repo.trim().is_empty() {
        "unknown"
    } else {
        repo
    };
    format!("{repo}{SEPARATOR}{session}")
}

/// Split a composite session ID on the first `"::"`, returning
/// `(repository, session)`. If there is no separator, the whole string is
/// treated as the session with an empty repository.
fn split(composite: &str) -> (&str, &str) {
    match composite.split_once(SEPARATOR) {
        Some((repo, session)) => (repo, session),
        None => ("", composite),
    }
}

pub fn extract_repository(composite: &str) -> &str {
    split(composite).0
}

pub fn extract_session(composite: &str) -> &str {
    split(composite).1
}

/// Normalize a bare session name:
/// - trims whitespace
/// - replaces any character outside `[A-Za-z0-9_:-]` with `_`
/// - synthesizes `session_<unix-seconds>` if the result is empty
/// - truncates to 200 chars
/// - appends `_<unix-seconds>` if the bare session equals a generic word
///   (case-insensitive), to reduce collision risk
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)` as long as the
/// generic-word suffix produced by the first pass doesn't itself look like
/// one of the five reserved words (it never does, since it carries a numeric
/// suffix).
pub fn normalize(session: &str) -> String {
    let trimmed = session.trim();

    let mut cleaned: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        cleaned = format!("session_{}", unix_seconds());
    }

    if cleaned.len() > MAX_SESSION_LEN {
        cleaned.truncate(MAX_SESSION_LEN);
    }

    if GENERIC_WORDS
        .iter()
        .any(|w| w.eq_ignore_ascii_case(&cleaned))
    {
        cleaned = format!("{cleaned}_{}", unix_seconds());
    }

    cleaned
}

/// Normalize a session ID that may already be in composite `repo::session`
/// form, preserving the repository prefix.
pub fn normalize_preserving_repo(session_or_composite: &str) -> String {
    match session_or_composite.split_once(SEPARATOR) {
        Some((repo, session)) => compose(repo, &normalize(session)),
        None => normalize(session_or_composite),
    }
}

/// Normalize a repository identifier: empty becomes the global sentinel.
pub fn normalize_repository(repo: &str) -> String {
    let trimmed = repo.trim();
    if trimmed.is_empty() {
        memory_types::GLOBAL_REPOSITORY.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_and_extract_round_trip() {
        let composite = compose("github.com/x/y", "auth-fix");
        assert_eq!(extract_repository(&composite), "github.com/x/y");
        assert_eq!(extract_session(&composite), "auth-fix");
    }

    #[test]
    fn empty_repo_uses_unknown() {
        let composite = compose("", "s1");
        assert_eq!(extract_repository(&composite), "unknown");
    }

    #[test]
    fn normalize_replaces_disallowed_chars() {
        let n = normalize("my session!@#");
        assert_eq!(n, "my_session___");
    }

    #[test]
    fn normalize_generic_word_gets_suffixed() {
        let n = normalize("default");
        assert!(n.starts_with("default_"));
        assert_ne!(n, "default");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["default", "My Session!!", "", "already-fine_123"] {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn normalize_truncates_long_sessions() {
        let long = "a".repeat(500);
        let n = normalize(&long);
        assert_eq!(n.len(), MAX_SESSION_LEN);
    }

    #[test]
    fn normalize_preserving_repo_keeps_prefix() {
        let n = normalize_preserving_repo("github.com/x/y::default");
        assert!(n.starts_with("github.com/x/y::default_"));
    }
}
