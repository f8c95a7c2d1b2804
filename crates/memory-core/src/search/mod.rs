// src/search/mod.rs
// `SearchEngine`: progressive-relaxation semantic search (§4.4).
//
// Fetch-then-rank with an overfetch margin for reranking, plus a
// cross-repository fallback path, generalized into four explicit stages
// with each stage logged so a caller can tell which one produced the
// results that came back.

use std::sync::Arc;
use std::time::Instant;

use memory_types::RecordType;

use crate::embeddings::Embeddings;
use crate::error::{MemoryError, Result};
use crate::store::{ScoredRecord, SearchFilter, VectorStore};

/// Relaxation knobs a deployment controls via `EngineConfig` (§4.15).
#[derive(Debug, Clone)]
pub struct SearchEngineConfig {
    pub progressive_search: bool,
    pub relaxed_min_relevance: f64,
    pub broadest_min_relevance: f64,
    pub max_related_repos: usize,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            progressive_search: true,
            relaxed_min_relevance: 0.4,
            broadest_min_relevance: 0.15,
            max_related_repos: 5,
        }
    }
}

/// §6 `search.recency` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recency {
    Recent,
    LastMonth,
    #[default]
    AllTime,
}

impl std::str::FromStr for Recency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "recent" => Ok(Recency::Recent),
            "last_month" => Ok(Recency::LastMonth),
            "all_time" | "" => Ok(Recency::AllTime),
            other => Err(format!("unknown recency {other:?}")),
        }
    }
}

impl Recency {
    pub fn since(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let days = match self {
            Recency::Recent => 7,
            Recency::LastMonth => 30,
            Recency::AllTime => return None,
        };
        Some(chrono::Utc::now() - chrono::Duration::days(days))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub repository: Option<String>,
    pub types: Vec<RecordType>,
    pub recency: Recency,
    pub limit: usize,
    pub min_relevance: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<ScoredRecord>,
    /// Which stage produced `results` — `"strict"`, `"relaxed"`,
    /// `"repository_fallback:<repo>"`, `"repository_dropped"`, or `"broadest"`.
    pub stage: String,
    pub query_time: std::time::Duration,
}

pub struct SearchEngine {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<dyn Embeddings>,
    config: SearchEngineConfig,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<dyn Embeddings>,
        config: SearchEngineConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Unrestricted progressive search: may fall back across repositories
    /// (stage 3) if the caller's repository yields nothing.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        self.run(request, true).await
    }

    /// Security-scoped variant (§4.4): repository relaxation never crosses
    /// repositories. Only stages 1–2 apply; `_global` is a real repository,
    /// never a wildcard.
    pub async fn search_scoped(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        self.run(request, false).await
    }

    async fn run(&self, request: &SearchRequest, allow_cross_repo: bool) -> Result<SearchOutcome> {
        if request.query.trim().is_empty() {
            return Err(MemoryError::Validation(
                "query must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        let limit = if request.limit == 0 { 10 } else { request.limit };
        let embedding = match self.embeddings.embed(&request.query).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("search proceeding without embedding: {e}");
                None
            }
        };

        let base_filter = SearchFilter {
            query_text: request.query.clone(),
            repository: request.repository.clone(),
            types: request.types.clone(),
            min_relevance: request.min_relevance,
            limit,
            since: request.recency.since(),
        };

        // Stage 1: strict.
        let strict = self.store.search(embedding.as_deref(), &base_filter).await?;
        if !strict.results.is_empty() || !self.config.progressive_search {
            return Ok(self.finish(strict.results, "strict", started));
        }
        tracing::debug!(query = %request.query, "search stage 1 (strict) empty, relaxing");

        // Stage 2: relaxed min_relevance.
        let relaxed_filter = SearchFilter {
            min_relevance: self.config.relaxed_min_relevance,
            ..base_filter.clone()
        };
        let relaxed = self.store.search(embedding.as_deref(), &relaxed_filter).await?;
        if !relaxed.results.is_empty() {
            return Ok(self.finish(relaxed.results, "relaxed", started));
        }
        tracing::debug!(query = %request.query, "search stage 2 (relaxed) empty, relaxing");

        if !allow_cross_repo {
            return Ok(self.finish(Vec::new(), "relaxed", started));
        }

        // Stage 3: repository fallback.
        if let Some(repository) = &base_filter.repository {
            for candidate in related_repositories(repository, self.config.max_related_repos) {
                let filter = SearchFilter {
                    repository: Some(candidate.clone()),
                    ..relaxed_filter.clone()
                };
                let hit = self.store.search(embedding.as_deref(), &filter).await?;
                if !hit.results.is_empty() {
                    return Ok(self.finish(
                        hit.results,
                        &format!("repository_fallback:{candidate}"),
                        started,
                    ));
                }
            }

            let dropped_filter = SearchFilter {
                repository: None,
                ..relaxed_filter.clone()
            };
            let dropped = self.store.search(embedding.as_deref(), &dropped_filter).await?;
            if !dropped.results.is_empty() {
                return Ok(self.finish(dropped.results, "repository_dropped", started));
            }
            tracing::debug!(query = %request.query, "search stage 3 (repository fallback) empty, relaxing");
        }

        // Stage 4: broadest — drop repository and type filters.
        let broadest_filter = SearchFilter {
            query_text: request.query.clone(),
            repository: None,
            types: Vec::new(),
            min_relevance: self.config.broadest_min_relevance,
            limit,
            since: base_filter.since,
        };
        let broadest = self.store.search(embedding.as_deref(), &broadest_filter).await?;
        Ok(self.finish(broadest.results, "broadest", started))
    }

    fn finish(
        &self,
        results: Vec<ScoredRecord>,
        stage: &str,
        started: Instant,
    ) -> SearchOutcome {
        SearchOutcome {
            results,
            stage: stage.to_string(),
            query_time: started.elapsed(),
        }
    }
}

/// §4.4 stage 3a: derive candidate sibling repository names from `name`.
fn related_repositories(name: &str, max: usize) -> Vec<String> {
    const SEPARATORS: [char; 4] = ['/', '-', '_', '.'];
    let Some(sep) = SEPARATORS.iter().find(|c| name.contains(**c)).copied() else {
        return Vec::new();
    };

    let all_parts: Vec<&str> = name.split(sep).collect();
    let mut by_size: Vec<&str> = all_parts.iter().copied().filter(|p| p.len() > 2).collect();
    by_size.sort_by_key(|p| std::cmp::Reverse(p.len()));

    let mut candidates: Vec<String> = by_size.into_iter().map(str::to_string).collect();
    if all_parts.len() >= 2 {
        let n = all_parts.len();
        candidates.push(format!("{}-{}", all_parts[n - 2], all_parts[n - 1]));
        candidates.push(format!("{}/{}", all_parts[0], all_parts[1]));
    }

    let mut seen = std::collections::HashSet::new();
    seen.insert(name.to_string());
    let mut out = Vec::new();
    for candidate in candidates {
        if candidate != name && seen.insert(candidate.clone()) {
            out.push(candidate);
        }
        if out.len() >= max {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_repositories_splits_and_dedupes() {
        let related = related_repositories("github.com/my-org/my-repo", 5);
        assert!(related.contains(&"my-org".to_string()) || related.contains(&"my-repo".to_string()));
        assert!(!related.contains(&"github.com/my-org/my-repo".to_string()));
    }

    #[test]
    fn related_repositories_empty_without_separator() {
        assert!(related_repositories("plainname", 5).is_empty());
    }

    #[test]
    fn recency_maps_to_expected_window() {
        assert!(Recency::AllTime.since().is_none());
        assert!(Recency::Recent.since().is_some());
    }
}
