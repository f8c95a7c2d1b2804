// src/relationships/mod.rs
// `RelationshipGraph` (§4.5): auto-detection, explicit parent-child edges,
// traversal, and confidence evolution over the typed edges `VectorStore`
// persists.

mod detect;

use std::sync::Arc;

use chrono::Utc;
use memory_types::{ConfidenceFactors, ConfidenceSource, Record, RelationType, Relationship};

use crate::error::{MemoryError, Result};
use crate::store::{RelationshipQuery, SearchFilter, TraverseResult, VectorStore};

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Candidate edges scoring below this are dropped.
    pub min_confidence: f64,
    /// How many recent same-repository records to consider (§4.5: "up to 20").
    pub lookback_limit: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            lookback_limit: 20,
        }
    }
}

pub struct RelationshipGraph {
    store: Arc<dyn VectorStore>,
}

impl RelationshipGraph {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Post-store, asynchronous, non-blocking on the write path (§4.5).
    /// Scoped to `record`'s repository; never crosses repositories.
    pub async fn auto_detect(
        &self,
        record: &Record,
        config: &DetectionConfig,
    ) -> Result<Vec<Relationship>> {
        let filter = SearchFilter {
            query_text: record.summary.clone(),
            repository: Some(record.metadata.repository.clone()),
            types: Vec::new(),
            min_relevance: 0.0,
            limit: config.lookback_limit,
            since: None,
        };
        let recent = self
            .store
            .search(record.embedding.as_deref(), &filter)
            .await?;

        let mut created = Vec::new();
        for scored in recent.results {
            let candidate = scored.record;
            if candidate.id == record.id {
                continue;
            }
            debug_assert_eq!(
                candidate.metadata.repository, record.metadata.repository,
                "auto-detection must stay within one repository (§8 universal property)"
            );

            for detected in detect::run_all(record, &candidate) {
                if detected.confidence < config.min_confidence {
                    continue;
                }
                let relationship = Relationship {
                    id: memory_types::new_id(),
                    source_id: record.id.clone(),
                    target_id: candidate.id.clone(),
                    relation_type: detected.relation_type,
                    confidence: detected.confidence,
                    confidence_source: ConfidenceSource::Detected,
                    confidence_factors: ConfidenceFactors::default(),
                    validation_count: 0,
                    last_validated: None,
                    created_at: Utc::now(),
                };
                self.store.store_relationship(&relationship).await?;
                created.push(relationship);
            }
        }
        Ok(created)
    }

    /// Explicit `parent_child` edge from `extended_metadata.parent_chunk`
    /// (§4.5), at full confidence since the caller asserted it directly.
    pub async fn create_parent_child(&self, record: &Record) -> Result<Option<Relationship>> {
        let Some(parent_id) = record.metadata.parent_chunk() else {
            return Ok(None);
        };
        let relationship = Relationship {
            id: memory_types::new_id(),
            source_id: parent_id.to_string(),
            target_id: record.id.clone(),
            relation_type: RelationType::ParentChild,
            confidence: 1.0,
            confidence_source: ConfidenceSource::Explicit,
            confidence_factors: ConfidenceFactors::default(),
            validation_count: 0,
            last_validated: None,
            created_at: Utc::now(),
        };
        self.store.store_relationship(&relationship).await?;
        Ok(Some(relationship))
    }

    pub async fn get_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        self.store.get_relationships(query).await
    }

    pub async fn traverse(
        &self,
        start_chunk_id: &str,
        max_depth: usize,
        allowed_types: Option<&[RelationType]>,
    ) -> Result<TraverseResult> {
        self.store
            .traverse_graph(start_chunk_id, max_depth, allowed_types)
            .await
    }

    /// §4.5 update: mutates confidence in place; never retypes the edge
    /// (§3 invariant — relationships may be updated but not retyped).
    /// Supplying `user_certainty` promotes `confidence_source` to `Explicit`.
    pub async fn update_relationship(
        &self,
        id: &str,
        confidence: f64,
        factors: ConfidenceFactors,
    ) -> Result<Relationship> {
        let mut relationship = self
            .store
            .get_relationship_by_id(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("relationship {id}")))?;

        if factors.user_certainty.is_some() {
            relationship.confidence_source = ConfidenceSource::Explicit;
        }
        relationship.confidence = confidence.clamp(0.0, 1.0);
        relationship.confidence_factors = factors;
        relationship.validation_count += 1;
        relationship.last_validated = Some(Utc::now());

        self.store.update_relationship(&relationship).await?;
        Ok(relationship)
    }

    pub async fn delete_relationship(&self, id: &str) -> Result<()> {
        self.store.delete_relationship(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;
    use memory_types::{Difficulty, Outcome, RecordMetadata, RecordType, GLOBAL_REPOSITORY};

    fn record(id: &str, repo: &str, record_type: RecordType, tags: Vec<String>) -> Record {
        Record {
            id: id.to_string(),
            session_id: format!("{repo}::s1"),
            timestamp: Utc::now(),
            record_type,
            content: "some content".to_string(),
            summary: "some content".to_string(),
            embedding: None,
            metadata: RecordMetadata {
                repository: repo.to_string(),
                branch: None,
                files_modified: Vec::new(),
                tools_used: Vec::new(),
                tags,
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

    #[tokio::test]
    async fn auto_detect_links_problem_and_solution_via_shared_tag() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();

        let problem = record(
            "p1",
            GLOBAL_REPOSITORY,
            RecordType::Problem,
            vec!["auth".into()],
        );
        store.store(&problem).await.unwrap();

        let solution = record(
            "s1",
            GLOBAL_REPOSITORY,
            RecordType::Solution,
            vec!["auth".into()],
        );

        let graph = RelationshipGraph::new(store.clone());
        let created = graph
            .auto_detect(&solution, &DetectionConfig::default())
            .await
            .unwrap();

        assert!(created.iter().any(|r| r.target_id == "p1"));
    }

    #[tokio::test]
    async fn update_relationship_promotes_confidence_source() {
        let store = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let relationship = Relationship {
            id: "r1".to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            relation_type: RelationType::RelatedTo,
            confidence: 0.5,
            confidence_source: ConfidenceSource::Detected,
            confidence_factors: ConfidenceFactors::default(),
            validation_count: 0,
            last_validated: None,
            created_at: Utc::now(),
        };
        store.store_relationship(&relationship).await.unwrap();

        let graph = RelationshipGraph::new(store);
        let mut factors = ConfidenceFactors::default();
        factors.user_certainty = Some(0.9);
        let updated = graph.update_relationship("r1", 0.95, factors).await.unwrap();

        assert_eq!(updated.confidence_source, ConfidenceSource::Explicit);
        assert_eq!(updated.validation_count, 1);
    }
}
