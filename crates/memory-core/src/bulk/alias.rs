// src/bulk/alias.rs
// Alias half of §4.9: a named pointer to a record set, re-executed on
// resolve.

use std::sync::Arc;

use chrono::Utc;
use memory_types::{Alias, AliasMetadata, AliasTarget, AliasType, Record};

use crate::error::{MemoryError, Result};
use crate::store::{SearchFilter, VectorStore};

#[derive(Debug, Clone)]
pub struct CreateAliasInput {
    pub name: String,
    pub alias_type: AliasType,
    pub description: String,
    pub target: AliasTarget,
    pub metadata: AliasMetadata,
}

pub struct AliasManager {
    store: Arc<dyn VectorStore>,
}

impl AliasManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: CreateAliasInput) -> Result<Alias> {
        if input.name.trim().is_empty() {
            return Err(MemoryError::Validation(
                "'name' is required for create_alias. Example: {\"name\": \"my-shortcut\", \"type\": \"query\", \"target\": {...}}".to_string(),
            ));
        }
        if self.store.get_alias_by_name(&input.name).await?.is_some() {
            return Err(MemoryError::Conflict(format!(
                "alias '{}' already exists",
                input.name
            )));
        }
        let now = Utc::now();
        let alias = Alias {
            id: memory_types::new_id(),
            name: input.name,
            alias_type: input.alias_type,
            description: input.description,
            target: input.target,
            metadata: input.metadata,
            access_count: 0,
            created_at: now,
            updated_at: now,
            last_accessed: None,
        };
        self.store.store_alias(&alias).await?;
        Ok(alias)
    }

    pub async fn list(&self, repository: Option<&str>) -> Result<Vec<Alias>> {
        self.store.list_aliases(repository).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_alias(id).await
    }

    /// Re-executes the alias's target and bumps `access_count`/`last_accessed`.
    pub async fn resolve(&self, name: &str) -> Result<Vec<Record>> {
        let mut alias = self
            .store
            .get_alias_by_name(name)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("alias '{name}'")))?;

        let records = match &alias.target {
            AliasTarget::ChunkIds { chunk_ids } => {
                let mut out = Vec::with_capacity(chunk_ids.len());
                for id in chunk_ids {
                    if let Some(record) = self.store.get_by_id(id).await? {
                        out.push(record);
                    }
                }
                out
            }
            AliasTarget::Collection { chunk_ids, .. } => {
                let mut out = Vec::with_capacity(chunk_ids.len());
                for id in chunk_ids {
                    if let Some(record) = self.store.get_by_id(id).await? {
                        out.push(record);
                    }
                }
                out
            }
            AliasTarget::Filter { repository } => {
                self.store.list_by_repository(repository, 100, 0).await?
            }
            AliasTarget::Query {
                query,
                repository,
                limit,
            } => {
                let filter = SearchFilter {
                    query_text: query.clone(),
                    repository: repository.clone(),
                    types: Vec::new(),
                    min_relevance: 0.0,
                    limit: (*limit).max(1),
                    since: None,
                };
                self.store
                    .search(None, &filter)
                    .await?
                    .results
                    .into_iter()
                    .map(|scored| scored.record)
                    .collect()
            }
        };

        alias.access_count += 1;
        alias.last_accessed = Some(Utc::now());
        self.store.update_alias(&alias).await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{build_record, NewRecordInput};
    use crate::store::sqlite::SqliteStore;
    use memory_types::GLOBAL_REPOSITORY;

    #[tokio::test]
    async fn resolve_chunk_ids_bumps_access_count() {
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open_in_memory(8).unwrap());
        store.initialize().await.unwrap();
        let record = build_record(NewRecordInput {
            content: "hello".to_string(),
            session: "s1".to_string(),
            repository: Some(GLOBAL_REPOSITORY.to_string()),
            ..Default::default()
        })
        .unwrap();
        store.store(&record).await.unwrap();

        let manager = AliasManager::new(store);
        let alias = manager
            .create(CreateAliasInput {
                name: "my-alias".to_string(),
                alias_type: AliasType::Shortcut,
                description: "".to_string(),
                target: AliasTarget::ChunkIds {
                    chunk_ids: vec![record.id.clone()],
                },
                metadata: AliasMetadata::default(),
            })
            .await
            .unwrap();

        let resolved = manager.resolve(&alias.name).await.unwrap();
        assert_eq!(resolved.len(), 1);

        let refetched = manager
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.id == alias.id)
            .unwrap();
        assert_eq!(refetched.access_count, 1);
        assert!(refetched.last_accessed.is_some());
    }
}
