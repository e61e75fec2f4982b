use crate::embeddings::{cosine_distance, CharacterNgramEmbedder, Embedder};
use crate::error::ConfigError;
use crate::models::{IndexMatch, IndexRecord, QueryFilters};
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    record: IndexRecord,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCollection {
    version: u32,
    collection: String,
    dimensions: usize,
    records: Vec<StoredRecord>,
}

/// Brute-force nearest-neighbour collection persisted as one JSON file.
///
/// Single writer, many readers. Distances are cosine distances between embeddings.
pub struct LocalIndex<E = CharacterNgramEmbedder>
where
    E: Embedder,
{
    path: Option<PathBuf>,
    collection: String,
    embedder: E,
    records: RwLock<Vec<StoredRecord>>,
}

impl LocalIndex {
    pub fn in_memory(collection: impl Into<String>) -> Self {
        Self::with_embedder(collection, CharacterNgramEmbedder::default())
    }

    /// Opens the collection under `persist_dir`, starting empty when it does not exist yet.
    pub fn open_or_create(persist_dir: &Path, collection: &str) -> Result<Self, SearchError> {
        std::fs::create_dir_all(persist_dir)?;
        let path = collection_path(persist_dir, collection);
        let mut index = Self::in_memory(collection);
        if path.exists() {
            index.load(&path)?;
        }
        index.path = Some(path);
        Ok(index)
    }

    /// Opens a collection that must already have been ingested.
    pub fn open_existing(persist_dir: &Path, collection: &str) -> Result<Self, ConfigError> {
        let path = collection_path(persist_dir, collection);
        if !path.is_file() {
            return Err(ConfigError::MissingIndex {
                collection: collection.to_string(),
                location: persist_dir.display().to_string(),
            });
        }

        let mut index = Self::in_memory(collection);
        index.load(&path)?;
        index.path = Some(path);
        Ok(index)
    }
}

impl<E> LocalIndex<E>
where
    E: Embedder,
{
    pub fn with_embedder(collection: impl Into<String>, embedder: E) -> Self {
        Self {
            path: None,
            collection: collection.into(),
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load(&mut self, path: &Path) -> Result<(), SearchError> {
        let raw = std::fs::read_to_string(path)?;
        let persisted: PersistedCollection = serde_json::from_str(&raw)?;

        if persisted.dimensions != self.embedder.dimensions() {
            return Err(SearchError::Request(format!(
                "collection {} was built with {} dimensions but the embedder produces {}; \
                 re-run ingestion",
                persisted.collection,
                persisted.dimensions,
                self.embedder.dimensions()
            )));
        }

        info!(
            collection = %persisted.collection,
            version = persisted.version,
            records = persisted.records.len(),
            "loaded local index"
        );
        self.records = RwLock::new(persisted.records);
        Ok(())
    }

    async fn persist(&self) -> Result<(), SearchError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let payload = {
            let records = self.read()?;
            serde_json::to_string(&PersistedCollection {
                version: FORMAT_VERSION,
                collection: self.collection.clone(),
                dimensions: self.embedder.dimensions(),
                records: records.clone(),
            })?
        };

        tokio::fs::write(path, payload).await?;
        debug!(path = %path.display(), "persisted local index");
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<StoredRecord>>, SearchError> {
        self.records
            .read()
            .map_err(|error| SearchError::Poisoned(error.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<StoredRecord>>, SearchError> {
        self.records
            .write()
            .map_err(|error| SearchError::Poisoned(error.to_string()))
    }
}

pub fn collection_path(persist_dir: &Path, collection: &str) -> PathBuf {
    persist_dir.join(format!("{collection}.json"))
}

#[async_trait]
impl<E> VectorIndex for LocalIndex<E>
where
    E: Embedder,
{
    async fn delete_all(&self) -> Result<(), SearchError> {
        self.write()?.clear();
        self.persist().await
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|record| record.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts);

        {
            let mut stored = self.write()?;
            let mut positions: HashMap<String, usize> = stored
                .iter()
                .enumerate()
                .map(|(position, item)| (item.record.id.clone(), position))
                .collect();

            for (record, embedding) in records.iter().zip(embeddings) {
                let item = StoredRecord {
                    record: record.clone(),
                    embedding,
                };
                match positions.get(&record.id) {
                    Some(&position) => stored[position] = item,
                    None => {
                        positions.insert(record.id.clone(), stored.len());
                        stored.push(item);
                    }
                }
            }
        }

        self.persist().await
    }

    async fn query(
        &self,
        texts: &[String],
        k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<Vec<IndexMatch>>, SearchError> {
        let query_vectors = self.embedder.embed_batch(texts);
        let stored = self.read()?;

        let results = query_vectors
            .iter()
            .map(|query_vector| {
                let mut scored: Vec<(f64, &StoredRecord)> = stored
                    .iter()
                    .filter(|item| filters.matches(&item.record.metadata))
                    .map(|item| (cosine_distance(query_vector, &item.embedding), item))
                    .collect();
                scored.sort_by(|left, right| left.0.total_cmp(&right.0));

                scored
                    .into_iter()
                    .take(k)
                    .map(|(distance, item)| IndexMatch {
                        text: item.record.text.clone(),
                        metadata: item.record.metadata.clone(),
                        distance: Some(distance),
                    })
                    .collect()
            })
            .collect();

        Ok(results)
    }

    async fn count(&self) -> Result<usize, SearchError> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, DocumentMetadata, SourceKind};
    use tempfile::tempdir;

    fn record(id: &str, category: &str, text: &str) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                document: DocumentMetadata {
                    source: SourceKind::Documentation,
                    file_path: format!("{category}/{id}.md"),
                    category: category.to_string(),
                    title: id.to_string(),
                    description: String::new(),
                    id: id.to_string(),
                    source_file: format!("/docs/{category}/{id}.md"),
                },
                heading: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_distance_and_applies_filter() -> Result<(), SearchError> {
        let index = LocalIndex::in_memory("docs");
        index
            .upsert(&[
                record("keycloak", "how-tos", "Configure Keycloak authentication and login."),
                record("dask", "tutorials", "Scale dataframes with Dask gateway clusters."),
                record("auth", "tutorials", "Keycloak authentication users and groups."),
            ])
            .await?;

        let all = index
            .query(&["keycloak authentication".to_string()], 2, &QueryFilters::default())
            .await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].len(), 2);
        assert!(all[0][0].distance <= all[0][1].distance);
        assert_ne!(all[0][0].metadata.document.id, "dask");

        let filtered = index
            .query(
                &["keycloak authentication".to_string()],
                5,
                &QueryFilters::category("tutorials"),
            )
            .await?;
        assert!(filtered[0]
            .iter()
            .all(|hit| hit.metadata.document.category == "tutorials"));
        assert_eq!(filtered[0][0].metadata.document.id, "auth");
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_existing_ids() -> Result<(), SearchError> {
        let index = LocalIndex::in_memory("docs");
        index.upsert(&[record("a", "x", "old text")]).await?;
        index.upsert(&[record("a", "x", "new text")]).await?;

        assert_eq!(index.count().await?, 1);
        let hits = index
            .query(&["new text".to_string()], 1, &QueryFilters::default())
            .await?;
        assert_eq!(hits[0][0].text, "new text");
        Ok(())
    }

    #[tokio::test]
    async fn collection_round_trips_through_disk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let index = LocalIndex::open_or_create(dir.path(), "docs")?;
            index.upsert(&[record("a", "x", "persisted text")]).await?;
        }

        let reopened = LocalIndex::open_existing(dir.path(), "docs")?;
        assert_eq!(reopened.count().await?, 1);

        reopened.delete_all().await?;
        let cleared = LocalIndex::open_existing(dir.path(), "docs")?;
        assert_eq!(cleared.count().await?, 0);
        Ok(())
    }

    #[test]
    fn missing_collection_is_a_config_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = LocalIndex::open_existing(dir.path(), "docs");
        assert!(matches!(result, Err(ConfigError::MissingIndex { .. })));
        Ok(())
    }
}
