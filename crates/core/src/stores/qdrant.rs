use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::models::{ChunkMetadata, IndexMatch, IndexRecord, QueryFilters};
use crate::traits::VectorIndex;
use crate::{ConfigError, SearchError};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct QdrantStore<E = CharacterNgramEmbedder>
where
    E: Embedder,
{
    endpoint: String,
    collection: String,
    client: Client,
    embedder: E,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::with_embedder(endpoint, collection, CharacterNgramEmbedder::default())
    }

    /// Connects to a collection that must already hold an ingested corpus.
    pub async fn open_existing(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let store = Self::new(endpoint, collection);
        let response = store
            .client
            .get(store.collection_url())
            .send()
            .await
            .map_err(SearchError::from)?;
        existing_collection(response.status(), &store.collection, &store.endpoint)?;
        Ok(store)
    }
}

fn existing_collection(
    status: StatusCode,
    collection: &str,
    endpoint: &str,
) -> Result<(), ConfigError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ConfigError::MissingIndex {
            collection: collection.to_string(),
            location: endpoint.to_string(),
        });
    }
    Err(backend_error(status).into())
}

impl<E> QdrantStore<E>
where
    E: Embedder,
{
    pub fn with_embedder(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        embedder: E,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            embedder,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }

    async fn search_one(
        &self,
        text: &str,
        k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<IndexMatch>, SearchError> {
        let mut body = json!({
            "vector": self.embedder.embed(text),
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter) = build_filter(filters) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::with_capacity(hits.len());
        for hit in hits {
            let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
            let text = payload
                .pointer("/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let metadata: ChunkMetadata = match serde_json::from_value(payload) {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!(%error, "skipping qdrant point with unreadable payload");
                    continue;
                }
            };
            let distance = hit
                .pointer("/score")
                .and_then(Value::as_f64)
                .map(|score| (1.0 - score).max(0.0));

            result.push(IndexMatch {
                text,
                metadata,
                distance,
            });
        }

        debug!(query = %text, hits = result.len(), "qdrant search");
        Ok(result)
    }
}

fn backend_error(status: StatusCode) -> SearchError {
    SearchError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn build_filter(filters: &QueryFilters) -> Option<Value> {
    filters.category.as_ref().map(|category| {
        json!({
            "must": [
                { "key": "category", "match": { "value": category } }
            ]
        })
    })
}

/// Qdrant only accepts integers or UUIDs as point ids.
pub fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

#[async_trait]
impl<E> VectorIndex for QdrantStore<E>
where
    E: Embedder,
{
    async fn delete_all(&self) -> Result<(), SearchError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }
        self.ensure_collection().await
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|record| record.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts);

        let points = records
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| -> Result<Value, SearchError> {
                let mut payload = serde_json::to_value(&record.metadata)?;
                payload["text"] = json!(record.text);
                payload["chunk_id"] = json!(record.id);
                Ok(json!({
                    "id": point_id(&record.id),
                    "vector": embedding,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn query(
        &self,
        texts: &[String],
        k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<Vec<IndexMatch>>, SearchError> {
        try_join_all(texts.iter().map(|text| self.search_one(text, k, filters))).await
    }

    async fn count(&self) -> Result<usize, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count response missing result.count".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_uuids() {
        assert_eq!(point_id("chunk_0"), point_id("chunk_0"));
        assert_ne!(point_id("chunk_0"), point_id("chunk_1"));
    }

    #[test]
    fn absent_collection_is_a_missing_index() {
        let result = existing_collection(StatusCode::NOT_FOUND, "docs", "http://localhost:6333");
        assert!(matches!(
            result,
            Err(ConfigError::MissingIndex { ref collection, ref location })
                if collection == "docs" && location == "http://localhost:6333"
        ));
    }

    #[test]
    fn collection_lookup_passes_through_other_statuses() {
        assert!(existing_collection(StatusCode::OK, "docs", "http://q").is_ok());
        assert!(matches!(
            existing_collection(StatusCode::INTERNAL_SERVER_ERROR, "docs", "http://q"),
            Err(ConfigError::Index(SearchError::BackendResponse { .. }))
        ));
    }

    #[test]
    fn category_filter_becomes_must_match() {
        assert!(build_filter(&QueryFilters::default()).is_none());
        let filter = build_filter(&QueryFilters::category("how-tos"));
        assert_eq!(
            filter,
            Some(json!({"must": [{"key": "category", "match": {"value": "how-tos"}}]}))
        );
    }
}
