use crate::error::{AnswerError, SearchError};
use crate::models::{IndexMatch, IndexRecord, QueryFilters};
use async_trait::async_trait;

/// Nearest-neighbour store holding the chunk corpus.
#[async_trait]
pub trait VectorIndex {
    /// Drops every record of the collection so ingestion can start from scratch.
    async fn delete_all(&self) -> Result<(), SearchError>;

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), SearchError>;

    /// Runs one top-`k` lookup per text; the outer vector is aligned with `texts`.
    async fn query(
        &self,
        texts: &[String],
        k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<Vec<IndexMatch>>, SearchError>;

    async fn count(&self) -> Result<usize, SearchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait AnswerGenerator {
    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation, AnswerError>;
}
