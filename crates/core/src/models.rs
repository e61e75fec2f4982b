use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Origin category of a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    #[serde(rename = "docs")]
    Documentation,
    #[serde(rename = "community")]
    Community,
    #[serde(rename = "website")]
    Website,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Documentation => "docs",
            SourceKind::Community => "community",
            SourceKind::Website => "website",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source: SourceKind,
    /// Path relative to the content directory; stable identifier within a source.
    pub file_path: String,
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub id: String,
    /// Absolute origin of the document, never empty.
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Document metadata enriched with the owning section heading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// Nearest enclosing heading; empty for content before the first heading.
    #[serde(default)]
    pub heading: String,
}

impl ChunkMetadata {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            file_path: self.document.file_path.clone(),
            heading: self.heading.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Logical identity of a passage: chunks sharing `(file_path, heading)` are the same passage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub file_path: String,
    pub heading: String,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, self.heading)
    }
}

/// A chunk as handed to an index sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One nearest-neighbour match returned by an index sink.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct QueryFilters {
    pub category: Option<String>,
}

impl QueryFilters {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.category
            .as_deref()
            .map_or(true, |category| metadata.document.category == category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RetrievalQuery {
    pub text: String,
    pub top_k: usize,
    pub filters: QueryFilters,
    pub use_expansion: bool,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filters: QueryFilters::default(),
            use_expansion: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// `1 / (1 + distance)`, in `(0, 1]`.
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDirectory {
    pub name: String,
    /// Location relative to the documentation root.
    pub relative_path: PathBuf,
    pub source: SourceKind,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub max_chunk_size: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub content_directories: Vec<ContentDirectory>,
    pub include_readme: bool,
    pub include_website_copy: bool,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 800,
            overlap: 100,
            batch_size: 100,
            content_directories: vec![
                ContentDirectory {
                    name: "docs".to_string(),
                    relative_path: PathBuf::from("docs").join("docs"),
                    source: SourceKind::Documentation,
                },
                ContentDirectory {
                    name: "community".to_string(),
                    relative_path: PathBuf::from("docs").join("community"),
                    source: SourceKind::Community,
                },
            ],
            include_readme: true,
            include_website_copy: true,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chunk_size == 0 {
            return Err(IngestError::InvalidOptions(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(IngestError::InvalidOptions(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub file_path: String,
    pub category: String,
    pub title: String,
    pub heading: String,
    pub relevance: f64,
}

impl SourceRef {
    pub fn from_result(result: &RetrievalResult) -> Self {
        Self {
            file_path: result.metadata.document.file_path.clone(),
            category: result.metadata.document.category.clone(),
            title: result.metadata.document.title.clone(),
            heading: result.metadata.heading.clone(),
            relevance: result.relevance,
        }
    }

    /// Public page for this source under `base_url`.
    pub fn doc_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.category == "home" {
            return base.to_string();
        }

        let path = self
            .file_path
            .strip_suffix(".mdx")
            .or_else(|| self.file_path.strip_suffix(".md"))
            .unwrap_or(&self.file_path);
        format!("{base}/docs/{path}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Timings {
    pub retrieval_secs: f64,
    pub generation_secs: f64,
    pub total_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRequest {
    pub query: String,
    pub top_k: usize,
    pub temperature: f32,
    pub category_filter: Option<String>,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            temperature: 0.3,
            category_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub model: Option<String>,
    pub tokens: Option<TokenUsage>,
    pub cost: Option<f64>,
    pub timings: Timings,
    pub error: Option<String>,
}

impl AnswerResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(category: &str) -> ChunkMetadata {
        ChunkMetadata {
            document: DocumentMetadata {
                source: SourceKind::Documentation,
                file_path: "how-tos/aws.md".to_string(),
                category: category.to_string(),
                title: "AWS".to_string(),
                description: String::new(),
                id: "aws".to_string(),
                source_file: "/docs/docs/how-tos/aws.md".to_string(),
            },
            heading: "Prerequisites".to_string(),
        }
    }

    #[test]
    fn chunk_metadata_serializes_flat() -> Result<(), Box<dyn std::error::Error>> {
        let value = serde_json::to_value(metadata("how-tos"))?;
        assert_eq!(value["category"], "how-tos");
        assert_eq!(value["heading"], "Prerequisites");
        assert_eq!(value["source"], "docs");
        Ok(())
    }

    #[test]
    fn category_filter_is_exact_match() {
        let filter = QueryFilters::category("how-tos");
        assert!(filter.matches(&metadata("how-tos")));
        assert!(!filter.matches(&metadata("how-tos-extra")));
        assert!(QueryFilters::default().matches(&metadata("anything")));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(IngestionOptions::default().validate().is_ok());
        let no_chunks = IngestionOptions {
            max_chunk_size: 0,
            ..IngestionOptions::default()
        };
        assert!(no_chunks.validate().is_err());
        let no_batches = IngestionOptions {
            batch_size: 0,
            ..IngestionOptions::default()
        };
        assert!(no_batches.validate().is_err());
    }

    #[test]
    fn doc_url_drops_markdown_extension() {
        let source = SourceRef::from_result(&RetrievalResult {
            text: String::new(),
            metadata: metadata("how-tos"),
            relevance: 0.5,
        });
        assert_eq!(
            source.doc_url("https://nebari.dev/"),
            "https://nebari.dev/docs/how-tos/aws"
        );
    }
}
