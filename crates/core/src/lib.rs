pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod expansion;
pub mod extractor;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use answer::{
    build_context, AnthropicClient, DocsAssistant, ModelPricing, NO_CONTEXT_ANSWER,
};
pub use chunking::{chunk_by_headers, split_sections, ChunkingConfig};
pub use config::AssistantConfig;
pub use embeddings::{
    cosine_distance, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{AnswerError, ConfigError, IngestError, SearchError};
pub use expansion::{expand_query, ExpansionRule, QueryExpander, MAX_QUERIES};
pub use extractor::{extract_frontmatter, strip_mdx_components};
pub use ingest::{chunk_documents, run_ingestion, IngestionReport};
pub use loader::{discover_markdown_files, load_documents, LoadReport, SkippedFile};
pub use models::{
    AnswerRequest, AnswerResponse, Chunk, ChunkKey, ChunkMetadata, ContentDirectory, Document,
    DocumentMetadata, IndexMatch, IndexRecord, IngestionOptions, QueryFilters, RetrievalQuery,
    RetrievalResult, SourceKind, SourceRef, Timings, TokenUsage,
};
pub use retrieval::{distance_to_relevance, promote_distance, Retriever};
pub use stores::{LocalIndex, QdrantStore};
pub use traits::{AnswerGenerator, Generation, VectorIndex};
