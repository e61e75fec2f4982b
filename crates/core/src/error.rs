use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid utf-8: {0}")]
    Decode(String),

    #[error("malformed front-matter in {path}: {details}")]
    FrontMatter { path: String, details: String },

    #[error("path is not under content root: {0}")]
    OutsideRoot(String),

    #[error("invalid ingestion options: {0}")]
    InvalidOptions(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index error: {0}")]
    Index(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("index state is unavailable: {0}")]
    Poisoned(String),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider {provider} returned {status}: {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "collection '{collection}' not found at {location}; run `docs-assistant ingest` first"
    )]
    MissingIndex {
        collection: String,
        location: String,
    },

    #[error("{variable} is not set; export it or add it to your environment before starting")]
    MissingCredentials { variable: String },

    #[error("invalid setting {name}: {details}")]
    InvalidSetting { name: String, details: String },

    #[error("unable to read index: {0}")]
    Index(#[from] SearchError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
