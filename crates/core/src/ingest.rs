use crate::chunking::{chunk_by_headers, ChunkingConfig};
use crate::loader::{load_documents, SkippedFile};
use crate::models::{Chunk, Document, IndexRecord, IngestionOptions};
use crate::traits::VectorIndex;
use crate::IngestError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

pub struct IngestionReport {
    pub documents: usize,
    pub chunks: Vec<Chunk>,
    pub skipped_files: Vec<SkippedFile>,
    /// SHA-256 over the indexed records, in order.
    pub corpus_digest: String,
    pub completed_at: DateTime<Utc>,
}

pub fn chunk_documents(documents: &[Document], config: ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|document| chunk_by_headers(&document.content, &document.metadata, config))
        .collect();

    info!(
        chunks = chunks.len(),
        documents = documents.len(),
        "chunked documents"
    );
    chunks
}

pub fn build_records(chunks: &[Chunk]) -> Vec<IndexRecord> {
    chunks
        .iter()
        .enumerate()
        .map(|(position, chunk)| IndexRecord {
            id: format!("chunk_{position}"),
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        })
        .collect()
}

pub fn digest_records(records: &[IndexRecord]) -> Result<String, IngestError> {
    let mut hasher = Sha256::new();
    for record in records {
        let encoded = serde_json::to_vec(record).map_err(crate::SearchError::from)?;
        hasher.update(&encoded);
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Rebuilds the collection behind `index` from the documentation tree at `root`.
///
/// The collection is emptied first, so running twice over an unchanged tree reproduces the
/// same records.
pub async fn run_ingestion<V>(
    index: &V,
    root: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError>
where
    V: VectorIndex + Sync,
{
    options.validate()?;

    let loaded = load_documents(root, options);
    if !loaded.skipped_files.is_empty() {
        warn!(
            skipped = loaded.skipped_files.len(),
            root = %root.display(),
            "some files were skipped"
        );
    }
    if loaded.documents.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no documents found under {}",
            root.display()
        )));
    }

    let chunks = chunk_documents(&loaded.documents, ChunkingConfig::from(options));
    let records = build_records(&chunks);
    let corpus_digest = digest_records(&records)?;

    index.delete_all().await?;

    let total_batches = records.len().div_ceil(options.batch_size);
    for (number, batch) in records.chunks(options.batch_size).enumerate() {
        index.upsert(batch).await?;
        info!(
            batch = number + 1,
            total = total_batches,
            records = batch.len(),
            "ingested batch"
        );
    }

    info!(chunks = records.len(), digest = %corpus_digest, "ingestion complete");

    Ok(IngestionReport {
        documents: loaded.documents.len(),
        chunks,
        skipped_files: loaded.skipped_files,
        corpus_digest,
        completed_at: Utc::now(),
    })
}
