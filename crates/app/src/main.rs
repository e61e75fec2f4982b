use chrono::Utc;
use clap::{Parser, Subcommand};
use docs_assistant_core::answer::{DEFAULT_ANTHROPIC_URL, DEFAULT_MODEL};
use docs_assistant_core::config::{DEFAULT_COLLECTION, DEFAULT_PERSIST_DIR};
use docs_assistant_core::{
    run_ingestion, AnswerRequest, AssistantConfig, DocsAssistant, IngestionOptions, LocalIndex,
    QdrantStore, Retriever, RetrievalQuery, SourceRef, VectorIndex,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(name = "docs-assistant", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the local index collections
    #[arg(long, env = "INDEX_PERSIST_DIR", default_value = DEFAULT_PERSIST_DIR)]
    persist_dir: PathBuf,

    /// Index collection name
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Qdrant base URL; uses the local index when omitted
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from a documentation checkout.
    Ingest {
        /// Root of the documentation repository.
        #[arg(long, env = "DOCS_PATH")]
        docs_path: PathBuf,
        /// Maximum characters per chunk before sub-splitting.
        #[arg(long, default_value = "800")]
        max_chunk_size: usize,
        /// Characters carried over between consecutive pieces of a section.
        #[arg(long, default_value = "100")]
        overlap: usize,
        /// Records per upsert call.
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },
    /// Print the ranked context for a question without generating an answer.
    Retrieve {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Only return chunks of this category.
        #[arg(long)]
        category: Option<String>,
        /// Search with the original question only.
        #[arg(long, default_value_t = false)]
        no_expansion: bool,
    },
    /// Answer a question from the indexed documentation.
    Ask {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        #[arg(long, default_value = "0.3")]
        temperature: f32,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, default_value = "")]
        api_key: String,
        #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = DEFAULT_ANTHROPIC_URL)]
        anthropic_url: String,
        #[arg(long, default_value = "2000")]
        max_tokens: u32,
        /// Public documentation site used to print source links.
        #[arg(long, default_value = "https://www.nebari.dev")]
        docs_url: String,
    },
    /// Print the number of chunks in the collection.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docs-assistant boot"
    );

    match cli.command {
        Command::Ingest {
            ref docs_path,
            max_chunk_size,
            overlap,
            batch_size,
        } => {
            let options = IngestionOptions {
                max_chunk_size,
                overlap,
                batch_size,
                ..IngestionOptions::default()
            };

            match &cli.qdrant_url {
                Some(url) => {
                    let store = QdrantStore::new(url, &cli.collection);
                    store.ensure_collection().await?;
                    ingest(&store, docs_path, &options).await?;
                }
                None => {
                    let index = LocalIndex::open_or_create(&cli.persist_dir, &cli.collection)?;
                    ingest(&index, docs_path, &options).await?;
                    println!("index written to {}", cli.persist_dir.display());
                }
            }
        }
        Command::Retrieve {
            ref query,
            top_k,
            ref category,
            no_expansion,
        } => {
            let request = RetrievalQuery {
                text: query.clone(),
                top_k,
                filters: docs_assistant_core::QueryFilters {
                    category: category.clone(),
                },
                use_expansion: !no_expansion,
            };

            match &cli.qdrant_url {
                Some(url) => {
                    let store = QdrantStore::open_existing(url, &cli.collection).await?;
                    retrieve(store, &request).await?;
                }
                None => {
                    let index = LocalIndex::open_existing(&cli.persist_dir, &cli.collection)?;
                    retrieve(index, &request).await?;
                }
            }
        }
        Command::Ask {
            ref query,
            top_k,
            temperature,
            ref category,
            ref api_key,
            ref model,
            ref anthropic_url,
            max_tokens,
            ref docs_url,
        } => {
            let config = AssistantConfig {
                persist_dir: cli.persist_dir.clone(),
                collection: cli.collection.clone(),
                api_key: api_key.clone(),
                model: model.clone(),
                anthropic_url: anthropic_url.clone(),
                max_tokens,
                top_k,
                temperature,
                ..AssistantConfig::default()
            };
            config.validate()?;

            let request = AnswerRequest {
                query: query.clone(),
                top_k,
                temperature,
                category_filter: category.clone(),
            };

            match &cli.qdrant_url {
                Some(url) => {
                    let store = QdrantStore::open_existing(url, &config.collection).await?;
                    ask(store, &config, &request, docs_url).await?;
                }
                None => {
                    let index = LocalIndex::open_existing(&config.persist_dir, &config.collection)?;
                    ask(index, &config, &request, docs_url).await?;
                }
            }
        }
        Command::Stats => {
            let count = match &cli.qdrant_url {
                Some(url) => {
                    QdrantStore::open_existing(url, &cli.collection)
                        .await?
                        .count()
                        .await?
                }
                None => {
                    LocalIndex::open_existing(&cli.persist_dir, &cli.collection)?
                        .count()
                        .await?
                }
            };
            println!("collection={} chunks={count}", cli.collection);
        }
    }

    Ok(())
}

async fn ingest<V>(index: &V, docs_path: &Path, options: &IngestionOptions) -> anyhow::Result<()>
where
    V: VectorIndex + Sync,
{
    info!(docs_path = %docs_path.display(), "scanning documentation");
    let report = run_ingestion(index, docs_path, options).await?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for docs_path={}",
            report.skipped_files.len(),
            docs_path.display()
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }
    }

    println!(
        "{} chunks from {} documents ingested at {} (digest {})",
        report.chunks.len(),
        report.documents,
        report.completed_at.to_rfc3339(),
        report.corpus_digest
    );
    Ok(())
}

async fn retrieve<V>(index: V, request: &RetrievalQuery) -> anyhow::Result<()>
where
    V: VectorIndex + Send + Sync,
{
    let retriever = Retriever::new(index);
    println!("query: {}", request.text);
    for (position, variation) in retriever.working_queries(request).iter().enumerate() {
        println!("  variation {}: {variation}", position + 1);
    }

    let results = retriever.retrieve(request).await?;
    if results.is_empty() {
        println!("no results");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let document = &result.metadata.document;
        println!(
            "[{}] relevance={:.4} file={} title={} category={} heading={}",
            rank + 1,
            result.relevance,
            document.file_path,
            document.title,
            document.category,
            result.metadata.heading
        );
        println!("{}", preview(&result.text));
    }
    Ok(())
}

async fn ask<V>(
    index: V,
    config: &AssistantConfig,
    request: &AnswerRequest,
    docs_url: &str,
) -> anyhow::Result<()>
where
    V: VectorIndex + Send + Sync,
{
    let assistant = DocsAssistant::new(Retriever::new(index), config.generator())
        .with_pricing(config.pricing)
        .with_max_tokens(config.max_tokens);

    let response = assistant.answer(request).await;
    println!("{}", response.answer);

    if let Some(error) = &response.error {
        anyhow::bail!("answer failed: {error}");
    }

    if !response.sources.is_empty() {
        println!("\nsources:");
        for source in &response.sources {
            print_source(source, docs_url);
        }
    }

    if let (Some(tokens), Some(cost)) = (response.tokens, response.cost) {
        println!(
            "\nmodel={} tokens_in={} tokens_out={} cost=${cost:.4}",
            response.model.as_deref().unwrap_or_default(),
            tokens.input,
            tokens.output
        );
    }
    println!(
        "retrieval={:.2}s generation={:.2}s total={:.2}s",
        response.timings.retrieval_secs,
        response.timings.generation_secs,
        response.timings.total_secs
    );
    Ok(())
}

fn print_source(source: &SourceRef, docs_url: &str) {
    let heading = if source.heading.is_empty() {
        String::new()
    } else {
        format!(" > {}", source.heading)
    };
    println!(
        "  - {}{heading} ({:.0}%) {}",
        source.title,
        source.relevance * 100.0,
        source.doc_url(docs_url)
    );
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
