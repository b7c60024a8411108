//! `ragsmith` — each stage of the ingestion/retrieval pipeline as an
//! independently runnable subcommand.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ragsmith::chunking::{ChunkerConfig, DEFAULT_CHUNK_SIZE_TOKENS};
use ragsmith::embeddings::{EmbeddingCache, EmbeddingService, HostedBackend, LocalBackend};
use ragsmith::keywords::KeywordExtractorConfig;
use ragsmith::pipeline;
use ragsmith::rerank::{HostedCrossEncoder, LexicalOverlapEncoder, Reranker};
use ragsmith::store::WeaviateStore;
use ragsmith::types::ModelId;
use ragsmith::{Config, RagError};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ragsmith")]
#[command(version)]
#[command(about = "Ingestion and retrieval engine for RAG over office documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk a Markdown file into `<path>.chunks.ndjson`
    Chunk {
        markdown_path: PathBuf,
        #[arg(short = 's', long, default_value_t = DEFAULT_CHUNK_SIZE_TOKENS)]
        chunk_size_tokens: usize,
    },
    /// Embed chunks into `<path>.embeddings.ndjson`
    Embed {
        chunks_path: PathBuf,
        #[arg(long, value_enum, default_value = "local")]
        backend: BackendKind,
    },
    /// Upsert embeddings into the vector store
    Upsert {
        embeddings_path: PathBuf,
        #[arg(short = 'c', long, default_value = "rag_chunks")]
        collection_name: String,
        #[arg(long, default_value_t = false)]
        no_recreate: bool,
    },
    /// Search the vector store for the nearest chunks to a query
    Search {
        query: String,
        #[arg(short = 'k', long, default_value_t = 10)]
        limit: usize,
        #[arg(short = 'c', long, default_value = "rag_chunks")]
        collection_name: String,
    },
    /// Rerank search results in `<path>.reranked.ndjson`
    Rerank { query: String, results_path: PathBuf },
    /// Print total and per-source object counts
    Inventory {
        #[arg(short = 'c', long, default_value = "rag_chunks")]
        collection_name: String,
    },
    /// Delete every chunk whose id starts with `<source-stem>-`
    Purge {
        source_stem: String,
        #[arg(short = 'c', long, default_value = "rag_chunks")]
        collection_name: String,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum BackendKind {
    Local,
    Hosted,
}

fn embedding_service(config: &Config, backend: BackendKind) -> Result<EmbeddingService, RagError> {
    let service = match backend {
        BackendKind::Local => EmbeddingService::new(Arc::new(LocalBackend::new(384))),
        BackendKind::Hosted => {
            let url = config.embed_backend_url.clone().ok_or_else(|| {
                RagError::Other("EMBED_BACKEND_URL must be set to use the hosted embedding backend".into())
            })?;
            let model = ModelId::new(&config.embed_model_name, &config.embed_model_version);
            EmbeddingService::new(Arc::new(HostedBackend::new(model, url, config.embed_api_key.clone())?))
        }
    };
    Ok(service.with_batch_size(config.embed_batch_size))
}

fn store(config: &Config) -> Result<WeaviateStore, RagError> {
    WeaviateStore::new(&config.vectorstore_host)
}

fn reranker(config: &Config) -> Reranker {
    let backend: Arc<dyn ragsmith::rerank::EncoderBackend> = match &config.embed_backend_url {
        Some(url) => match HostedCrossEncoder::new(url, &config.cross_encoder_model) {
            Ok(hosted) => Arc::new(hosted),
            Err(_) => Arc::new(LexicalOverlapEncoder),
        },
        None => Arc::new(LexicalOverlapEncoder),
    };
    Reranker::new(backend).with_batch_size(config.rerank_batch_size)
}

async fn run() -> Result<ExitCode, RagError> {
    let cli = Cli::parse();
    let config = Config::default();
    let mut exit_code = ExitCode::SUCCESS;

    match cli.command {
        Commands::Chunk {
            markdown_path,
            chunk_size_tokens,
        } => {
            let (path, warnings) = pipeline::run_chunk(
                &markdown_path,
                ChunkerConfig { chunk_size_tokens },
                KeywordExtractorConfig::default(),
            )
            .await?;
            for w in &warnings {
                eprintln!(
                    "warning: chunk {} is {} tokens, over the {}-token budget",
                    w.chunk_index, w.actual_tokens, w.budget
                );
            }
            println!("{}", path.display());
        }
        Commands::Embed { chunks_path, backend } => {
            let service = embedding_service(&config, backend)?;
            let path = pipeline::run_embed(&chunks_path, &service).await?;
            println!("{}", path.display());
        }
        Commands::Upsert {
            embeddings_path,
            collection_name,
            no_recreate,
        } => {
            let store = store(&config)?;
            let report = pipeline::run_upsert(&embeddings_path, &store, &collection_name, !no_recreate).await?;
            println!("{}", report.upserted);
            if report.skipped > 0 {
                eprintln!(
                    "warning: {} record(s) skipped for mismatched embedding dimension",
                    report.skipped
                );
                exit_code = ExitCode::from(1);
            }
        }
        Commands::Search {
            query,
            limit,
            collection_name,
        } => {
            let service = embedding_service(&config, BackendKind::Local)?;
            let cache_path = EmbeddingCache::path_for(std::path::Path::new("query"), service.model());
            let cache = EmbeddingCache::load(cache_path).await?;
            let store = store(&config)?;
            let results = pipeline::run_search(&query, &service, &cache, &store, &collection_name, limit).await?;
            for result in &results {
                println!("{}", serde_json::to_string(&result).map_err(RagError::from)?);
            }
        }
        Commands::Rerank { query, results_path } => {
            let reranker = reranker(&config);
            let path = pipeline::run_rerank(&query, &results_path, &reranker).await?;
            println!("{}", path.display());
        }
        Commands::Inventory { collection_name } => {
            let store = store(&config)?;
            let inventory = pipeline::run_inventory(&store, &collection_name).await?;
            println!("total: {}", inventory.total);
            for (stem, count) in &inventory.per_source {
                println!("{stem} ({count})");
            }
        }
        Commands::Purge {
            source_stem,
            collection_name,
        } => {
            let store = store(&config)?;
            let deleted = pipeline::run_purge(&store, &collection_name, &source_stem).await?;
            println!("{deleted}");
        }
    }

    Ok(exit_code)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "ragsmith failed");
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}
