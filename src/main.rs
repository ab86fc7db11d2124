use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codeatlas::cache::{CacheTier, MemoryTier, SqliteTier, TieredCache};
use codeatlas::config::Config;
use codeatlas::embedder::{DualEmbedder, Embedder, MockEmbedder, OnnxEmbedder};
use codeatlas::indexer::IndexEngine;
use codeatlas::language::Language;
use codeatlas::search::{SearchFilters, SearchRequest};
use codeatlas::store::models::ErrorKind;
use codeatlas::store::Store;

#[derive(Parser)]
#[command(name = "codeatlas", about = "Code indexing and hybrid search", version)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a repository from a directory tree.
    Index {
        repository: String,
        path: PathBuf,
        /// Restrict the run to a single language.
        #[arg(long)]
        language: Option<String>,
    },
    /// Hybrid search over indexed chunks.
    Search {
        repository: String,
        query: String,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        chunk_type: Option<String>,
        #[arg(long, default_value_t = 0)]
        top_k: usize,
    },
    /// Connectivity summary for a repository graph.
    GraphStats { repository: String },
    /// Nodes calling the given node.
    Callers { repository: String, node_id: String },
    /// Nodes called by the given node.
    Callees { repository: String, node_id: String },
    /// Shortest relationship path between two nodes.
    Path {
        repository: String,
        from: String,
        to: String,
    },
    /// Page through logged indexing errors.
    Errors {
        repository: String,
        #[arg(long)]
        error_type: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Error counts per type.
    ErrorSummary { repository: String },
    /// Hit/miss counters for the cache tiers.
    CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // 1. Load and validate config
    let config = Config::load(&cli.config)?;
    config.validate()?;

    // 2. Open the durable store
    let store = Store::open(Path::new(&config.db_path), config.model.dimensions)
        .context("failed to open store")?;
    let store = Arc::new(TokioMutex::new(store));

    // 3. Embedders for both domains, ONNX when models are on disk
    let embedder = Arc::new(build_embedder(&config));

    // 4. Cache tiers
    let cache = Arc::new(build_cache(&config)?);

    // 5. Engine
    let engine = IndexEngine::new(&config, store, embedder, cache)?;

    match cli.command {
        Command::Index {
            repository,
            path,
            language,
        } => {
            let only_language = language
                .as_deref()
                .map(|raw| raw.parse::<Language>())
                .transpose()?;
            let report = engine
                .index(
                    &repository,
                    &path,
                    &config.chunking.excluded_dirs,
                    only_language,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Search {
            repository,
            query,
            language,
            chunk_type,
            top_k,
        } => {
            let request = SearchRequest {
                query,
                repository,
                filters: SearchFilters {
                    language,
                    chunk_type,
                },
                top_k: if top_k > 0 { top_k } else { config.search.top_k },
            };
            let hits = engine.search(&request).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::GraphStats { repository } => {
            let stats = engine.graph_stats(&repository).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Callers {
            repository,
            node_id,
        } => {
            let index = engine.graph_index(&repository).await?;
            for node in index.callers(&node_id) {
                println!("{}\t{}", node.node_id, node.qualified_name);
            }
        }
        Command::Callees {
            repository,
            node_id,
        } => {
            let index = engine.graph_index(&repository).await?;
            for node in index.callees(&node_id) {
                println!("{}\t{}", node.node_id, node.qualified_name);
            }
        }
        Command::Path {
            repository,
            from,
            to,
        } => {
            let index = engine.graph_index(&repository).await?;
            match index.shortest_path(&from, &to) {
                Some(path) => println!("{}", path.join(" -> ")),
                None => println!("no path"),
            }
        }
        Command::Errors {
            repository,
            error_type,
            limit,
            offset,
        } => {
            let kind = match error_type.as_deref() {
                Some(raw) => Some(
                    ErrorKind::parse(raw)
                        .with_context(|| format!("unknown error type: {raw}"))?,
                ),
                None => None,
            };
            let errors = engine.list_errors(&repository, kind, limit, offset).await?;
            println!("{}", serde_json::to_string_pretty(&errors)?);
        }
        Command::ErrorSummary { repository } => {
            for (error_type, count) in engine.error_summary(&repository).await? {
                println!("{error_type}\t{count}");
            }
        }
        Command::CacheStats => {
            println!("{}", serde_json::to_string_pretty(&engine.cache_stats())?);
        }
    }

    Ok(())
}

/// ONNX models when both configured directories exist, hash-based
/// embedders otherwise.
fn build_embedder(config: &Config) -> DualEmbedder {
    let timeout = Duration::from_secs(config.model.embed_timeout_secs);
    let dims = config.model.dimensions;

    let load = |dir: &Option<String>, domain: &str| -> Option<Arc<dyn Embedder>> {
        let dir = dir.as_deref()?;
        match OnnxEmbedder::new(Path::new(dir), dims) {
            Ok(embedder) => {
                info!(domain, dir, "loaded ONNX model");
                Some(Arc::new(embedder))
            }
            Err(e) => {
                warn!(domain, dir, error = %e, "ONNX model unavailable");
                None
            }
        }
    };

    let text = load(&config.model.text_model_dir, "text");
    let code = load(&config.model.code_model_dir, "code");
    match (text, code) {
        (Some(text), Some(code)) => DualEmbedder::new(text, code, timeout),
        _ => {
            warn!("falling back to hash-based embeddings; search quality will be degraded");
            DualEmbedder::new(
                Arc::new(MockEmbedder::with_salt(dims, 1)),
                Arc::new(MockEmbedder::with_salt(dims, 2)),
                timeout,
            )
        }
    }
}

fn build_cache(config: &Config) -> Result<TieredCache> {
    let mut tiers: Vec<Box<dyn CacheTier>> =
        vec![Box::new(MemoryTier::new(config.cache.l1_capacity))];
    if let Some(l2_path) = &config.cache.l2_path {
        let tier = SqliteTier::open(Path::new(l2_path), config.cache.l2_ttl_secs)
            .context("failed to open shared cache")?;
        tiers.push(Box::new(tier));
    }
    Ok(TieredCache::new(tiers))
}
