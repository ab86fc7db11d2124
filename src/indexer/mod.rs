/// Indexing pipeline: walk, chunk, extract, embed, persist, build graph.
///
/// Per-file failures are recorded in the error log and the run continues;
/// the only fatal condition is a missing root path. Runs for the same
/// repository are serialized behind a per-repo lock so concurrent requests
/// cannot interleave partial writes.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::cache::{content_key, CacheStatsReport, TieredCache};
use crate::chunker::{ChunkError, ChunkKind, CodeChunker, SourceChunk};
use crate::config::Config;
use crate::embedder::{DualEmbedder, EmbedderError, EmbeddingDomain};
use crate::extract::{CallFilter, ExtractError, ExtractorSet};
use crate::graph::{GraphBuilder, GraphIndex};
use crate::language::{is_excluded, Language};
use crate::search::{HybridSearch, SearchError, SearchHit, SearchRequest};
use crate::store::chunks::PreparedChunk;
use crate::store::models::{ErrorKind, GraphStats, IndexingErrorRecord};
use crate::store::{blob_to_vector, vector_to_blob, Store, StoreError};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("root path not found: {0}")]
    RootNotFound(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chunker(#[from] ChunkError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub repository: String,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub chunks_created: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub errors_logged: usize,
}

pub struct IndexEngine {
    store: Arc<TokioMutex<Store>>,
    embedder: Arc<DualEmbedder>,
    cache: Arc<TieredCache>,
    chunker: CodeChunker,
    extractors: ExtractorSet,
    call_filter: CallFilter,
    hybrid: HybridSearch,
    repo_locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl IndexEngine {
    pub fn new(
        config: &Config,
        store: Arc<TokioMutex<Store>>,
        embedder: Arc<DualEmbedder>,
        cache: Arc<TieredCache>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            store,
            embedder,
            cache,
            chunker: CodeChunker::new(config.chunking.max_chunk_chars)?,
            extractors: ExtractorSet::new()?,
            call_filter: CallFilter::new(config.call_blacklist.iter().cloned()),
            hybrid: HybridSearch::new(config.search.clone()),
            repo_locks: TokioMutex::new(HashMap::new()),
        })
    }

    async fn repo_lock(&self, repository: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.repo_locks.lock().await;
        Arc::clone(
            locks
                .entry(repository.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(()))),
        )
    }

    /// Index a repository rooted at `root`, optionally restricted to one
    /// language. Unchanged files are skipped via the cache tiers; the graph
    /// is rebuilt when anything changed.
    pub async fn index(
        &self,
        repository: &str,
        root: &Path,
        excluded_dirs: &[String],
        only_language: Option<Language>,
    ) -> Result<IndexReport, IndexError> {
        if !root.is_dir() {
            return Err(IndexError::RootNotFound(root.to_path_buf()));
        }

        let lock = self.repo_lock(repository).await;
        let _guard = lock.lock().await;

        let mut report = IndexReport {
            repository: repository.to_string(),
            ..IndexReport::default()
        };

        let errors_before = {
            let store = self.store.lock().await;
            store.error_count(repository)?
        };

        let mut files = discover_files(root, excluded_dirs);
        if let Some(language) = only_language {
            files.retain(|(_, _, l)| *l == language);
        }
        let present: Vec<String> = files.iter().map(|(rel, _, _)| rel.clone()).collect();
        info!(repository, files = files.len(), "indexing started");

        for (rel_path, abs_path, language) in &files {
            match self
                .index_file(repository, rel_path, abs_path, *language, &mut report)
                .await
            {
                Ok(()) => {}
                Err(IndexError::Store(e)) => return Err(IndexError::Store(e)),
                Err(e) => {
                    // Shouldn't happen: per-file failures are logged inline.
                    warn!(file = rel_path, error = %e, "unexpected per-file failure");
                }
            }
        }

        // A language-restricted run must not treat other languages' files
        // as deleted.
        if only_language.is_none() {
            let mut store = self.store.lock().await;
            report.files_removed = store.remove_missing_files(repository, &present)?;
        }

        if report.files_processed > 0 || report.files_removed > 0 {
            self.rebuild_graph(repository, &mut report).await?;
        }

        {
            let store = self.store.lock().await;
            report.errors_logged = store
                .error_count(repository)?
                .saturating_sub(errors_before);
        }

        info!(
            repository,
            processed = report.files_processed,
            skipped = report.files_skipped,
            chunks = report.chunks_created,
            "indexing finished"
        );
        Ok(report)
    }

    async fn index_file(
        &self,
        repository: &str,
        rel_path: &str,
        abs_path: &Path,
        language: Language,
        report: &mut IndexReport,
    ) -> Result<(), IndexError> {
        let source = match std::fs::read_to_string(abs_path) {
            Ok(source) => source,
            Err(e) => {
                let store = self.store.lock().await;
                store.log_error(
                    repository,
                    rel_path,
                    ErrorKind::ParseError,
                    &format!("unreadable file: {e}"),
                    Some(language.as_str()),
                )?;
                return Ok(());
            }
        };

        let content_hash = blake3::hash(source.as_bytes()).to_hex().to_string();
        let file_key = content_key(&format!("file:{repository}:{rel_path}"), source.as_bytes());

        // Fast path: identical content seen in a cache tier.
        if self.cache.lookup(&file_key).is_some() {
            report.files_skipped += 1;
            return Ok(());
        }

        // Final tier: the durable store's recorded hash.
        {
            let store = self.store.lock().await;
            let unchanged = store.file_hash(repository, rel_path)?.as_deref()
                == Some(content_hash.as_str());
            self.cache.record_durable(unchanged);
            if unchanged {
                self.cache.insert(&file_key, &[1]);
                report.files_skipped += 1;
                return Ok(());
            }
        }

        let chunked = match self
            .chunker
            .chunk_source(repository, rel_path, source, language)
        {
            Ok(chunked) => chunked,
            Err(e) => {
                let kind = match e {
                    ChunkError::Parse(_) => ErrorKind::ParseError,
                    _ => ErrorKind::ChunkingError,
                };
                let store = self.store.lock().await;
                store.log_error(
                    repository,
                    rel_path,
                    kind,
                    &e.to_string(),
                    Some(language.as_str()),
                )?;
                return Ok(());
            }
        };

        // A parsed file with no symbol-level unit is still indexed as a
        // file chunk, with an informational row so symbol-less files are
        // visible in the error summary.
        if chunked
            .chunks
            .iter()
            .all(|c| c.chunk_kind == ChunkKind::File)
            && !chunked.chunks.is_empty()
        {
            let store = self.store.lock().await;
            store.log_error(
                repository,
                rel_path,
                ErrorKind::ChunkingError,
                "no symbol-level units found; indexed as a file-level chunk",
                Some(language.as_str()),
            )?;
        }

        let extractor = match self.extractors.get(language) {
            Some(extractor) => extractor,
            None => return Ok(()),
        };

        // File-wide pass collects top-of-file imports for graph resolution.
        let file_meta = extractor.extract(
            &chunked.source,
            &chunked.tree,
            0..chunked.source.len(),
            &self.call_filter,
        );
        let imports_json = serde_json::to_string(&file_meta.imports).map_err(StoreError::from)?;

        let mut prepared = Vec::with_capacity(chunked.chunks.len());
        for mut chunk in chunked.chunks {
            let fixed = chunk.metadata.fixed_chunking;
            let mut metadata = extractor.extract(
                &chunked.source,
                &chunked.tree,
                chunk.start_byte..chunk.end_byte,
                &self.call_filter,
            );
            metadata.fixed_chunking = fixed;
            chunk.metadata = metadata;

            let (text_vector, code_vector) =
                self.embed_chunk(repository, &chunk, language).await?;
            prepared.push(PreparedChunk {
                chunk,
                text_vector,
                code_vector,
            });
        }

        {
            let mut store = self.store.lock().await;
            store.replace_file_chunks(
                repository,
                rel_path,
                language.as_str(),
                &content_hash,
                &imports_json,
                &prepared,
            )?;
        }

        self.cache.insert(&file_key, &[1]);
        report.files_processed += 1;
        report.chunks_created += prepared.len();
        Ok(())
    }

    /// Both domain vectors for one chunk, read through the embedding cache.
    /// A timeout is logged and leaves the slot empty.
    async fn embed_chunk(
        &self,
        repository: &str,
        chunk: &SourceChunk,
        language: Language,
    ) -> Result<(Option<Vec<f32>>, Option<Vec<f32>>), IndexError> {
        let name = chunk
            .qualified_name
            .as_deref()
            .unwrap_or(chunk.file_path.as_str());
        let doc = chunk.metadata.docstring.as_deref().unwrap_or("");
        let text_input = format!("{} {name}: {doc}\n{}", language.as_str(), chunk.code_text);
        let code_input = chunk.code_text.clone();

        let text = self
            .embed_cached(repository, chunk, EmbeddingDomain::Text, text_input)
            .await?;
        let code = self
            .embed_cached(repository, chunk, EmbeddingDomain::Code, code_input)
            .await?;
        Ok((text, code))
    }

    async fn embed_cached(
        &self,
        repository: &str,
        chunk: &SourceChunk,
        domain: EmbeddingDomain,
        input: String,
    ) -> Result<Option<Vec<f32>>, IndexError> {
        let key = content_key(&format!("emb:{}", domain.as_str()), input.as_bytes());
        if let Some(blob) = self.cache.lookup(&key) {
            if let Ok(vector) = blob_to_vector(&blob) {
                return Ok(Some(vector));
            }
        }

        match self.embedder.embed_domain(domain, input).await {
            Ok(vector) => {
                self.cache.insert(&key, &vector_to_blob(&vector));
                Ok(Some(vector))
            }
            Err(EmbedderError::Timeout(secs)) => {
                let store = self.store.lock().await;
                store.log_error(
                    repository,
                    &chunk.file_path,
                    ErrorKind::EmbeddingTimeout,
                    &format!(
                        "{} embedding for {} exceeded {secs}s",
                        domain.as_str(),
                        chunk.qualified_name.as_deref().unwrap_or("file chunk"),
                    ),
                    Some(chunk.language.as_str()),
                )?;
                Ok(None)
            }
            Err(e) => {
                warn!(file = chunk.file_path, error = %e, "embedding failed, chunk kept without vector");
                Ok(None)
            }
        }
    }

    async fn rebuild_graph(
        &self,
        repository: &str,
        report: &mut IndexReport,
    ) -> Result<(), IndexError> {
        let mut store = self.store.lock().await;
        let files = store.load_files(repository)?;
        let chunks = store.load_chunks(repository)?;

        let build = GraphBuilder::new(repository).build(&files, &chunks);
        store.replace_graph(repository, &build.nodes, &build.edges)?;

        for ambiguity in &build.ambiguities {
            store.log_error(
                repository,
                &ambiguity.file_path,
                ErrorKind::GraphResolutionAmbiguous,
                &format!(
                    "{} matched {} definitions, picked first in path order",
                    ambiguity.name, ambiguity.candidates
                ),
                None,
            )?;
        }

        report.nodes_created = build.nodes.len();
        report.edges_created = build
            .edges
            .iter()
            .filter(|e| e.target_node_id.is_some())
            .count();

        let stats = store.graph_stats(repository)?;
        if stats.low_connectivity {
            warn!(
                repository,
                edge_ratio = stats.edge_ratio,
                "graph connectivity below healthy floor; extraction may be dropping references"
            );
        }
        Ok(())
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, IndexError> {
        let store = self.store.lock().await;
        Ok(self.hybrid.search(&store, &self.embedder, request).await?)
    }

    pub async fn graph_stats(&self, repository: &str) -> Result<GraphStats, IndexError> {
        let store = self.store.lock().await;
        Ok(store.graph_stats(repository)?)
    }

    pub async fn graph_index(&self, repository: &str) -> Result<GraphIndex, IndexError> {
        let store = self.store.lock().await;
        let nodes = store.load_nodes(repository)?;
        let edges = store.load_edges(repository)?;
        Ok(GraphIndex::new(nodes, &edges))
    }

    pub async fn list_errors(
        &self,
        repository: &str,
        error_type: Option<ErrorKind>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IndexingErrorRecord>, IndexError> {
        let store = self.store.lock().await;
        Ok(store.list_errors(repository, error_type, limit, offset)?)
    }

    pub async fn error_summary(
        &self,
        repository: &str,
    ) -> Result<Vec<(String, usize)>, IndexError> {
        let store = self.store.lock().await;
        Ok(store.error_summary(repository)?)
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }
}

/// Walk the tree, honoring ignore files and the artifact exclusion list,
/// returning `(relative_path, absolute_path, language)` per source file.
fn discover_files(root: &Path, excluded_dirs: &[String]) -> Vec<(String, PathBuf, Language)> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root).hidden(false).build();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        if is_excluded(rel, excluded_dirs) {
            continue;
        }
        let Some(language) = Language::from_path(path) else {
            continue;
        };
        let rel_str = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel_str, path.to_path_buf(), language));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}
