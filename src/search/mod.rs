/// Hybrid retrieval: lexical + dual vector signals fused with RRF.
///
/// Vector candidates come from the sqlite-vec tables; a failed or absent
/// query embedding degrades the request to lexical-only, logged, still
/// returning results.
pub mod fusion;
pub mod lexical;

use rusqlite::types::Value;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::config::SearchConfig;
use crate::embedder::{DualEmbedder, EmbeddingDomain};
use crate::store::{vector_to_blob, Store, StoreError};
use fusion::{fuse, FusedHit, RankedList, Signal};
pub use lexical::SearchFilters;

/// Candidates pulled per signal before fusion.
const CANDIDATE_POOL: usize = 50;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub repository: String,
    pub filters: SearchFilters,
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub fused_score: f32,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub qualified_name: Option<String>,
    pub chunk_type: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub snippet: String,
}

pub struct HybridSearch {
    config: SearchConfig,
}

impl HybridSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub async fn search(
        &self,
        store: &Store,
        embedder: &DualEmbedder,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut lists = Vec::new();

        let lexical_ids = lexical::lexical_search(
            store,
            &request.repository,
            &request.query,
            &request.filters,
            CANDIDATE_POOL,
        )?;
        lists.push(RankedList {
            signal: Signal::Lexical,
            weight: self.config.lexical_weight,
            ids: lexical_ids,
        });

        // Query embedding failure is a degradation, not an error: the
        // lexical list alone still produces a ranking.
        match embedder
            .embed_domain(EmbeddingDomain::Text, request.query.clone())
            .await
        {
            Ok(vector) => lists.push(RankedList {
                signal: Signal::VectorText,
                weight: self.config.vector_weight,
                ids: vector_candidates(store, EmbeddingDomain::Text, &vector, request)?,
            }),
            Err(e) => warn!(error = %e, "text query embedding failed, continuing lexical-only"),
        }
        match embedder
            .embed_domain(EmbeddingDomain::Code, request.query.clone())
            .await
        {
            Ok(vector) => lists.push(RankedList {
                signal: Signal::VectorCode,
                weight: self.config.vector_weight,
                ids: vector_candidates(store, EmbeddingDomain::Code, &vector, request)?,
            }),
            Err(e) => warn!(error = %e, "code query embedding failed, continuing lexical-only"),
        }

        let fused = fuse(&lists, self.config.rrf_k);
        let limit = if request.top_k > 0 {
            request.top_k
        } else {
            self.config.top_k
        };
        let top: Vec<FusedHit> = fused.into_iter().take(limit).collect();

        hydrate(store, &top)
    }
}

/// Nearest chunks in one embedding space, filters applied before ranking.
fn vector_candidates(
    store: &Store,
    domain: EmbeddingDomain,
    query_vector: &[f32],
    request: &SearchRequest,
) -> Result<Vec<i64>, SearchError> {
    let table = match domain {
        EmbeddingDomain::Text => "vec_chunks_text",
        EmbeddingDomain::Code => "vec_chunks_code",
    };

    let mut sql = format!(
        "SELECT c.id FROM chunks c JOIN {table} v ON v.rowid = c.id
         WHERE c.repository = ?"
    );
    let mut params: Vec<Value> = vec![Value::Text(request.repository.clone())];

    if let Some(language) = &request.filters.language {
        sql.push_str(" AND c.language = ?");
        params.push(Value::Text(language.clone()));
    }
    if let Some(chunk_type) = &request.filters.chunk_type {
        sql.push_str(" AND c.chunk_type = ?");
        params.push(Value::Text(chunk_type.clone()));
    }
    sql.push_str(" ORDER BY vec_distance_cosine(v.embedding, ?) LIMIT ?");
    params.push(Value::Blob(vector_to_blob(query_vector)));
    params.push(Value::Integer(CANDIDATE_POOL as i64));

    let mut stmt = store.conn.prepare(&sql).map_err(StoreError::from)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| row.get(0))
        .map_err(StoreError::from)?;
    Ok(rows
        .collect::<Result<Vec<i64>, _>>()
        .map_err(StoreError::from)?)
}

fn hydrate(store: &Store, hits: &[FusedHit]) -> Result<Vec<SearchHit>, SearchError> {
    let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
    let records = store.chunks_by_ids(&ids)?;

    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(record) = records.iter().find(|r| r.id == hit.chunk_id) else {
            continue;
        };
        let snippet: String = record.content.lines().take(5).collect::<Vec<_>>().join("\n");
        out.push(SearchHit {
            chunk_id: hit.chunk_id,
            fused_score: hit.score,
            lexical_rank: hit.lexical_rank,
            vector_rank: hit.vector_rank,
            file_path: record.file_path.clone(),
            symbol_name: record.symbol_name.clone(),
            qualified_name: record.qualified_name.clone(),
            chunk_type: record.chunk_type.clone(),
            language: record.language.clone(),
            start_line: record.start_line,
            end_line: record.end_line,
            snippet,
        });
    }
    Ok(out)
}
