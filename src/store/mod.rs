/// Durable store: SQLite with the sqlite-vec extension.
///
/// One database holds files, chunks, the two vector tables (TEXT and CODE
/// spaces), graph nodes/edges, and the append-only indexing error log.
/// Writes for a file happen in a single transaction: the previous rows are
/// replaced wholesale so re-indexing is idempotent.
pub mod chunks;
pub mod errors;
pub mod graph;
pub mod models;

use std::path::Path;
use std::sync::Once;

use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("malformed vector blob: {0} bytes")]
    MalformedVector(usize),
}

static VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository TEXT NOT NULL,
    path TEXT NOT NULL,
    language TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    imports TEXT NOT NULL DEFAULT '[]',
    indexed_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(repository, path)
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    repository TEXT NOT NULL,
    file_path TEXT NOT NULL,
    chunk_type TEXT NOT NULL,
    language TEXT NOT NULL,
    symbol_name TEXT,
    qualified_name TEXT,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(repository, file_path, start_byte, end_byte)
);

CREATE INDEX IF NOT EXISTS idx_chunks_repo ON chunks(repository);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id TEXT NOT NULL UNIQUE,
    repository TEXT NOT NULL,
    node_type TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_nodes_repo ON nodes(repository);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository TEXT NOT NULL,
    source_node_id TEXT NOT NULL,
    target_node_id TEXT,
    relation_type TEXT NOT NULL,
    target_name TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    UNIQUE(repository, source_node_id, relation_type, target_name)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_node_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_node_id);

CREATE TABLE IF NOT EXISTS indexing_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository TEXT NOT NULL,
    file_path TEXT NOT NULL,
    error_type TEXT NOT NULL,
    message TEXT NOT NULL,
    language TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_errors_repo ON indexing_errors(repository);
"#;

/// Owns the SQLite connection. Callers serialize access behind a mutex.
pub struct Store {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Store {
    /// Open (or create) the database at `path` with vector tables sized
    /// for `dimensions`.
    pub fn open(path: &Path, dimensions: usize) -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open(path)?;
        let store = Self { conn, dimensions };
        store.init_schema()?;
        info!(path = %path.display(), dimensions, "store opened");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory(dimensions: usize) -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, dimensions };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA_SQL)?;
        // vec0 virtual tables cannot be parameterized, so the dimension is
        // baked into the DDL.
        let vec_sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks_text USING vec0(embedding FLOAT[{dims}]);
             CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks_code USING vec0(embedding FLOAT[{dims}]);",
            dims = self.dimensions
        );
        self.conn.execute_batch(&vec_sql)?;
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Serialize an embedding for a vec0 column.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(vector).to_vec()
}

/// Deserialize a vec0 blob. Copies byte-by-byte: the blob is not
/// guaranteed to be f32-aligned.
pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::MalformedVector(blob.len()));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory(8).unwrap();
        assert_eq!(store.dimensions(), 8);
    }

    #[test]
    fn test_vector_blob_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75, 0.0];
        let blob = vector_to_blob(&v);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_vector(&blob).unwrap(), v);
    }

    #[test]
    fn test_malformed_blob_rejected() {
        assert!(blob_to_vector(&[1, 2, 3]).is_err());
    }
}
