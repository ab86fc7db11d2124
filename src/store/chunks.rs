/// File and chunk persistence.
///
/// Re-indexing a file replaces its rows wholesale inside one transaction:
/// delete the vector rows, delete the chunks, insert the new set. Running
/// the same content twice leaves the database in the same state.
use rusqlite::{params, OptionalExtension, Row};

use super::models::{ChunkRecord, FileEntry};
use super::{vector_to_blob, Store, StoreError};
use crate::chunker::SourceChunk;

/// A chunk ready for persistence: the source unit plus whichever domain
/// vectors were produced. A `None` vector means embedding failed or timed
/// out; the chunk is still stored and remains lexically searchable.
pub struct PreparedChunk {
    pub chunk: SourceChunk,
    pub text_vector: Option<Vec<f32>>,
    pub code_vector: Option<Vec<f32>>,
}

impl Store {
    /// Replace all rows for one file. Returns the new chunk row ids.
    pub fn replace_file_chunks(
        &mut self,
        repository: &str,
        path: &str,
        language: &str,
        content_hash: &str,
        imports_json: &str,
        prepared: &[PreparedChunk],
    ) -> Result<Vec<i64>, StoreError> {
        let tx = self.conn.transaction()?;

        let file_id: i64 = tx.query_row(
            "INSERT INTO files (repository, path, language, content_hash, imports, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(repository, path) DO UPDATE SET
                 language = excluded.language,
                 content_hash = excluded.content_hash,
                 imports = excluded.imports,
                 indexed_at = datetime('now')
             RETURNING id",
            params![repository, path, language, content_hash, imports_json],
            |row| row.get(0),
        )?;

        // Vector rows share rowids with chunks; clear them first.
        tx.execute(
            "DELETE FROM vec_chunks_text WHERE rowid IN (SELECT id FROM chunks WHERE file_id = ?1)",
            params![file_id],
        )?;
        tx.execute(
            "DELETE FROM vec_chunks_code WHERE rowid IN (SELECT id FROM chunks WHERE file_id = ?1)",
            params![file_id],
        )?;
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;

        let mut ids = Vec::with_capacity(prepared.len());
        for item in prepared {
            let c = &item.chunk;
            let metadata = serde_json::to_string(&c.metadata)?;
            let chunk_hash = blake3::hash(c.code_text.as_bytes()).to_hex().to_string();

            tx.execute(
                "INSERT INTO chunks (file_id, repository, file_path, chunk_type, language,
                                     symbol_name, qualified_name, start_line, end_line,
                                     start_byte, end_byte, content, content_hash, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    file_id,
                    c.repository,
                    c.file_path,
                    c.chunk_kind.as_str(),
                    c.language.as_str(),
                    c.symbol_name,
                    c.qualified_name,
                    c.start_line as i64,
                    c.end_line as i64,
                    c.start_byte as i64,
                    c.end_byte as i64,
                    c.code_text,
                    chunk_hash,
                    metadata,
                ],
            )?;
            let chunk_id = tx.last_insert_rowid();

            if let Some(vector) = &item.text_vector {
                tx.execute(
                    "INSERT INTO vec_chunks_text (rowid, embedding) VALUES (?1, ?2)",
                    params![chunk_id, vector_to_blob(vector)],
                )?;
            }
            if let Some(vector) = &item.code_vector {
                tx.execute(
                    "INSERT INTO vec_chunks_code (rowid, embedding) VALUES (?1, ?2)",
                    params![chunk_id, vector_to_blob(vector)],
                )?;
            }
            ids.push(chunk_id);
        }

        tx.commit()?;
        Ok(ids)
    }

    /// Stored content hash for a file, if it was indexed before.
    pub fn file_hash(&self, repository: &str, path: &str) -> Result<Option<String>, StoreError> {
        let hash = self
            .conn
            .query_row(
                "SELECT content_hash FROM files WHERE repository = ?1 AND path = ?2",
                params![repository, path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn load_files(&self, repository: &str) -> Result<Vec<FileEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, repository, path, language, content_hash, imports
             FROM files WHERE repository = ?1 ORDER BY path",
        )?;
        let rows = stmt.query_map(params![repository], |row| {
            Ok(FileEntry {
                id: row.get(0)?,
                repository: row.get(1)?,
                path: row.get(2)?,
                language: row.get(3)?,
                content_hash: row.get(4)?,
                imports: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn load_chunks(&self, repository: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, repository, file_path, chunk_type, language, symbol_name,
                    qualified_name, start_line, end_line, start_byte, end_byte,
                    content, metadata
             FROM chunks WHERE repository = ?1 ORDER BY file_path, start_byte",
        )?;
        let rows = stmt.query_map(params![repository], map_chunk_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<ChunkRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, repository, file_path, chunk_type, language, symbol_name,
                    qualified_name, start_line, end_line, start_byte, end_byte,
                    content, metadata
             FROM chunks WHERE id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), map_chunk_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Drop files no longer present on disk, cascading to their chunks.
    pub fn remove_missing_files(
        &mut self,
        repository: &str,
        present: &[String],
    ) -> Result<usize, StoreError> {
        let stored = self.load_files(repository)?;
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        for entry in stored {
            if present.contains(&entry.path) {
                continue;
            }
            tx.execute(
                "DELETE FROM vec_chunks_text WHERE rowid IN
                     (SELECT id FROM chunks WHERE file_id = ?1)",
                params![entry.id],
            )?;
            tx.execute(
                "DELETE FROM vec_chunks_code WHERE rowid IN
                     (SELECT id FROM chunks WHERE file_id = ?1)",
                params![entry.id],
            )?;
            tx.execute("DELETE FROM files WHERE id = ?1", params![entry.id])?;
            removed += 1;
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn map_chunk_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let metadata_json: String = row.get(12)?;
    Ok(ChunkRecord {
        id: row.get(0)?,
        repository: row.get(1)?,
        file_path: row.get(2)?,
        chunk_type: row.get(3)?,
        language: row.get(4)?,
        symbol_name: row.get(5)?,
        qualified_name: row.get(6)?,
        start_line: row.get::<_, i64>(7)? as usize,
        end_line: row.get::<_, i64>(8)? as usize,
        start_byte: row.get::<_, i64>(9)? as usize,
        end_byte: row.get::<_, i64>(10)? as usize,
        content: row.get(11)?,
        // Corrupt metadata degrades to empty rather than failing the scan.
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
    })
}
