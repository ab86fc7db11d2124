/// Append-only indexing error log.
///
/// Recoverable per-file failures are recorded here instead of aborting the
/// run; rows are never updated or deleted by the pipeline.
use rusqlite::params;

use super::models::{ErrorKind, IndexingErrorRecord};
use super::{Store, StoreError};

impl Store {
    pub fn log_error(
        &self,
        repository: &str,
        file_path: &str,
        kind: ErrorKind,
        message: &str,
        language: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO indexing_errors (repository, file_path, error_type, message, language)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![repository, file_path, kind.as_str(), message, language],
        )?;
        Ok(())
    }

    /// Page through logged errors, optionally filtered by type.
    pub fn list_errors(
        &self,
        repository: &str,
        error_type: Option<ErrorKind>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IndexingErrorRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT id, repository, file_path, error_type, message, language, created_at
             FROM indexing_errors WHERE repository = ?1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(repository.to_string())];

        if let Some(kind) = error_type {
            sql.push_str(" AND error_type = ?2");
            params_vec.push(Box::new(kind.as_str().to_string()));
        }
        sql.push_str(&format!(
            " ORDER BY id DESC LIMIT {limit} OFFSET {offset}"
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |row| {
                Ok(IndexingErrorRecord {
                    id: row.get(0)?,
                    repository: row.get(1)?,
                    file_path: row.get(2)?,
                    error_type: row.get(3)?,
                    message: row.get(4)?,
                    language: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Error counts per type for one repository.
    pub fn error_summary(&self, repository: &str) -> Result<Vec<(String, usize)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT error_type, COUNT(*) FROM indexing_errors
             WHERE repository = ?1 GROUP BY error_type ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map(params![repository], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn error_count(&self, repository: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM indexing_errors WHERE repository = ?1",
            params![repository],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_append_only() {
        let store = Store::open_in_memory(8).unwrap();
        store
            .log_error("repo", "bad.py", ErrorKind::ParseError, "syntax error", Some("python"))
            .unwrap();
        store
            .log_error("repo", "bad.py", ErrorKind::ParseError, "syntax error", Some("python"))
            .unwrap();

        // Same failure twice produces two rows.
        assert_eq!(store.error_count("repo").unwrap(), 2);
    }

    #[test]
    fn test_list_errors_filter_and_paging() {
        let store = Store::open_in_memory(8).unwrap();
        for i in 0..5 {
            store
                .log_error(
                    "repo",
                    &format!("f{i}.py"),
                    ErrorKind::EmbeddingTimeout,
                    "deadline elapsed",
                    Some("python"),
                )
                .unwrap();
        }
        store
            .log_error("repo", "g.py", ErrorKind::ParseError, "bad", Some("python"))
            .unwrap();

        let timeouts = store
            .list_errors("repo", Some(ErrorKind::EmbeddingTimeout), 3, 0)
            .unwrap();
        assert_eq!(timeouts.len(), 3);
        assert!(timeouts.iter().all(|e| e.error_type == "embedding_timeout"));

        let next_page = store
            .list_errors("repo", Some(ErrorKind::EmbeddingTimeout), 3, 3)
            .unwrap();
        assert_eq!(next_page.len(), 2);

        let all = store.list_errors("repo", None, 100, 0).unwrap();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_error_summary() {
        let store = Store::open_in_memory(8).unwrap();
        store
            .log_error("repo", "a.py", ErrorKind::ParseError, "bad", None)
            .unwrap();
        store
            .log_error("repo", "b.py", ErrorKind::ParseError, "bad", None)
            .unwrap();
        store
            .log_error("repo", "c.py", ErrorKind::EmbeddingTimeout, "slow", None)
            .unwrap();

        let summary = store.error_summary("repo").unwrap();
        assert_eq!(summary[0], ("parse_error".to_string(), 2));
        assert_eq!(summary[1], ("embedding_timeout".to_string(), 1));
    }
}
