/// Lexical candidate retrieval.
///
/// A LIKE-based prefilter narrows candidates in SQL, then term-overlap
/// scoring ranks them in Rust with a bonus for symbol-name matches.
/// Filters are applied in the WHERE clause, before any ranking.
use std::collections::HashSet;

use rusqlite::types::Value;

use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub language: Option<String>,
    pub chunk_type: Option<String>,
}

/// Query terms: lowercased alphanumeric/underscore runs of length >= 2,
/// deduplicated so a repeated term cannot inflate a chunk's score.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .filter(|t| seen.insert(t.to_string()))
        .map(|t| t.to_string())
        .collect()
}

/// Ranked chunk ids for a lexical query, best first.
pub fn lexical_search(
    store: &Store,
    repository: &str,
    query: &str,
    filters: &SearchFilters,
    limit: usize,
) -> Result<Vec<i64>, StoreError> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT id, LOWER(content), LOWER(COALESCE(symbol_name, '')), LOWER(COALESCE(qualified_name, ''))
         FROM chunks WHERE repository = ?",
    );
    let mut params: Vec<Value> = vec![Value::Text(repository.to_string())];

    if let Some(language) = &filters.language {
        sql.push_str(" AND language = ?");
        params.push(Value::Text(language.clone()));
    }
    if let Some(chunk_type) = &filters.chunk_type {
        sql.push_str(" AND chunk_type = ?");
        params.push(Value::Text(chunk_type.clone()));
    }

    // Prefilter: any term present anywhere in the chunk.
    sql.push_str(" AND (");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            sql.push_str(" OR ");
        }
        sql.push_str("LOWER(content) LIKE ? OR LOWER(COALESCE(symbol_name, '')) LIKE ?");
        let pattern = format!("%{term}%");
        params.push(Value::Text(pattern.clone()));
        params.push(Value::Text(pattern));
    }
    sql.push(')');

    let mut stmt = store.conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut scored: Vec<(i64, usize)> = Vec::new();
    for row in rows {
        let (id, content, symbol, qualified) = row?;
        let mut score = 0usize;
        for term in &terms {
            if content.contains(term.as_str()) {
                score += 1;
            }
            // A term hitting the symbol name is a far stronger signal
            // than a body mention.
            if symbol.contains(term.as_str()) || qualified.contains(term.as_str()) {
                score += 2;
            }
        }
        if score > 0 {
            scored.push((id, score));
        }
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(limit);
    Ok(scored.into_iter().map(|(id, _)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkKind, SourceChunk};
    use crate::extract::ChunkMetadata;
    use crate::language::Language;
    use crate::store::chunks::PreparedChunk;

    fn seed(store: &mut Store, path: &str, name: &str, body: &str) {
        let code = format!("def {name}():\n    {body}\n");
        let chunk = SourceChunk {
            repository: "repo".to_string(),
            file_path: path.to_string(),
            chunk_kind: ChunkKind::Function,
            language: Language::Python,
            symbol_name: Some(name.to_string()),
            qualified_name: Some(name.to_string()),
            parent_symbol: None,
            start_line: 1,
            end_line: 2,
            start_byte: 0,
            end_byte: code.len(),
            code_text: code,
            metadata: ChunkMetadata::default(),
        };
        store
            .replace_file_chunks(
                "repo",
                path,
                "python",
                &format!("hash-{path}"),
                "[]",
                &[PreparedChunk {
                    chunk,
                    text_vector: None,
                    code_vector: None,
                }],
            )
            .unwrap();
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("parse JSON config!"),
            vec!["parse", "json", "config"]
        );
        assert_eq!(query_terms("a b"), Vec::<String>::new());
        assert_eq!(query_terms("load_config"), vec!["load_config"]);
    }

    #[test]
    fn test_repeated_terms_deduplicated() {
        assert_eq!(
            query_terms("config parse config"),
            vec!["config", "parse"],
            "non-adjacent repeats collapse, order preserved"
        );
    }

    #[test]
    fn test_repeated_term_does_not_double_count() {
        let mut store = Store::open_in_memory(8).unwrap();
        // Seeded first, so it also wins the id tiebreak on equal scores.
        seed(&mut store, "a.py", "load_config", "return 1");
        seed(&mut store, "b.py", "parse_records", "return records");

        let ids = lexical_search(
            &store,
            "repo",
            "config parse config records",
            &SearchFilters::default(),
            10,
        )
        .unwrap();
        assert_eq!(ids.len(), 2);

        let top = store.chunks_by_ids(&ids[..1]).unwrap();
        assert_eq!(
            top[0].symbol_name.as_deref(),
            Some("parse_records"),
            "two distinct term hits beat one term repeated twice"
        );
    }

    #[test]
    fn test_symbol_match_outranks_body_match() {
        let mut store = Store::open_in_memory(8).unwrap();
        seed(&mut store, "a.py", "parse_json_config", "return read()");
        seed(&mut store, "b.py", "helper", "data = parse(json_config)");

        let ids = lexical_search(
            &store,
            "repo",
            "parse json config",
            &SearchFilters::default(),
            10,
        )
        .unwrap();
        assert_eq!(ids.len(), 2);

        let top = store.chunks_by_ids(&ids[..1]).unwrap();
        assert_eq!(
            top[0].symbol_name.as_deref(),
            Some("parse_json_config"),
            "symbol-name hit ranks first"
        );
    }

    #[test]
    fn test_filters_applied_before_ranking() {
        let mut store = Store::open_in_memory(8).unwrap();
        seed(&mut store, "a.py", "render_page", "return html");

        let filters = SearchFilters {
            language: Some("rust".to_string()),
            chunk_type: None,
        };
        let ids = lexical_search(&store, "repo", "render page", &filters, 10).unwrap();
        assert!(ids.is_empty(), "language filter excludes python chunks");
    }

    #[test]
    fn test_no_terms_no_results() {
        let store = Store::open_in_memory(8).unwrap();
        let ids =
            lexical_search(&store, "repo", "! ?", &SearchFilters::default(), 10).unwrap();
        assert!(ids.is_empty());
    }
}
