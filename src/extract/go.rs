/// Go metadata extraction.
///
/// Doc comments are the contiguous `//` comment block directly above the
/// declaration. Import paths arrive quoted; the binding name is the last
/// path segment unless the import declares an alias.
use std::ops::Range;

use tree_sitter::{Query, Tree};

use super::{
    collect_calls, collect_imports, count_branches, leading_comments, node_at_span, CallFilter,
    ChunkMetadata, ExtractError, MetadataExtractor,
};
use crate::chunker::languages::LanguageSpec;
use crate::language::Language;

pub struct GoExtractor {
    call_query: Query,
    import_query: Query,
    branch_kinds: &'static [&'static str],
}

impl GoExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let spec = LanguageSpec::get(Language::Go);
        let compile = |src: &str| {
            Query::new(&spec.grammar, src).map_err(|e| ExtractError::Query {
                language: "go",
                message: e.to_string(),
            })
        };
        Ok(Self {
            call_query: compile(spec.call_query)?,
            import_query: compile(spec.import_query)?,
            branch_kinds: spec.branch_kinds,
        })
    }
}

impl MetadataExtractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    fn extract(
        &self,
        source: &str,
        tree: &Tree,
        span: Range<usize>,
        filter: &CallFilter,
    ) -> ChunkMetadata {
        let node = node_at_span(tree, &span);

        let doc_lines: Vec<String> = leading_comments(node, source, "comment")
            .iter()
            .map(|c| c.trim().trim_start_matches("//").trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        let docstring = if doc_lines.is_empty() {
            None
        } else {
            Some(doc_lines.join("\n"))
        };

        ChunkMetadata {
            calls: collect_calls(&self.call_query, tree, source, span.clone(), filter),
            imports: collect_imports(&self.import_query, tree, source, span.clone()),
            inherits: Vec::new(),
            decorators: Vec::new(),
            complexity: count_branches(tree, &span, self.branch_kinds),
            docstring,
            fixed_chunking: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::CodeChunker;

    #[test]
    fn test_doc_comment_and_calls() {
        let source = r#"
package payments

// Charge validates the card and posts the transaction.
// It returns the settlement id.
func Charge(card Card) (string, error) {
	if err := validateCard(card); err != nil {
		return "", err
	}
	return postTransaction(card)
}
"#;
        let chunker = CodeChunker::new(2000).unwrap();
        let file = chunker
            .chunk_source("repo", "charge.go", source.to_string(), Language::Go)
            .unwrap();
        let chunk = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("Charge"))
            .expect("chunk present");

        let extractor = GoExtractor::new().unwrap();
        let meta = extractor.extract(
            &file.source,
            &file.tree,
            chunk.start_byte..chunk.end_byte,
            &CallFilter::default(),
        );

        assert_eq!(
            meta.docstring.as_deref(),
            Some("Charge validates the card and posts the transaction.\nIt returns the settlement id.")
        );
        assert!(meta.calls.contains(&"validateCard".to_string()));
        assert!(meta.calls.contains(&"postTransaction".to_string()));
        assert_eq!(meta.complexity, 2);
    }

    #[test]
    fn test_import_paths() {
        let source = r#"
package payments

import (
	"fmt"
	"net/http"
)

func Ping() {
	fmt.Println("ok")
}
"#;
        let chunker = CodeChunker::new(2000).unwrap();
        let file = chunker
            .chunk_source("repo", "ping.go", source.to_string(), Language::Go)
            .unwrap();
        let extractor = GoExtractor::new().unwrap();
        let meta = extractor.extract(
            &file.source,
            &file.tree,
            0..file.source.len(),
            &CallFilter::default(),
        );

        let modules: Vec<&str> = meta.imports.iter().map(|i| i.module.as_str()).collect();
        assert!(modules.contains(&"fmt"));
        assert!(modules.contains(&"net/http"));
        let http = meta.imports.iter().find(|i| i.module == "net/http").unwrap();
        assert_eq!(http.name, "http");
    }
}
