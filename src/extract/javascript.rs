/// JavaScript metadata extraction.
///
/// Shares the block-comment docstring convention with TypeScript but has
/// no decorator or interface surface in the supported grammar.
use std::ops::Range;

use tree_sitter::{Query, Tree};

use super::typescript::block_docstring;
use super::{
    collect_calls, collect_imports, collect_named, count_branches, node_at_span, CallFilter,
    ChunkMetadata, ExtractError, MetadataExtractor,
};
use crate::chunker::languages::LanguageSpec;
use crate::language::Language;

pub struct JavaScriptExtractor {
    call_query: Query,
    import_query: Query,
    inherit_query: Query,
    branch_kinds: &'static [&'static str],
}

impl JavaScriptExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let spec = LanguageSpec::get(Language::JavaScript);
        let compile = |src: &str| {
            Query::new(&spec.grammar, src).map_err(|e| ExtractError::Query {
                language: "javascript",
                message: e.to_string(),
            })
        };
        Ok(Self {
            call_query: compile(spec.call_query)?,
            import_query: compile(spec.import_query)?,
            inherit_query: compile(spec.inherit_query)?,
            branch_kinds: spec.branch_kinds,
        })
    }
}

impl MetadataExtractor for JavaScriptExtractor {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn extract(
        &self,
        source: &str,
        tree: &Tree,
        span: Range<usize>,
        filter: &CallFilter,
    ) -> ChunkMetadata {
        let node = node_at_span(tree, &span);

        ChunkMetadata {
            calls: collect_calls(&self.call_query, tree, source, span.clone(), filter),
            imports: collect_imports(&self.import_query, tree, source, span.clone()),
            inherits: collect_named(&self.inherit_query, tree, source, span.clone(), "inherit"),
            decorators: Vec::new(),
            complexity: count_branches(tree, &span, self.branch_kinds),
            docstring: block_docstring(node, source),
            fixed_chunking: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::CodeChunker;

    #[test]
    fn test_docstring_inherits_calls() {
        let source = r#"
/** Streams rows to the client. */
class RowStream extends Readable {
    push(row) {
        this.encode(row);
    }
}
"#;
        let chunker = CodeChunker::new(2000).unwrap();
        let file = chunker
            .chunk_source("repo", "stream.js", source.to_string(), Language::JavaScript)
            .unwrap();
        let chunk = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("RowStream"))
            .expect("class chunk");

        let extractor = JavaScriptExtractor::new().unwrap();
        let meta = extractor.extract(
            &file.source,
            &file.tree,
            chunk.start_byte..chunk.end_byte,
            &CallFilter::default(),
        );

        assert_eq!(meta.docstring.as_deref(), Some("Streams rows to the client."));
        assert_eq!(meta.inherits, vec!["Readable"]);
        assert!(meta.calls.contains(&"encode".to_string()));
    }

    #[test]
    fn test_arrow_function_complexity() {
        let source = r#"
const pick = (items, wanted) => {
    if (!items) {
        return [];
    }
    return items.filter((i) => wanted.includes(i));
};
"#;
        let chunker = CodeChunker::new(2000).unwrap();
        let file = chunker
            .chunk_source("repo", "pick.js", source.to_string(), Language::JavaScript)
            .unwrap();
        let chunk = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("pick"))
            .expect("arrow chunk");

        let extractor = JavaScriptExtractor::new().unwrap();
        let meta = extractor.extract(
            &file.source,
            &file.tree,
            chunk.start_byte..chunk.end_byte,
            &CallFilter::default(),
        );
        assert_eq!(meta.complexity, 2);
        assert!(meta.calls.contains(&"filter".to_string()));
        assert!(meta.calls.contains(&"includes".to_string()));
    }
}
