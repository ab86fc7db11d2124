/// Rust metadata extraction.
///
/// Doc comments are `///` line comments preceding the item, possibly with
/// attribute items between them and the definition. Attributes themselves
/// are reported as decorators.
use std::ops::Range;

use tree_sitter::{Query, Tree};

use super::{
    collect_calls, collect_imports, count_branches, node_at_span, CallFilter, ChunkMetadata,
    ExtractError, MetadataExtractor,
};
use crate::chunker::languages::LanguageSpec;
use crate::language::Language;

pub struct RustExtractor {
    call_query: Query,
    import_query: Query,
    branch_kinds: &'static [&'static str],
}

impl RustExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let spec = LanguageSpec::get(Language::Rust);
        let compile = |src: &str| {
            Query::new(&spec.grammar, src).map_err(|e| ExtractError::Query {
                language: "rust",
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

impl MetadataExtractor for RustExtractor {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extract(
        &self,
        source: &str,
        tree: &Tree,
        span: Range<usize>,
        filter: &CallFilter,
    ) -> ChunkMetadata {
        let node = node_at_span(tree, &span);

        let mut doc_lines = Vec::new();
        let mut decorators = Vec::new();
        let mut prev = node.prev_named_sibling();
        while let Some(sibling) = prev {
            match sibling.kind() {
                "attribute_item" => {
                    if let Ok(text) = sibling.utf8_text(source.as_bytes()) {
                        let attr = text
                            .trim()
                            .trim_start_matches("#[")
                            .trim_end_matches(']')
                            .to_string();
                        decorators.push(attr);
                    }
                }
                "line_comment" => {
                    let Ok(text) = sibling.utf8_text(source.as_bytes()) else {
                        break;
                    };
                    let trimmed = text.trim();
                    if let Some(doc) = trimmed.strip_prefix("///") {
                        doc_lines.push(doc.trim().to_string());
                    } else {
                        break;
                    }
                }
                _ => break,
            }
            prev = sibling.prev_named_sibling();
        }
        doc_lines.reverse();
        decorators.reverse();

        let docstring = if doc_lines.is_empty() {
            None
        } else {
            Some(doc_lines.join("\n"))
        };

        ChunkMetadata {
            calls: collect_calls(&self.call_query, tree, source, span.clone(), filter),
            imports: collect_imports(&self.import_query, tree, source, span.clone()),
            inherits: Vec::new(),
            decorators,
            complexity: count_branches(tree, &span, self.branch_kinds),
            docstring,
            fixed_chunking: false,
        }
    }
}
