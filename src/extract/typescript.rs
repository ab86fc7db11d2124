/// TypeScript metadata extraction.
///
/// Docstrings come from `/** … */` block comments preceding the
/// declaration. Class decorators are children of the declaration itself;
/// method decorators are preceding siblings inside the class body.
use std::ops::Range;

use tree_sitter::{Node, Query, Tree};

use super::{
    collect_calls, collect_imports, collect_named, count_branches, node_at_span, CallFilter,
    ChunkMetadata, ExtractError, MetadataExtractor,
};
use crate::chunker::languages::LanguageSpec;
use crate::language::Language;

pub struct TypeScriptExtractor {
    call_query: Query,
    import_query: Query,
    inherit_query: Query,
    branch_kinds: &'static [&'static str],
}

impl TypeScriptExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let spec = LanguageSpec::get(Language::TypeScript);
        let compile = |src: &str| {
            Query::new(&spec.grammar, src).map_err(|e| ExtractError::Query {
                language: "typescript",
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

impl MetadataExtractor for TypeScriptExtractor {
    fn language(&self) -> Language {
        Language::TypeScript
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
            decorators: surrounding_decorators(node, source),
            complexity: count_branches(tree, &span, self.branch_kinds),
            docstring: block_docstring(node, source),
            fixed_chunking: false,
        }
    }
}

/// Decorators attached to a declaration: own `decorator` children (classes)
/// plus preceding `decorator` siblings (class members).
pub(crate) fn surrounding_decorators(node: Node, source: &str) -> Vec<String> {
    let mut decorators = Vec::new();

    let mut prev = node.prev_named_sibling();
    while let Some(sibling) = prev {
        if sibling.kind() != "decorator" {
            break;
        }
        if let Ok(text) = sibling.utf8_text(source.as_bytes()) {
            decorators.push(text.trim().trim_start_matches('@').to_string());
        }
        prev = sibling.prev_named_sibling();
    }
    decorators.reverse();

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "decorator" {
            continue;
        }
        if let Ok(text) = child.utf8_text(source.as_bytes()) {
            decorators.push(text.trim().trim_start_matches('@').to_string());
        }
    }

    decorators
}

/// The `/** … */` comment directly above a declaration, markers stripped.
pub(crate) fn block_docstring(node: Node, source: &str) -> Option<String> {
    // Skip decorator siblings so `/** doc */ @decorator class …` still
    // finds its comment.
    let mut prev = node.prev_named_sibling();
    while let Some(sibling) = prev {
        match sibling.kind() {
            "decorator" => prev = sibling.prev_named_sibling(),
            "comment" => {
                let text = sibling.utf8_text(source.as_bytes()).ok()?;
                if !text.starts_with("/**") {
                    return None;
                }
                let body = text
                    .trim_start_matches("/**")
                    .trim_end_matches("*/")
                    .lines()
                    .map(|l| l.trim().trim_start_matches('*').trim())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                return if body.is_empty() { None } else { Some(body) };
            }
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::CodeChunker;

    fn chunk_and_extract(source: &str, symbol: &str) -> ChunkMetadata {
        let chunker = CodeChunker::new(2000).unwrap();
        let file = chunker
            .chunk_source("repo", "app.ts", source.to_string(), Language::TypeScript)
            .unwrap();
        let chunk = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some(symbol))
            .expect("chunk present");
        let extractor = TypeScriptExtractor::new().unwrap();
        extractor.extract(
            &file.source,
            &file.tree,
            chunk.start_byte..chunk.end_byte,
            &CallFilter::default(),
        )
    }

    #[test]
    fn test_docstring_and_calls() {
        let source = r#"
/**
 * Resolves the active session for a request.
 */
function resolveSession(req: Request): Session {
    const token = parseToken(req);
    return lookupSession(token);
}
"#;
        let meta = chunk_and_extract(source, "resolveSession");
        assert_eq!(
            meta.docstring.as_deref(),
            Some("Resolves the active session for a request.")
        );
        assert_eq!(meta.calls, vec!["parseToken", "lookupSession"]);
    }

    #[test]
    fn test_inherits_and_implements() {
        let source = r#"
class AdminView extends BaseView {
    render(): void {
        this.draw();
    }
}
"#;
        let meta = chunk_and_extract(source, "AdminView");
        assert_eq!(meta.inherits, vec!["BaseView"]);
    }

    #[test]
    fn test_named_import_bindings() {
        let chunker = CodeChunker::new(2000).unwrap();
        let source = "import { fetchUser } from './api/users';\n\nfunction load(id: string) {\n    return fetchUser(id);\n}\n";
        let file = chunker
            .chunk_source("repo", "load.ts", source.to_string(), Language::TypeScript)
            .unwrap();
        let extractor = TypeScriptExtractor::new().unwrap();
        let meta = extractor.extract(
            &file.source,
            &file.tree,
            0..file.source.len(),
            &CallFilter::default(),
        );
        assert!(meta
            .imports
            .iter()
            .any(|i| i.name == "fetchUser" && i.module == "./api/users"));
    }
}
