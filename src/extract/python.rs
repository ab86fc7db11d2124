/// Python metadata extraction.
///
/// Docstrings are the first statement of the body when it is a bare string
/// expression; decorators live on the wrapping `decorated_definition` node,
/// outside the definition's own span, so they are read from the parent
/// rather than queried within the chunk range.
use std::ops::Range;

use tree_sitter::{Query, Tree};

use super::{
    collect_calls, collect_imports, collect_named, count_branches, node_at_span, CallFilter,
    ChunkMetadata, ExtractError, MetadataExtractor,
};
use crate::chunker::languages::LanguageSpec;
use crate::language::Language;

pub struct PythonExtractor {
    call_query: Query,
    import_query: Query,
    inherit_query: Query,
    branch_kinds: &'static [&'static str],
}

impl PythonExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let spec = LanguageSpec::get(Language::Python);
        let compile = |src: &str| {
            Query::new(&spec.grammar, src).map_err(|e| ExtractError::Query {
                language: "python",
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

impl MetadataExtractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract(
        &self,
        source: &str,
        tree: &Tree,
        span: Range<usize>,
        filter: &CallFilter,
    ) -> ChunkMetadata {
        let node = node_at_span(tree, &span);

        let mut decorators = Vec::new();
        if let Some(parent) = node.parent() {
            if parent.kind() == "decorated_definition" {
                let mut cursor = parent.walk();
                for child in parent.named_children(&mut cursor) {
                    if child.kind() != "decorator" {
                        continue;
                    }
                    if let Ok(text) = child.utf8_text(source.as_bytes()) {
                        decorators.push(text.trim().trim_start_matches('@').to_string());
                    }
                }
            }
        }

        let docstring = {
            let def = if node.kind() == "decorated_definition" {
                node.child_by_field_name("definition").unwrap_or(node)
            } else {
                node
            };
            def.child_by_field_name("body")
                .and_then(|body| body.named_child(0))
                .filter(|stmt| stmt.kind() == "expression_statement")
                .and_then(|stmt| stmt.named_child(0))
                .filter(|expr| expr.kind() == "string")
                .and_then(|s| s.utf8_text(source.as_bytes()).ok())
                .map(strip_string_quotes)
                .filter(|d| !d.is_empty())
        };

        ChunkMetadata {
            calls: collect_calls(&self.call_query, tree, source, span.clone(), filter),
            imports: collect_imports(&self.import_query, tree, source, span.clone()),
            inherits: collect_named(&self.inherit_query, tree, source, span.clone(), "inherit"),
            decorators,
            complexity: count_branches(tree, &span, self.branch_kinds),
            docstring,
            fixed_chunking: false,
        }
    }
}

fn strip_string_quotes(text: &str) -> String {
    let t = text.trim();
    let t = t
        .trim_start_matches(|c| c == 'r' || c == 'b' || c == 'f' || c == 'u' || c == 'R');
    let stripped = if let Some(inner) = t.strip_prefix("\"\"\"") {
        inner.strip_suffix("\"\"\"").unwrap_or(inner)
    } else if let Some(inner) = t.strip_prefix("'''") {
        inner.strip_suffix("'''").unwrap_or(inner)
    } else if let Some(inner) = t.strip_prefix('"') {
        inner.strip_suffix('"').unwrap_or(inner)
    } else if let Some(inner) = t.strip_prefix('\'') {
        inner.strip_suffix('\'').unwrap_or(inner)
    } else {
        t
    };
    stripped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::CodeChunker;

    fn extract_first(source: &str) -> ChunkMetadata {
        let chunker = CodeChunker::new(2000).unwrap();
        let file = chunker
            .chunk_source("repo", "m.py", source.to_string(), Language::Python)
            .unwrap();
        let extractor = PythonExtractor::new().unwrap();
        let chunk = &file.chunks[0];
        extractor.extract(
            &file.source,
            &file.tree,
            chunk.start_byte..chunk.end_byte,
            &CallFilter::default(),
        )
    }

    #[test]
    fn test_docstring_and_calls() {
        let meta = extract_first(
            r#"
def process(items):
    """Normalize and dispatch items."""
    cleaned = normalize(items)
    return dispatch(cleaned)
"#,
        );
        assert_eq!(meta.docstring.as_deref(), Some("Normalize and dispatch items."));
        assert_eq!(meta.calls, vec!["normalize", "dispatch"]);
        assert_eq!(meta.complexity, 1);
    }

    #[test]
    fn test_decorators_outside_span() {
        let meta = extract_first(
            r#"
@app.route("/users")
@cached
def list_users():
    return fetch_all()
"#,
        );
        assert_eq!(meta.decorators, vec!["app.route(\"/users\")", "cached"]);
        assert_eq!(meta.calls, vec!["fetch_all"]);
    }

    #[test]
    fn test_inherits_and_complexity() {
        let meta = extract_first(
            r#"
class Worker(Base):
    def run(self, jobs):
        for job in jobs:
            if job.ready:
                self.execute(job)
"#,
        );
        assert_eq!(meta.inherits, vec!["Base"]);
        // for + if on top of the base path
        assert_eq!(meta.complexity, 3);
    }

    #[test]
    fn test_from_import_binding() {
        let chunker = CodeChunker::new(2000).unwrap();
        let source = "from billing import charge_card\n\ndef pay(c):\n    return charge_card(c)\n";
        let file = chunker
            .chunk_source("repo", "m.py", source.to_string(), Language::Python)
            .unwrap();
        let extractor = PythonExtractor::new().unwrap();
        // file-wide span picks up top-of-file imports
        let meta = extractor.extract(&file.source, &file.tree, 0..file.source.len(), &CallFilter::default());
        assert_eq!(meta.imports.len(), 1);
        assert_eq!(meta.imports[0].name, "charge_card");
        assert_eq!(meta.imports[0].module, "billing");
    }

    #[test]
    fn test_call_filter_applied() {
        let chunker = CodeChunker::new(2000).unwrap();
        let source = "def show(x):\n    print(x)\n    return render(x)\n";
        let file = chunker
            .chunk_source("repo", "m.py", source.to_string(), Language::Python)
            .unwrap();
        let extractor = PythonExtractor::new().unwrap();
        let chunk = &file.chunks[0];
        let filter = CallFilter::new(["print"]);
        let meta = extractor.extract(
            &file.source,
            &file.tree,
            chunk.start_byte..chunk.end_byte,
            &filter,
        );
        assert_eq!(meta.calls, vec!["render"]);
    }
}
