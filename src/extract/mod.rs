/// Per-language metadata extraction.
///
/// Each language has its own extractor implementation compiled against its
/// own grammar; node shapes are not interchangeable between parsers, so
/// there is no shared "generic tree" code path. Every extractor receives
/// the entire file's source and the chunk's absolute byte range — never a
/// truncated substring with re-based offsets, which cuts identifiers
/// mid-token and collapses downstream graph connectivity.
mod go;
mod javascript;
mod python;
mod rust_lang;
mod typescript;

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use crate::language::Language;

/// An import statement binding: the name it introduces and the module it
/// refers to. `from a import f` binds `f` to module `a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub name: String,
    pub module: String,
}

/// Extracted metadata for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub calls: Vec<String>,
    #[serde(default)]
    pub imports: Vec<ImportBinding>,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub decorators: Vec<String>,
    #[serde(default)]
    pub complexity: u32,
    #[serde(default)]
    pub docstring: Option<String>,
    /// Set when the unit exceeded the size budget and was split fixed-width.
    #[serde(default)]
    pub fixed_chunking: bool,
}

/// Injected call-name noise filter (framework/test helpers).
///
/// Passed in as data from configuration; extractors hold no global state.
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    blocked: HashSet<String>,
}

impl CallFilter {
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            blocked: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        !self.blocked.contains(name)
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to compile {language} query: {message}")]
    Query {
        language: &'static str,
        message: String,
    },
}

/// Capability interface: one implementation per language, each consuming
/// its own native parse tree.
pub trait MetadataExtractor: Send + Sync {
    fn language(&self) -> Language;

    /// Extract metadata for the chunk spanning `span` (absolute bytes into
    /// `source`). The full source and full tree are always provided.
    fn extract(
        &self,
        source: &str,
        tree: &Tree,
        span: Range<usize>,
        filter: &CallFilter,
    ) -> ChunkMetadata;
}

/// All registered extractors, keyed by language.
pub struct ExtractorSet {
    extractors: HashMap<Language, Box<dyn MetadataExtractor>>,
}

impl ExtractorSet {
    pub fn new() -> Result<Self, ExtractError> {
        let mut extractors: HashMap<Language, Box<dyn MetadataExtractor>> = HashMap::new();
        extractors.insert(Language::Python, Box::new(python::PythonExtractor::new()?));
        extractors.insert(Language::Rust, Box::new(rust_lang::RustExtractor::new()?));
        extractors.insert(Language::Go, Box::new(go::GoExtractor::new()?));
        extractors.insert(
            Language::TypeScript,
            Box::new(typescript::TypeScriptExtractor::new()?),
        );
        extractors.insert(
            Language::JavaScript,
            Box::new(javascript::JavaScriptExtractor::new()?),
        );
        Ok(Self { extractors })
    }

    pub fn get(&self, language: Language) -> Option<&dyn MetadataExtractor> {
        self.extractors.get(&language).map(|b| b.as_ref())
    }
}

// ── Shared query plumbing ────────────────────────────────────────────

/// Run a query restricted to a byte range, returning the captures of each
/// match as `(capture_name, text)` pairs.
pub(crate) fn query_matches(
    query: &Query,
    tree: &Tree,
    source: &str,
    span: Range<usize>,
) -> Vec<Vec<(String, String)>> {
    let mut cursor = QueryCursor::new();
    cursor.set_byte_range(span.clone());

    let mut out = Vec::new();
    let mut matches = cursor.matches(query, tree.root_node(), source.as_bytes());
    while let Some(m) = matches.next() {
        let mut captures = Vec::new();
        for cap in m.captures {
            if cap.node.start_byte() < span.start || cap.node.start_byte() >= span.end {
                continue;
            }
            if let Ok(text) = cap.node.utf8_text(source.as_bytes()) {
                let name = query.capture_names()[cap.index as usize].to_string();
                captures.push((name, clean_name(text)));
            }
        }
        if !captures.is_empty() {
            out.push(captures);
        }
    }
    out
}

/// Collect filtered, deduplicated call names within a span.
pub(crate) fn collect_calls(
    query: &Query,
    tree: &Tree,
    source: &str,
    span: Range<usize>,
    filter: &CallFilter,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    for captures in query_matches(query, tree, source, span) {
        for (name, text) in captures {
            if name != "call" || text.is_empty() || !filter.allows(&text) {
                continue;
            }
            if seen.insert(text.clone()) {
                calls.push(text);
            }
        }
    }
    calls
}

/// Collect deduplicated single-capture names (inherits, decorators).
pub(crate) fn collect_named(
    query: &Query,
    tree: &Tree,
    source: &str,
    span: Range<usize>,
    capture: &str,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for captures in query_matches(query, tree, source, span) {
        for (name, text) in captures {
            if name == capture && !text.is_empty() && seen.insert(text.clone()) {
                names.push(text);
            }
        }
    }
    names
}

/// Pair `@import.module` / `@import.name` captures into bindings.
/// A module-only match binds the module's last path segment.
pub(crate) fn collect_imports(
    query: &Query,
    tree: &Tree,
    source: &str,
    span: Range<usize>,
) -> Vec<ImportBinding> {
    let mut seen = HashSet::new();
    let mut bindings = Vec::new();
    for captures in query_matches(query, tree, source, span) {
        let module = captures
            .iter()
            .find(|(n, _)| n == "import.module")
            .map(|(_, t)| t.clone());
        let name = captures
            .iter()
            .find(|(n, _)| n == "import.name")
            .map(|(_, t)| t.clone());

        let Some(module) = module else { continue };
        if module.is_empty() {
            continue;
        }
        let name = name.unwrap_or_else(|| last_segment(&module).to_string());
        let binding = ImportBinding { name, module };
        if seen.insert((binding.name.clone(), binding.module.clone())) {
            bindings.push(binding);
        }
    }
    bindings
}

/// Cyclomatic complexity approximation: 1 + branch nodes within the span.
pub(crate) fn count_branches(
    tree: &Tree,
    span: &Range<usize>,
    branch_kinds: &[&str],
) -> u32 {
    let mut count = 1u32;
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        if node.end_byte() <= span.start || node.start_byte() >= span.end {
            continue;
        }
        if node.start_byte() >= span.start && branch_kinds.contains(&node.kind()) {
            count += 1;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    count
}

/// The smallest node exactly covering the chunk span (the defining node).
pub(crate) fn node_at_span<'t>(tree: &'t Tree, span: &Range<usize>) -> Node<'t> {
    let end = span.end.saturating_sub(1).max(span.start);
    let mut node = tree
        .root_node()
        .descendant_for_byte_range(span.start, end)
        .unwrap_or_else(|| tree.root_node());
    while let Some(parent) = node.parent() {
        if parent.start_byte() == node.start_byte() && parent.end_byte() == node.end_byte() {
            node = parent;
        } else {
            break;
        }
    }
    node
}

/// Comment siblings immediately preceding the defining node, newest last.
pub(crate) fn leading_comments<'t>(
    node: Node<'t>,
    source: &str,
    comment_kind: &str,
) -> Vec<String> {
    let mut comments = Vec::new();
    let mut prev = node.prev_named_sibling();
    while let Some(sibling) = prev {
        if sibling.kind() != comment_kind {
            break;
        }
        if let Ok(text) = sibling.utf8_text(source.as_bytes()) {
            comments.push(text.to_string());
        }
        prev = sibling.prev_named_sibling();
    }
    comments.reverse();
    comments
}

pub(crate) fn clean_name(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

pub(crate) fn last_segment(module: &str) -> &str {
    module
        .rsplit(|c: char| c == '.' || c == '/' || c == ':')
        .find(|s| !s.is_empty())
        .unwrap_or(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_filter() {
        let filter = CallFilter::new(["println".to_string(), "expect".to_string()]);
        assert!(!filter.allows("println"));
        assert!(!filter.allows("expect"));
        assert!(filter.allows("resolve_config"));
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("pkg.module"), "module");
        assert_eq!(last_segment("./utils/helpers"), "helpers");
        assert_eq!(last_segment("std::collections::HashMap"), "HashMap");
        assert_eq!(last_segment("fmt"), "fmt");
    }

    #[test]
    fn test_extractor_set_covers_all_languages() {
        let set = ExtractorSet::new().unwrap();
        for lang in Language::all() {
            let extractor = set.get(lang).expect("extractor registered");
            assert_eq!(extractor.language(), lang);
        }
    }
}
