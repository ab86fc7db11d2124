/// AST chunker: splits source files into semantic units.
///
/// Parsing uses tree-sitter with per-language definition queries. Every
/// chunk records absolute byte offsets into the full file source; the
/// invariant `code_text == source[start_byte..end_byte]` holds for every
/// chunk, including fixed-width sub-chunks of oversized units.
pub mod languages;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator, Tree};

use crate::extract::ChunkMetadata;
use crate::language::Language;
use languages::LanguageSpec;

/// Granularity of a semantic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Method,
    File,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Method => "method",
            ChunkKind::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<ChunkKind> {
        match s {
            "function" => Some(ChunkKind::Function),
            "class" => Some(ChunkKind::Class),
            "method" => Some(ChunkKind::Method),
            "file" => Some(ChunkKind::File),
            _ => None,
        }
    }
}

/// A semantic unit of source code, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChunk {
    pub repository: String,
    pub file_path: String,
    pub chunk_kind: ChunkKind,
    pub language: Language,
    pub symbol_name: Option<String>,
    /// `Parent.name` when the symbol is nested, otherwise the bare name.
    pub qualified_name: Option<String>,
    pub parent_symbol: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub code_text: String,
    pub metadata: ChunkMetadata,
}

/// A parsed file: the native tree is kept so extractors can run against
/// the full source with absolute offsets.
pub struct ChunkedFile {
    pub language: Language,
    pub tree: Tree,
    pub source: String,
    pub chunks: Vec<SourceChunk>,
}

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("failed to compile query for {0}: {1}")]
    Query(&'static str, String),

    #[error("parser rejected grammar: {0}")]
    Grammar(String),

    #[error("failed to parse {0}")]
    Parse(String),
}

/// Byte-offset → line lookup over a single file.
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based line containing the given byte offset.
    pub fn line_of(&self, byte: usize) -> usize {
        self.line_starts.partition_point(|&s| s <= byte)
    }
}

pub struct CodeChunker {
    queries: HashMap<Language, Query>,
    max_chunk_chars: usize,
}

impl CodeChunker {
    pub fn new(max_chunk_chars: usize) -> Result<Self, ChunkError> {
        let mut queries = HashMap::new();
        for language in Language::all() {
            let spec = LanguageSpec::get(language);
            let query = Query::new(&spec.grammar, spec.definition_query)
                .map_err(|e| ChunkError::Query(language.as_str(), e.to_string()))?;
            queries.insert(language, query);
        }
        Ok(Self {
            queries,
            max_chunk_chars,
        })
    }

    /// Parse a file's full source and split it into semantic chunks.
    ///
    /// A file yielding no symbol-level unit (pure type/re-export files)
    /// falls back to a single file-level chunk; the indexing pipeline
    /// records an informational error for those.
    pub fn chunk_source(
        &self,
        repository: &str,
        file_path: &str,
        source: String,
        language: Language,
    ) -> Result<ChunkedFile, ChunkError> {
        let spec = LanguageSpec::get(language);
        let mut parser = Parser::new();
        parser
            .set_language(&spec.grammar)
            .map_err(|e| ChunkError::Grammar(e.to_string()))?;

        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| ChunkError::Parse(file_path.to_string()))?;

        let lines = LineIndex::new(&source);
        let mut chunks =
            self.extract_units(&tree, &source, &lines, repository, file_path, language)?;

        // Pure declaration / re-export files still get a file-level chunk.
        if chunks.is_empty() && !source.trim().is_empty() {
            let file_chunk = SourceChunk {
                repository: repository.to_string(),
                file_path: file_path.to_string(),
                chunk_kind: ChunkKind::File,
                language,
                symbol_name: None,
                qualified_name: None,
                parent_symbol: None,
                start_line: 1,
                end_line: lines.line_of(source.len().saturating_sub(1)),
                start_byte: 0,
                end_byte: source.len(),
                code_text: source.clone(),
                metadata: ChunkMetadata::default(),
            };
            chunks.extend(self.enforce_budget(file_chunk, &source, &lines));
        }

        chunks.sort_by_key(|c| (c.start_byte, c.end_byte));

        debug_assert!(
            chunks
                .iter()
                .all(|c| c.code_text.as_bytes() == &source.as_bytes()[c.start_byte..c.end_byte])
        );

        Ok(ChunkedFile {
            language,
            tree,
            source,
            chunks,
        })
    }

    fn extract_units(
        &self,
        tree: &Tree,
        source: &str,
        lines: &LineIndex,
        repository: &str,
        file_path: &str,
        language: Language,
    ) -> Result<Vec<SourceChunk>, ChunkError> {
        let query = self
            .queries
            .get(&language)
            .ok_or_else(|| ChunkError::Grammar(language.as_str().to_string()))?;
        let mut cursor = QueryCursor::new();

        let mut chunks = Vec::new();
        let mut seen = HashSet::new();

        let mut matches = cursor.matches(query, tree.root_node(), source.as_bytes());
        while let Some(m) = matches.next() {
            let mut main_node = None;
            let mut kind = None;
            let mut symbol_name = String::new();

            for cap in m.captures {
                let capture_name = query.capture_names()[cap.index as usize];
                match capture_name {
                    "name" => {
                        if let Ok(name) = cap.node.utf8_text(source.as_bytes()) {
                            symbol_name = name.to_string();
                        }
                    }
                    "function" => {
                        main_node = Some(cap.node);
                        kind = Some(ChunkKind::Function);
                    }
                    "class" => {
                        main_node = Some(cap.node);
                        kind = Some(ChunkKind::Class);
                    }
                    "method" => {
                        main_node = Some(cap.node);
                        kind = Some(ChunkKind::Method);
                    }
                    _ => {}
                }
            }

            let (Some(node), Some(mut kind)) = (main_node, kind) else {
                continue;
            };
            if symbol_name.is_empty() {
                continue;
            }

            let start_byte = node.start_byte();
            let end_byte = node.end_byte();
            if !seen.insert((start_byte, end_byte)) {
                continue;
            }

            let parent_symbol = find_parent_symbol(node, source.as_bytes(), language);
            if kind == ChunkKind::Function && parent_symbol.is_some() {
                kind = ChunkKind::Method;
            }
            let qualified_name = match &parent_symbol {
                Some(parent) => format!("{parent}.{symbol_name}"),
                None => symbol_name.clone(),
            };

            let chunk = SourceChunk {
                repository: repository.to_string(),
                file_path: file_path.to_string(),
                chunk_kind: kind,
                language,
                symbol_name: Some(symbol_name),
                qualified_name: Some(qualified_name),
                parent_symbol,
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                start_byte,
                end_byte,
                code_text: source[start_byte..end_byte].to_string(),
                metadata: ChunkMetadata::default(),
            };
            chunks.extend(self.enforce_budget(chunk, source, lines));
        }

        Ok(chunks)
    }

    /// Apply the size budget: oversized units fall back to fixed-width
    /// sub-chunks on UTF-8 character boundaries, flagged `fixed_chunking`.
    fn enforce_budget(
        &self,
        chunk: SourceChunk,
        source: &str,
        lines: &LineIndex,
    ) -> Vec<SourceChunk> {
        if chunk.code_text.chars().count() <= self.max_chunk_chars {
            return vec![chunk];
        }

        let mut out = Vec::new();
        let base = chunk.start_byte;
        let mut seg_start = 0usize; // relative byte offset
        let mut chars_in_seg = 0usize;

        let mut flush = |seg_start: usize, seg_end: usize, out: &mut Vec<SourceChunk>| {
            let abs_start = base + seg_start;
            let abs_end = base + seg_end;
            let mut metadata = ChunkMetadata::default();
            metadata.fixed_chunking = true;
            out.push(SourceChunk {
                repository: chunk.repository.clone(),
                file_path: chunk.file_path.clone(),
                chunk_kind: chunk.chunk_kind,
                language: chunk.language,
                symbol_name: chunk.symbol_name.clone(),
                qualified_name: chunk.qualified_name.clone(),
                parent_symbol: chunk.parent_symbol.clone(),
                start_line: lines.line_of(abs_start),
                end_line: lines.line_of(abs_end.saturating_sub(1).max(abs_start)),
                start_byte: abs_start,
                end_byte: abs_end,
                code_text: source[abs_start..abs_end].to_string(),
                metadata,
            });
        };

        for (rel, ch) in chunk.code_text.char_indices() {
            if chars_in_seg == self.max_chunk_chars {
                flush(seg_start, rel, &mut out);
                seg_start = rel;
                chars_in_seg = 0;
            }
            chars_in_seg += 1;
            let _ = ch;
        }
        if seg_start < chunk.code_text.len() {
            flush(seg_start, chunk.code_text.len(), &mut out);
        }

        out
    }
}

/// Walk ancestors to find the enclosing class-like construct, if any.
fn find_parent_symbol(node: Node, source: &[u8], language: Language) -> Option<String> {
    let mut parent = node.parent();
    while let Some(p) = parent {
        let kind = p.kind();
        let is_class_like = match language {
            Language::Python => kind == "class_definition",
            Language::TypeScript | Language::JavaScript => kind == "class_declaration",
            Language::Rust => kind == "impl_item" || kind == "trait_item",
            Language::Go => kind == "type_declaration",
        };

        if is_class_like {
            if language == Language::Rust && kind == "impl_item" {
                if let Some(type_node) = p.child_by_field_name("type") {
                    if let Ok(name) = type_node.utf8_text(source) {
                        return Some(name.to_string());
                    }
                }
            } else {
                let mut cursor = p.walk();
                for child in p.children(&mut cursor) {
                    let child_kind = child.kind();
                    if child_kind.contains("identifier") || child_kind == "name" {
                        if let Ok(name) = child.utf8_text(source) {
                            return Some(name.to_string());
                        }
                    }
                }
            }
        }
        parent = p.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> CodeChunker {
        CodeChunker::new(2000).expect("failed to initialize chunker")
    }

    #[test]
    fn test_chunk_rust_code() {
        let source = r#"
struct Widget {
    size: u32,
}

impl Widget {
    fn resize(&mut self, size: u32) {
        self.size = size;
    }
}

fn standalone() {}
"#;
        let file = chunker()
            .chunk_source("repo", "src/widget.rs", source.to_string(), Language::Rust)
            .unwrap();

        let resize = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("resize"))
            .expect("resize chunk");
        assert_eq!(resize.chunk_kind, ChunkKind::Method);
        assert_eq!(resize.parent_symbol.as_deref(), Some("Widget"));
        assert_eq!(resize.qualified_name.as_deref(), Some("Widget.resize"));

        let standalone = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("standalone"))
            .expect("standalone chunk");
        assert_eq!(standalone.chunk_kind, ChunkKind::Function);
    }

    #[test]
    fn test_chunk_python_code() {
        let source = r#"
class Greeter:
    def greet(self):
        return "hi"

def main():
    Greeter().greet()
"#;
        let file = chunker()
            .chunk_source("repo", "app.py", source.to_string(), Language::Python)
            .unwrap();

        let class = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("Greeter"))
            .expect("class chunk");
        assert_eq!(class.chunk_kind, ChunkKind::Class);

        let method = file
            .chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("greet"))
            .expect("method chunk");
        assert_eq!(method.chunk_kind, ChunkKind::Method);
        assert_eq!(method.parent_symbol.as_deref(), Some("Greeter"));
    }

    #[test]
    fn test_roundtrip_invariant_multibyte() {
        // Multi-byte UTF-8 content around the chunk boundaries.
        let source = "# コメント: 設定を読み込む\ndef load_config():\n    return {\"キー\": \"値\"}\n\ndef other():\n    pass\n";
        let file = chunker()
            .chunk_source("repo", "config.py", source.to_string(), Language::Python)
            .unwrap();

        assert!(!file.chunks.is_empty());
        for chunk in &file.chunks {
            assert_eq!(
                chunk.code_text.as_bytes(),
                &source.as_bytes()[chunk.start_byte..chunk.end_byte],
                "byte slice must reproduce code_text exactly"
            );
        }
    }

    #[test]
    fn test_fixed_chunking_fallback() {
        let mut body = String::from("def huge():\n");
        for i in 0..200 {
            body.push_str(&format!("    value_{i} = \"padding padding padding\"\n"));
        }
        let chunker = CodeChunker::new(500).unwrap();
        let file = chunker
            .chunk_source("repo", "huge.py", body.clone(), Language::Python)
            .unwrap();

        let fixed: Vec<_> = file
            .chunks
            .iter()
            .filter(|c| c.metadata.fixed_chunking)
            .collect();
        assert!(fixed.len() > 1, "oversized unit must split");
        for chunk in &fixed {
            assert!(chunk.code_text.chars().count() <= 500);
            assert_eq!(
                chunk.code_text.as_bytes(),
                &body.as_bytes()[chunk.start_byte..chunk.end_byte]
            );
        }
    }

    #[test]
    fn test_file_level_fallback() {
        // Pure re-export file: no function/class units.
        let source = "pub use crate::widget::Widget;\npub use crate::config::Config;\n";
        let file = chunker()
            .chunk_source("repo", "src/lib.rs", source.to_string(), Language::Rust)
            .unwrap();

        assert_eq!(file.chunks.len(), 1);
        assert_eq!(file.chunks[0].chunk_kind, ChunkKind::File);
        assert_eq!(file.chunks[0].code_text, source);
    }

    #[test]
    fn test_line_index() {
        let idx = LineIndex::new("ab\ncd\nef");
        assert_eq!(idx.line_of(0), 1);
        assert_eq!(idx.line_of(2), 1);
        assert_eq!(idx.line_of(3), 2);
        assert_eq!(idx.line_of(7), 3);
    }
}
