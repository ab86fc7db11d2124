/// Row types shared between the store and its callers.
use serde::{Deserialize, Serialize};

use crate::extract::ChunkMetadata;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: i64,
    pub repository: String,
    pub path: String,
    pub language: String,
    pub content_hash: String,
    /// JSON-encoded file-level import bindings.
    pub imports: String,
}

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub repository: String,
    pub file_path: String,
    pub chunk_type: String,
    pub language: String,
    pub symbol_name: Option<String>,
    pub qualified_name: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Kinds of graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Module,
    Class,
    Function,
    Method,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Module => "module",
            NodeType::Class => "class",
            NodeType::Function => "function",
            NodeType::Method => "method",
        }
    }

    pub fn parse(s: &str) -> Option<NodeType> {
        match s {
            "module" => Some(NodeType::Module),
            "class" => Some(NodeType::Class),
            "function" => Some(NodeType::Function),
            "method" => Some(NodeType::Method),
            _ => None,
        }
    }
}

/// Relationship kinds between graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Calls,
    Imports,
    Inherits,
    Contains,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Calls => "calls",
            RelationKind::Imports => "imports",
            RelationKind::Inherits => "inherits",
            RelationKind::Contains => "contains",
        }
    }

    pub fn parse(s: &str) -> Option<RelationKind> {
        match s {
            "calls" => Some(RelationKind::Calls),
            "imports" => Some(RelationKind::Imports),
            "inherits" => Some(RelationKind::Inherits),
            "contains" => Some(RelationKind::Contains),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Stable id: `repo:path` for modules, `repo:path:qualified_name`
    /// for symbols. UPSERT keyed on it makes graph rebuilds idempotent.
    pub node_id: String,
    pub repository: String,
    pub node_type: NodeType,
    pub qualified_name: String,
    pub file_path: String,
    /// JSON bag for metrics (coupling, centrality) and extras.
    pub properties: String,
}

#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub repository: String,
    pub source_node_id: String,
    /// `None` marks a dangling reference kept for re-resolution; such
    /// edges never count toward connectivity metrics.
    pub target_node_id: Option<String>,
    pub relation_type: RelationKind,
    /// Raw referenced name, kept even when resolution succeeded.
    pub target_name: String,
    pub properties: String,
}

/// Connectivity health of a repository graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub repository: String,
    pub node_count: usize,
    /// Resolved edges only.
    pub edge_count: usize,
    pub dangling_count: usize,
    pub edge_ratio: f64,
    /// Ratio below the healthy floor: extraction is likely dropping
    /// references.
    pub low_connectivity: bool,
}

/// Categories of recoverable per-file indexing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    ChunkingError,
    EmbeddingTimeout,
    GraphResolutionAmbiguous,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::ChunkingError => "chunking_error",
            ErrorKind::EmbeddingTimeout => "embedding_timeout",
            ErrorKind::GraphResolutionAmbiguous => "graph_resolution_ambiguous",
        }
    }

    pub fn parse(s: &str) -> Option<ErrorKind> {
        match s {
            "parse_error" => Some(ErrorKind::ParseError),
            "chunking_error" => Some(ErrorKind::ChunkingError),
            "embedding_timeout" => Some(ErrorKind::EmbeddingTimeout),
            "graph_resolution_ambiguous" => Some(ErrorKind::GraphResolutionAmbiguous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexingErrorRecord {
    pub id: i64,
    pub repository: String,
    pub file_path: String,
    pub error_type: String,
    pub message: String,
    pub language: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_roundtrip() {
        for kind in [
            ErrorKind::ParseError,
            ErrorKind::ChunkingError,
            ErrorKind::EmbeddingTimeout,
            ErrorKind::GraphResolutionAmbiguous,
        ] {
            assert_eq!(ErrorKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_relation_kind_roundtrip() {
        for kind in [
            RelationKind::Calls,
            RelationKind::Imports,
            RelationKind::Inherits,
            RelationKind::Contains,
        ] {
            assert_eq!(RelationKind::parse(kind.as_str()), Some(kind));
        }
    }
}
