/// Builds the code graph from stored files and chunks.
///
/// Reference resolution is ordered: same-file definitions win, then import
/// bindings, and anything left becomes a dangling edge with the raw name
/// preserved for re-resolution on the next build. An ambiguous reference
/// resolves to the first candidate in deterministic order and is reported
/// so the indexer can log it.
use std::collections::{HashMap, HashSet};

use serde_json::json;
use tracing::debug;

use crate::extract::ImportBinding;
use crate::store::models::{ChunkRecord, EdgeRecord, FileEntry, NodeRecord, NodeType, RelationKind};

/// An ambiguous reference: more than one definition matched.
#[derive(Debug, Clone)]
pub struct Ambiguity {
    pub file_path: String,
    pub name: String,
    pub candidates: usize,
}

pub struct GraphBuild {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub ambiguities: Vec<Ambiguity>,
}

pub struct GraphBuilder {
    repository: String,
}

impl GraphBuilder {
    pub fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
        }
    }

    pub fn build(&self, files: &[FileEntry], chunks: &[ChunkRecord]) -> GraphBuild {
        let repo = &self.repository;
        let mut nodes: Vec<NodeRecord> = Vec::new();
        let mut node_ids: HashSet<String> = HashSet::new();
        let mut edges: Vec<EdgeRecord> = Vec::new();
        let mut ambiguities: Vec<Ambiguity> = Vec::new();

        // Module node per file.
        for file in files {
            let id = module_node_id(repo, &file.path);
            if node_ids.insert(id.clone()) {
                nodes.push(NodeRecord {
                    node_id: id,
                    repository: repo.clone(),
                    node_type: NodeType::Module,
                    qualified_name: file.path.clone(),
                    file_path: file.path.clone(),
                    properties: "{}".to_string(),
                });
            }
        }

        // Symbol node per chunk; fixed-width sub-chunks of one oversized
        // unit collapse into a single node.
        for chunk in chunks {
            let Some(qname) = &chunk.qualified_name else {
                continue;
            };
            let id = symbol_node_id(repo, &chunk.file_path, qname);
            if !node_ids.insert(id.clone()) {
                continue;
            }
            let node_type = match chunk.chunk_type.as_str() {
                "class" => NodeType::Class,
                "method" => NodeType::Method,
                _ => NodeType::Function,
            };
            nodes.push(NodeRecord {
                node_id: id,
                repository: repo.clone(),
                node_type,
                qualified_name: qname.clone(),
                file_path: chunk.file_path.clone(),
                properties: "{}".to_string(),
            });
        }

        // Lookup tables for resolution.
        let mut by_file_name: HashMap<(&str, &str), Vec<String>> = HashMap::new();
        let mut symbols_in_file: HashMap<&str, Vec<(&str, String)>> = HashMap::new();
        for chunk in chunks {
            let (Some(name), Some(qname)) = (&chunk.symbol_name, &chunk.qualified_name) else {
                continue;
            };
            let id = symbol_node_id(repo, &chunk.file_path, qname);
            by_file_name
                .entry((chunk.file_path.as_str(), name.as_str()))
                .or_default()
                .push(id.clone());
            symbols_in_file
                .entry(chunk.file_path.as_str())
                .or_default()
                .push((name.as_str(), id));
        }
        for ids in by_file_name.values_mut() {
            ids.sort();
            ids.dedup();
        }

        let file_imports: HashMap<&str, Vec<ImportBinding>> = files
            .iter()
            .map(|f| {
                let bindings: Vec<ImportBinding> =
                    serde_json::from_str(&f.imports).unwrap_or_default();
                (f.path.as_str(), bindings)
            })
            .collect();

        // Containment: module -> top-level symbol, class -> member.
        for chunk in chunks {
            let Some(qname) = &chunk.qualified_name else {
                continue;
            };
            let child_id = symbol_node_id(repo, &chunk.file_path, qname);
            let parent_id = match qname.rsplit_once('.') {
                Some((parent, _)) => symbol_node_id(repo, &chunk.file_path, parent),
                None => module_node_id(repo, &chunk.file_path),
            };
            if !node_ids.contains(&parent_id) || parent_id == child_id {
                continue;
            }
            edges.push(EdgeRecord {
                repository: repo.clone(),
                source_node_id: parent_id,
                target_node_id: Some(child_id),
                relation_type: RelationKind::Contains,
                target_name: qname.clone(),
                properties: "{}".to_string(),
            });
        }

        // Import edges: module -> imported module.
        for file in files {
            let source_id = module_node_id(repo, &file.path);
            for binding in file_imports.get(file.path.as_str()).into_iter().flatten() {
                let targets = matching_files(files, &binding.module, &file.path);
                let target_id = match targets.len() {
                    0 => None,
                    1 => Some(module_node_id(repo, &targets[0].path)),
                    n => {
                        ambiguities.push(Ambiguity {
                            file_path: file.path.clone(),
                            name: binding.module.clone(),
                            candidates: n,
                        });
                        Some(module_node_id(repo, &targets[0].path))
                    }
                };
                edges.push(EdgeRecord {
                    repository: repo.clone(),
                    source_node_id: source_id.clone(),
                    target_node_id: target_id,
                    relation_type: RelationKind::Imports,
                    target_name: binding.module.clone(),
                    properties: "{}".to_string(),
                });
            }
        }

        // Call and inheritance edges from chunk metadata.
        for chunk in chunks {
            let Some(qname) = &chunk.qualified_name else {
                continue;
            };
            let source_id = symbol_node_id(repo, &chunk.file_path, qname);

            let mut bindings: Vec<&ImportBinding> = file_imports
                .get(chunk.file_path.as_str())
                .map(|b| b.iter().collect())
                .unwrap_or_default();
            bindings.extend(chunk.metadata.imports.iter());

            for call in &chunk.metadata.calls {
                let (target, ambiguity) = self.resolve(
                    files,
                    &chunk.file_path,
                    call,
                    &source_id,
                    &by_file_name,
                    &symbols_in_file,
                    &bindings,
                );
                if let Some(a) = ambiguity {
                    ambiguities.push(a);
                }
                edges.push(EdgeRecord {
                    repository: repo.clone(),
                    source_node_id: source_id.clone(),
                    target_node_id: target,
                    relation_type: RelationKind::Calls,
                    target_name: call.clone(),
                    properties: "{}".to_string(),
                });
            }

            for base in &chunk.metadata.inherits {
                let (target, ambiguity) = self.resolve(
                    files,
                    &chunk.file_path,
                    base,
                    &source_id,
                    &by_file_name,
                    &symbols_in_file,
                    &bindings,
                );
                if let Some(a) = ambiguity {
                    ambiguities.push(a);
                }
                edges.push(EdgeRecord {
                    repository: repo.clone(),
                    source_node_id: source_id.clone(),
                    target_node_id: target,
                    relation_type: RelationKind::Inherits,
                    target_name: base.clone(),
                    properties: "{}".to_string(),
                });
            }
        }

        dedupe_edges(&mut edges);
        annotate_metrics(&mut nodes, &edges);

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            ambiguous = ambiguities.len(),
            "graph assembled"
        );

        GraphBuild {
            nodes,
            edges,
            ambiguities,
        }
    }

    /// Same-file first, then import bindings; unresolved stays dangling.
    #[allow(clippy::too_many_arguments)]
    fn resolve(
        &self,
        files: &[FileEntry],
        file_path: &str,
        name: &str,
        source_id: &str,
        by_file_name: &HashMap<(&str, &str), Vec<String>>,
        symbols_in_file: &HashMap<&str, Vec<(&str, String)>>,
        bindings: &[&ImportBinding],
    ) -> (Option<String>, Option<Ambiguity>) {
        if let Some(candidates) = by_file_name.get(&(file_path, name)) {
            let filtered: Vec<&String> =
                candidates.iter().filter(|id| id.as_str() != source_id).collect();
            match filtered.len() {
                0 => {}
                1 => return (Some(filtered[0].clone()), None),
                n => {
                    return (
                        Some(filtered[0].clone()),
                        Some(Ambiguity {
                            file_path: file_path.to_string(),
                            name: name.to_string(),
                            candidates: n,
                        }),
                    );
                }
            }
        }

        for binding in bindings {
            if binding.name != name {
                continue;
            }
            let targets = matching_files(files, &binding.module, file_path);
            if targets.is_empty() {
                continue;
            }
            let ambiguity = (targets.len() > 1).then(|| Ambiguity {
                file_path: file_path.to_string(),
                name: name.to_string(),
                candidates: targets.len(),
            });
            let target_file = &targets[0];
            // Prefer the named symbol in the target file; fall back to
            // the module itself.
            let symbol = symbols_in_file
                .get(target_file.path.as_str())
                .and_then(|syms| syms.iter().find(|(n, _)| *n == name))
                .map(|(_, id)| id.clone());
            let target =
                symbol.unwrap_or_else(|| module_node_id(&self.repository, &target_file.path));
            return (Some(target), ambiguity);
        }

        (None, None)
    }
}

pub fn module_node_id(repository: &str, path: &str) -> String {
    format!("{repository}:{path}")
}

pub fn symbol_node_id(repository: &str, path: &str, qualified_name: &str) -> String {
    format!("{repository}:{path}:{qualified_name}")
}

/// Files whose path tail matches the module specifier's segments.
/// Sorted for deterministic ambiguity handling; the importing file itself
/// never matches.
fn matching_files<'f>(
    files: &'f [FileEntry],
    module: &str,
    importing: &str,
) -> Vec<&'f FileEntry> {
    let segments: Vec<&str> = module
        .split(['.', '/', ':', '\\'])
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<&FileEntry> = files
        .iter()
        .filter(|f| f.path != importing && path_tail_matches(&f.path, &segments))
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn path_tail_matches(path: &str, segments: &[&str]) -> bool {
    let mut components: Vec<&str> = path.split('/').collect();
    if let Some(last) = components.last_mut() {
        if let Some(stem) = last.rsplit_once('.').map(|(s, _)| s) {
            *last = stem;
        }
    }
    if segments.len() > components.len() {
        return false;
    }
    components[components.len() - segments.len()..] == *segments
}

fn dedupe_edges(edges: &mut Vec<EdgeRecord>) {
    let mut seen = HashSet::new();
    edges.retain(|e| {
        seen.insert((
            e.source_node_id.clone(),
            e.relation_type,
            e.target_name.clone(),
        ))
    });
}

/// Degree-based coupling and centrality written into node properties.
fn annotate_metrics(nodes: &mut [NodeRecord], edges: &[EdgeRecord]) {
    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        let Some(target) = &edge.target_node_id else {
            continue;
        };
        *degree.entry(edge.source_node_id.as_str()).or_default() += 1;
        *degree.entry(target.as_str()).or_default() += 1;
    }

    let n = nodes.len();
    let degrees: HashMap<String, usize> = degree
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    for node in nodes.iter_mut() {
        let deg = degrees.get(&node.node_id).copied().unwrap_or(0);
        let centrality = if n > 1 {
            deg as f64 / (n - 1) as f64
        } else {
            0.0
        };
        node.properties = json!({
            "coupling": deg,
            "centrality": centrality,
        })
        .to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ChunkMetadata;

    fn file(id: i64, path: &str, imports: &str) -> FileEntry {
        FileEntry {
            id,
            repository: "repo".to_string(),
            path: path.to_string(),
            language: "python".to_string(),
            content_hash: "h".to_string(),
            imports: imports.to_string(),
        }
    }

    fn chunk(path: &str, name: &str, chunk_type: &str, calls: &[&str]) -> ChunkRecord {
        ChunkRecord {
            id: 0,
            repository: "repo".to_string(),
            file_path: path.to_string(),
            chunk_type: chunk_type.to_string(),
            language: "python".to_string(),
            symbol_name: Some(name.to_string()),
            qualified_name: Some(name.to_string()),
            start_line: 1,
            end_line: 2,
            start_byte: 0,
            end_byte: 10,
            content: String::new(),
            metadata: ChunkMetadata {
                calls: calls.iter().map(|c| (*c).to_string()).collect(),
                ..ChunkMetadata::default()
            },
        }
    }

    #[test]
    fn test_same_file_resolution() {
        let files = vec![file(1, "a.py", "[]")];
        let chunks = vec![
            chunk("a.py", "caller", "function", &["helper"]),
            chunk("a.py", "helper", "function", &[]),
        ];
        let build = GraphBuilder::new("repo").build(&files, &chunks);

        let call = build
            .edges
            .iter()
            .find(|e| e.relation_type == RelationKind::Calls)
            .expect("call edge");
        assert_eq!(call.source_node_id, "repo:a.py:caller");
        assert_eq!(call.target_node_id.as_deref(), Some("repo:a.py:helper"));
    }

    #[test]
    fn test_import_binding_resolution() {
        let files = vec![
            file(1, "a.py", "[]"),
            file(
                2,
                "b.py",
                r#"[{"name":"greet_user","module":"a"}]"#,
            ),
        ];
        let chunks = vec![
            chunk("a.py", "greet_user", "function", &[]),
            chunk("b.py", "welcome", "function", &["greet_user"]),
        ];
        let build = GraphBuilder::new("repo").build(&files, &chunks);

        let call = build
            .edges
            .iter()
            .find(|e| e.relation_type == RelationKind::Calls)
            .expect("call edge");
        assert_eq!(
            call.target_node_id.as_deref(),
            Some("repo:a.py:greet_user"),
            "cross-file call resolves through the import binding"
        );

        let import = build
            .edges
            .iter()
            .find(|e| e.relation_type == RelationKind::Imports)
            .expect("import edge");
        assert_eq!(import.source_node_id, "repo:b.py");
        assert_eq!(import.target_node_id.as_deref(), Some("repo:a.py"));
    }

    #[test]
    fn test_unresolved_stays_dangling() {
        let files = vec![file(1, "a.py", "[]")];
        let chunks = vec![chunk("a.py", "run", "function", &["requests_get"])];
        let build = GraphBuilder::new("repo").build(&files, &chunks);

        let call = build
            .edges
            .iter()
            .find(|e| e.relation_type == RelationKind::Calls)
            .expect("call edge");
        assert!(call.target_node_id.is_none());
        assert_eq!(call.target_name, "requests_get");
    }

    #[test]
    fn test_containment_edges() {
        let files = vec![file(1, "a.py", "[]")];
        let mut method = chunk("a.py", "run", "method", &[]);
        method.qualified_name = Some("Worker.run".to_string());
        let chunks = vec![chunk("a.py", "Worker", "class", &[]), method];
        let build = GraphBuilder::new("repo").build(&files, &chunks);

        let contains: Vec<_> = build
            .edges
            .iter()
            .filter(|e| e.relation_type == RelationKind::Contains)
            .collect();
        assert!(contains
            .iter()
            .any(|e| e.source_node_id == "repo:a.py" && e.target_node_id.as_deref() == Some("repo:a.py:Worker")));
        assert!(contains
            .iter()
            .any(|e| e.source_node_id == "repo:a.py:Worker"
                && e.target_node_id.as_deref() == Some("repo:a.py:Worker.run")));
    }

    #[test]
    fn test_ambiguous_reference_reported() {
        let files = vec![
            file(1, "a.py", "[]"),
            file(2, "pkg/util.py", "[]"),
            file(3, "other/util.py", "[]"),
        ];
        let chunks = vec![chunk(
            "a.py",
            "main",
            "function",
            &[],
        )];
        // Import of "util" matches two files.
        let files_with_import = {
            let mut f = files;
            f[0].imports = r#"[{"name":"util","module":"util"}]"#.to_string();
            f
        };
        let build = GraphBuilder::new("repo").build(&files_with_import, &chunks);

        assert!(
            build.ambiguities.iter().any(|a| a.name == "util"),
            "two candidate modules must be reported as ambiguous"
        );
        // Deterministic winner: lexicographically first path.
        let import = build
            .edges
            .iter()
            .find(|e| e.relation_type == RelationKind::Imports)
            .expect("import edge");
        assert_eq!(import.target_node_id.as_deref(), Some("repo:other/util.py"));
    }

    #[test]
    fn test_metrics_on_nodes() {
        let files = vec![file(1, "a.py", "[]")];
        let chunks = vec![
            chunk("a.py", "caller", "function", &["helper"]),
            chunk("a.py", "helper", "function", &[]),
        ];
        let build = GraphBuilder::new("repo").build(&files, &chunks);

        let helper = build
            .nodes
            .iter()
            .find(|n| n.node_id == "repo:a.py:helper")
            .expect("helper node");
        let props: serde_json::Value = serde_json::from_str(&helper.properties).unwrap();
        assert!(props["coupling"].as_u64().unwrap() >= 1);
        assert!(props["centrality"].as_f64().unwrap() > 0.0);
    }
}
