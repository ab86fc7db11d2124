/// Graph node and edge persistence.
///
/// A rebuild replaces the repository's nodes and edges wholesale inside
/// one transaction, so readers never observe a partially rebuilt graph.
/// Dangling edges (NULL target) are stored for later re-resolution but
/// never counted in connectivity metrics.
use rusqlite::{params, Row};

use super::models::{EdgeRecord, GraphStats, NodeRecord, NodeType, RelationKind};
use super::{Store, StoreError};

/// Below this resolved-edges-per-node ratio the graph is considered
/// under-connected for real code.
const HEALTHY_EDGE_RATIO: f64 = 0.3;

impl Store {
    /// Replace a repository's graph with a fresh build. Stale rows are
    /// deleted and the new rows inserted in a single transaction.
    pub fn replace_graph(
        &mut self,
        repository: &str,
        nodes: &[NodeRecord],
        edges: &[EdgeRecord],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM edges WHERE repository = ?1", params![repository])?;
        tx.execute("DELETE FROM nodes WHERE repository = ?1", params![repository])?;

        for node in nodes {
            tx.execute(
                "INSERT INTO nodes (node_id, repository, node_type, qualified_name, file_path, properties)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(node_id) DO UPDATE SET
                     node_type = excluded.node_type,
                     qualified_name = excluded.qualified_name,
                     file_path = excluded.file_path,
                     properties = excluded.properties",
                params![
                    node.node_id,
                    node.repository,
                    node.node_type.as_str(),
                    node.qualified_name,
                    node.file_path,
                    node.properties,
                ],
            )?;
        }
        for edge in edges {
            tx.execute(
                "INSERT INTO edges (repository, source_node_id, target_node_id, relation_type, target_name, properties)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(repository, source_node_id, relation_type, target_name) DO UPDATE SET
                     target_node_id = excluded.target_node_id,
                     properties = excluded.properties",
                params![
                    edge.repository,
                    edge.source_node_id,
                    edge.target_node_id,
                    edge.relation_type.as_str(),
                    edge.target_name,
                    edge.properties,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_nodes(&self, repository: &str) -> Result<Vec<NodeRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT node_id, repository, node_type, qualified_name, file_path, properties
             FROM nodes WHERE repository = ?1 ORDER BY node_id",
        )?;
        let rows = stmt.query_map(params![repository], map_node_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn load_edges(&self, repository: &str) -> Result<Vec<EdgeRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT repository, source_node_id, target_node_id, relation_type, target_name, properties
             FROM edges WHERE repository = ?1 ORDER BY source_node_id",
        )?;
        let rows = stmt.query_map(params![repository], map_edge_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Connectivity summary for one repository.
    pub fn graph_stats(&self, repository: &str) -> Result<GraphStats, StoreError> {
        let node_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE repository = ?1",
            params![repository],
            |r| r.get(0),
        )?;
        let edge_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE repository = ?1 AND target_node_id IS NOT NULL",
            params![repository],
            |r| r.get(0),
        )?;
        let dangling_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE repository = ?1 AND target_node_id IS NULL",
            params![repository],
            |r| r.get(0),
        )?;

        let edge_ratio = if node_count > 0 {
            edge_count as f64 / node_count as f64
        } else {
            0.0
        };

        Ok(GraphStats {
            repository: repository.to_string(),
            node_count: node_count as usize,
            edge_count: edge_count as usize,
            dangling_count: dangling_count as usize,
            edge_ratio,
            low_connectivity: node_count > 0 && edge_ratio < HEALTHY_EDGE_RATIO,
        })
    }
}

fn map_node_row(row: &Row<'_>) -> rusqlite::Result<NodeRecord> {
    let node_type: String = row.get(2)?;
    Ok(NodeRecord {
        node_id: row.get(0)?,
        repository: row.get(1)?,
        node_type: NodeType::parse(&node_type).unwrap_or(NodeType::Function),
        qualified_name: row.get(3)?,
        file_path: row.get(4)?,
        properties: row.get(5)?,
    })
}

fn map_edge_row(row: &Row<'_>) -> rusqlite::Result<EdgeRecord> {
    let relation: String = row.get(3)?;
    Ok(EdgeRecord {
        repository: row.get(0)?,
        source_node_id: row.get(1)?,
        target_node_id: row.get(2)?,
        relation_type: RelationKind::parse(&relation).unwrap_or(RelationKind::Calls),
        target_name: row.get(4)?,
        properties: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: NodeType) -> NodeRecord {
        NodeRecord {
            node_id: id.to_string(),
            repository: "repo".to_string(),
            node_type,
            qualified_name: id.to_string(),
            file_path: "a.py".to_string(),
            properties: "{}".to_string(),
        }
    }

    fn edge(source: &str, target: Option<&str>, name: &str) -> EdgeRecord {
        EdgeRecord {
            repository: "repo".to_string(),
            source_node_id: source.to_string(),
            target_node_id: target.map(|t| t.to_string()),
            relation_type: RelationKind::Calls,
            target_name: name.to_string(),
            properties: "{}".to_string(),
        }
    }

    #[test]
    fn test_replace_graph_idempotent() {
        let mut store = Store::open_in_memory(8).unwrap();
        let nodes = vec![node("repo:a.py", NodeType::Module), node("repo:a.py:f", NodeType::Function)];
        store.replace_graph("repo", &nodes, &[]).unwrap();
        store.replace_graph("repo", &nodes, &[]).unwrap();
        assert_eq!(store.load_nodes("repo").unwrap().len(), 2);
    }

    #[test]
    fn test_replace_graph_drops_stale_rows() {
        let mut store = Store::open_in_memory(8).unwrap();
        store
            .replace_graph(
                "repo",
                &[node("repo:old.py", NodeType::Module)],
                &[edge("repo:old.py", None, "gone")],
            )
            .unwrap();
        store
            .replace_graph("repo", &[node("repo:new.py", NodeType::Module)], &[])
            .unwrap();

        let nodes = store.load_nodes("repo").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, "repo:new.py");
        assert!(store.load_edges("repo").unwrap().is_empty());
    }

    #[test]
    fn test_dangling_edges_excluded_from_ratio() {
        let mut store = Store::open_in_memory(8).unwrap();
        store
            .replace_graph(
                "repo",
                &[
                    node("repo:a.py:f", NodeType::Function),
                    node("repo:a.py:g", NodeType::Function),
                ],
                &[
                    edge("repo:a.py:f", Some("repo:a.py:g"), "g"),
                    edge("repo:a.py:g", None, "external_helper"),
                ],
            )
            .unwrap();

        let stats = store.graph_stats("repo").unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.dangling_count, 1);
        assert!((stats.edge_ratio - 0.5).abs() < 1e-9);
        assert!(!stats.low_connectivity);
    }

    #[test]
    fn test_low_connectivity_flagged() {
        let mut store = Store::open_in_memory(8).unwrap();
        let nodes: Vec<NodeRecord> = (0..10)
            .map(|i| node(&format!("repo:a.py:f{i}"), NodeType::Function))
            .collect();
        store
            .replace_graph("repo", &nodes, &[edge("repo:a.py:f0", Some("repo:a.py:f1"), "f1")])
            .unwrap();

        let stats = store.graph_stats("repo").unwrap();
        assert!(stats.low_connectivity, "1 edge for 10 nodes is unhealthy");
    }
}
