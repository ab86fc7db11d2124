/// In-memory adjacency index over the stored graph.
///
/// Only resolved edges participate; dangling references have no node to
/// connect to. Path queries treat the graph as undirected so "how are
/// these two related" works regardless of call direction.
use std::collections::{HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::store::models::{EdgeRecord, NodeRecord, RelationKind};

pub struct GraphIndex {
    graph: DiGraph<NodeRecord, RelationKind>,
    by_id: HashMap<String, NodeIndex>,
}

impl GraphIndex {
    pub fn new(nodes: Vec<NodeRecord>, edges: &[EdgeRecord]) -> Self {
        let mut graph = DiGraph::new();
        let mut by_id = HashMap::new();

        for node in nodes {
            let id = node.node_id.clone();
            let idx = graph.add_node(node);
            by_id.insert(id, idx);
        }

        for edge in edges {
            let Some(target_id) = &edge.target_node_id else {
                continue;
            };
            let (Some(&source), Some(&target)) =
                (by_id.get(&edge.source_node_id), by_id.get(target_id))
            else {
                continue;
            };
            graph.add_edge(source, target, edge.relation_type);
        }

        Self { graph, by_id }
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeRecord> {
        self.by_id.get(node_id).map(|&idx| &self.graph[idx])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Nodes with a `calls` edge into the given node.
    pub fn callers(&self, node_id: &str) -> Vec<&NodeRecord> {
        self.relation_neighbors(node_id, Direction::Incoming, RelationKind::Calls)
    }

    /// Nodes the given node `calls`.
    pub fn callees(&self, node_id: &str) -> Vec<&NodeRecord> {
        self.relation_neighbors(node_id, Direction::Outgoing, RelationKind::Calls)
    }

    fn relation_neighbors(
        &self,
        node_id: &str,
        direction: Direction,
        relation: RelationKind,
    ) -> Vec<&NodeRecord> {
        let Some(&idx) = self.by_id.get(node_id) else {
            return Vec::new();
        };
        let mut out: Vec<&NodeRecord> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| *e.weight() == relation)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                &self.graph[other]
            })
            .collect();
        out.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        out.dedup_by(|a, b| a.node_id == b.node_id);
        out
    }

    /// Shortest undirected path between two nodes, as node ids.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let (&start, &goal) = (self.by_id.get(from)?, self.by_id.get(to)?);
        if start == goal {
            return Some(vec![from.to_string()]);
        }

        let mut predecessor: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        'bfs: while let Some(current) = queue.pop_front() {
            for neighbor in self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .chain(self.graph.neighbors_directed(current, Direction::Incoming))
            {
                if neighbor == start || predecessor.contains_key(&neighbor) {
                    continue;
                }
                predecessor.insert(neighbor, current);
                if neighbor == goal {
                    break 'bfs;
                }
                queue.push_back(neighbor);
            }
        }

        predecessor.get(&goal)?;
        let mut path = vec![goal];
        while let Some(&prev) = predecessor.get(path.last()?) {
            path.push(prev);
            if prev == start {
                break;
            }
        }
        path.reverse();
        Some(
            path.into_iter()
                .map(|idx| self.graph[idx].node_id.clone())
                .collect(),
        )
    }
}
