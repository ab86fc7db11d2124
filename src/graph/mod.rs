/// Code graph construction and traversal.
///
/// The builder turns stored files and chunks into nodes and edges; the
/// adjacency index loads them into petgraph for caller/callee and path
/// queries.
pub mod adjacency;
pub mod builder;

pub use adjacency::GraphIndex;
pub use builder::{GraphBuild, GraphBuilder};
