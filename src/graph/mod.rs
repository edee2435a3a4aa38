//! Graph model for distributed PageRank.
//!
//! The master owns a `Graph` for the duration of a run. Every vertex
//! replicates the rank and out-degree of its upstream neighbors in
//! `in_links` so a worker can compute the vertex's contribution sum
//! from the job payload alone, without a lookup round-trip.

pub mod load;
pub mod rank;

pub use load::{from_edges, load_graph, parse_edge_list, GraphError, GraphResult};
pub use rank::single_node_pagerank;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Vertex identifiers as they appear in graph files and on the wire.
pub type VertexId = i32;

/// The master's working graph.
pub type Graph = HashMap<VertexId, GraphNode>;

/// Light replica of an upstream vertex. `rank` is authoritative only
/// within a single Map phase and must be refreshed whenever ranks
/// are committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InLink {
    pub rank: f64,
    pub out_degree: u32,
}

/// A vertex: current rank estimate, teleport weight and the replica
/// of its incoming neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub rank: f64,
    pub e: f64,
    pub in_links: HashMap<VertexId, InLink>,
    pub out_degree: u32,
}

/// Commit `new_ranks` into the graph and return the L1 distance to
/// the previously committed ranks.
pub fn commit_ranks(graph: &mut Graph, new_ranks: &HashMap<VertexId, f64>) -> f64 {
    let mut delta = 0.0;
    for (id, new_rank) in new_ranks {
        if let Some(node) = graph.get_mut(id) {
            delta += (new_rank - node.rank).abs();
            node.rank = *new_rank;
        }
    }
    delta
}

/// Refresh the in-link replicas so every `(j, link)` entry carries
/// `graph[j].rank` again. Must run after every rank commit.
pub fn refresh_in_links(graph: &mut Graph) {
    let ranks: HashMap<VertexId, f64> = graph.iter().map(|(&id, node)| (id, node.rank)).collect();
    for node in graph.values_mut() {
        for (source, link) in node.in_links.iter_mut() {
            if let Some(&rank) = ranks.get(source) {
                link.rank = rank;
            }
        }
    }
}

/// Scale ranks so they sum to 1.
pub fn normalize_ranks(graph: &mut Graph) {
    let sum: f64 = graph.values().map(|node| node.rank).sum();
    if sum > 0.0 {
        for node in graph.values_mut() {
            node.rank /= sum;
        }
    }
}

/// Current ranks keyed by vertex id.
pub fn ranks(graph: &Graph) -> HashMap<VertexId, f64> {
    graph.iter().map(|(&id, node)| (id, node.rank)).collect()
}
