//! PageRank arithmetic shared by the single-node path and the
//! distributed convergence phase.

use std::collections::HashMap;

use tracing::debug;

use super::{commit_ranks, normalize_ranks, refresh_in_links, Graph, GraphNode, VertexId};

/// Contribution sum feeding a vertex: `Σ rank(j) / out_degree(j)`
/// over its in-link replicas. Sources without outgoing edges
/// contribute nothing.
pub fn contribution_sum(node: &GraphNode) -> f64 {
    node.in_links
        .values()
        .filter(|link| link.out_degree > 0)
        .map(|link| link.rank / link.out_degree as f64)
        .sum()
}

/// One synchronous sweep: `rank'(i) = c·Σ + (1−c)·e(i)` for every
/// vertex, from the current in-link replicas.
pub fn sweep(graph: &Graph, c: f64) -> HashMap<VertexId, f64> {
    graph
        .iter()
        .map(|(&id, node)| (id, c * contribution_sum(node) + (1.0 - c) * node.e))
        .collect()
}

/// Compute PageRank locally until the L1 distance between successive
/// rank vectors is at most `threshold`, then normalize so the ranks
/// sum to 1.
pub fn single_node_pagerank(graph: &mut Graph, c: f64, threshold: f64) {
    loop {
        let next = sweep(graph, c);
        let delta = commit_ranks(graph, &next);
        refresh_in_links(graph);
        debug!(delta, "local iteration complete");
        if delta <= threshold {
            break;
        }
    }
    normalize_ranks(graph);
}
