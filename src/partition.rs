//! Round-robin graph partitioning for job dispatch.

use crate::graph::Graph;

/// Number of jobs for a dispatching phase: never more than the
/// vertex count, never more than the worker count.
pub fn shard_count(workers: usize, vertices: usize) -> usize {
    workers.min(vertices)
}

/// Split `graph` into `shards` disjoint subgraphs whose union is the
/// whole graph. Vertices are dealt round-robin; no balancing beyond
/// that. The phase machine guarantees `1 <= shards <= |graph|`.
pub fn round_robin(graph: &Graph, shards: usize) -> Vec<Graph> {
    assert!(shards >= 1, "shard count must be at least 1");
    let mut parts: Vec<Graph> = vec![Graph::new(); shards];
    for (slot, (&id, node)) in graph.iter().enumerate() {
        parts[slot % shards].insert(id, node.clone());
    }
    parts
}
