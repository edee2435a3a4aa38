//! Property-based tests for the accumulator and the convergence
//! behavior across randomly generated inputs.

use std::collections::HashMap;

use proptest::prelude::*;

use distrank::accumulator::RankAccumulator;
use distrank::graph::{self, rank, VertexId};

/// Strategy for contribution batches: (vertex, delta) pairs over a
/// small id space so keys collide often.
fn contribution_strategy() -> impl Strategy<Value = Vec<(VertexId, f64)>> {
    proptest::collection::vec((0i32..64, -1.0f64..1.0), 1..64)
}

/// Strategy for random directed graphs over up to 20 vertices.
fn edge_strategy() -> impl Strategy<Value = Vec<(VertexId, VertexId)>> {
    proptest::collection::vec((0i32..20, 0i32..20), 5..60)
}

fn apply(entries: &[(VertexId, f64)]) -> HashMap<VertexId, f64> {
    let acc = RankAccumulator::new();
    for &(id, delta) in entries {
        acc.increment(id, delta);
    }
    acc.snapshot()
}

proptest! {
    /// Permuting the arrival order of contributions leaves the
    /// accumulated totals unchanged up to floating-point reordering.
    #[test]
    fn accumulator_totals_are_order_independent(entries in contribution_strategy()) {
        let forward = apply(&entries);

        let mut reversed = entries.clone();
        reversed.reverse();
        let backward = apply(&reversed);

        prop_assert_eq!(forward.len(), backward.len());
        for (id, total) in &forward {
            let other = backward[id];
            prop_assert!((total - other).abs() <= 1e-9, "vertex {}: {} vs {}", id, total, other);
        }
    }

    /// Successive L1 deltas never increase: the damping factor makes
    /// each sweep a contraction.
    #[test]
    fn convergence_deltas_never_increase(
        edges in edge_strategy(),
        c in 0.5f64..0.95,
    ) {
        let mut graph = graph::from_edges(&edges);
        let mut deltas = Vec::new();
        for _ in 0..50 {
            let next = rank::sweep(&graph, c);
            let delta = graph::commit_ranks(&mut graph, &next);
            graph::refresh_in_links(&mut graph);
            deltas.push(delta);
            if delta < 1e-12 {
                break;
            }
        }

        for pair in deltas.windows(2) {
            prop_assert!(pair[1] <= pair[0] + 1e-9, "delta grew: {} -> {}", pair[0], pair[1]);
        }
    }

    /// Ranks stay finite and normalization lands on 1 for any input
    /// graph.
    #[test]
    fn normalized_ranks_sum_to_one(edges in edge_strategy(), c in 0.5f64..0.95) {
        let mut graph = graph::from_edges(&edges);
        rank::single_node_pagerank(&mut graph, c, 1e-6);

        let sum: f64 = graph.values().map(|node| node.rank).sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
        prop_assert!(graph.values().all(|node| node.rank.is_finite() && node.rank >= 0.0));
    }
}
