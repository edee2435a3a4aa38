//! Distrank: distributed PageRank over a broker-backed worker pool
//!
//! A single master drives a phased map/reduce state machine
//! (Wait → Map → Collect → Reduce → Convergence) for the PageRank
//! fixpoint. Work travels to a dynamic pool of workers through a
//! durable work/result queue pair with manual acknowledgement, while
//! a peer-to-peer control channel fans state and membership updates
//! out to the workers and repairs the roster when peers crash. With
//! no workers on the roster the master computes PageRank locally
//! through the same iteration and convergence rule.
//!
//! # Architecture
//!
//! - `graph`: vertex model with in-link replicas, ingest, PageRank
//!   arithmetic
//! - `accumulator`: concurrent accumulator fed by the result
//!   consumer
//! - `partition`: round-robin subgraph split for job dispatch
//! - `queue`: broker seam, JetStream queues plus an in-process
//!   broker for embedded runs
//! - `control`: TCP control channel (state fan-out, membership,
//!   join handshake)
//! - `node`: the master phase machine and the worker loop
//! - `config`: the collaborator supplying `(c, threshold, graph)`
//!
//! # Example
//!
//! ```no_run
//! use distrank::graph;
//! use distrank::node::MasterNode;
//! use distrank::queue::MemoryWorkQueues;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let queues = Arc::new(MemoryWorkQueues::new());
//!     let master = Arc::new(MasterNode::new(queues));
//!
//!     let graph = graph::from_edges(&[(1, 2), (2, 1)]);
//!     master.load_run(0.85, 1e-6, graph).await;
//!
//!     let ranks = master.run_computation().await.unwrap();
//!     assert!((ranks[&1] - 0.5).abs() < 1e-6);
//! }
//! ```

#![warn(clippy::all)]

pub mod accumulator;
pub mod config;
pub mod control;
pub mod graph;
pub mod node;
pub mod partition;
pub mod queue;

// Re-export main types for convenience
pub use accumulator::RankAccumulator;

pub use config::{ConfigError, ConfigResult, ConfigSource, FileSource, PromptSource, RunInput};

pub use control::{
    ControlError, ControlHandler, ControlResult, ControlServer, PeerClient, Request, Response,
    StateSnapshot,
};

pub use graph::{Graph, GraphError, GraphNode, GraphResult, InLink, VertexId};

pub use node::{
    MasterConfig, MasterNode, NodeError, NodeResult, Phase, State, WorkerNode,
};

pub use queue::{
    Delivery, Job, JobResult, MemoryWorkQueues, NatsWorkQueues, QueueError, QueueNames,
    QueueResult, WorkQueues,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
