//! Peer-to-peer control channel.
//!
//! The master pushes state and membership updates to workers and
//! answers join handshakes over a length-prefixed bincode protocol
//! on TCP. Every call carries a deadline; a peer that cannot be
//! reached within it counts as crashed.

pub mod client;
pub mod codec;
pub mod server;

pub use client::PeerClient;
pub use server::{ControlHandler, ControlServer};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::Graph;
use crate::queue::QueueNames;

/// Control channel errors.
#[derive(Error, Debug)]
pub enum ControlError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame serialization or deserialization failed
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Frame larger than the protocol allows
    #[error("frame of {0} bytes exceeds the frame size limit")]
    Oversized(usize),

    /// The per-call deadline expired
    #[error("deadline of {0:?} expired")]
    Deadline(std::time::Duration),

    /// Connection closed before a response arrived
    #[error("connection closed mid-exchange")]
    Closed,
}

pub type ControlResult<T> = Result<T, ControlError>;

/// Full node state as it travels to workers. `phase` stays a `u8`
/// discriminator on the wire (0 = Wait through 4 = Convergence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub graph: Graph,
    pub c: f64,
    pub threshold: f64,
    pub phase: u8,
    pub others: Vec<String>,
}

/// Control requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Full snapshot delivery to a worker.
    StateUpdate(StateSnapshot),
    /// Membership-only delivery.
    MembershipUpdate(Vec<String>),
    /// Join handshake: a node announces its control endpoint.
    Join { endpoint: String },
    /// Liveness probe.
    Ping,
}

/// Control responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ack,
    JoinAccepted {
        queues: QueueNames,
        state: StateSnapshot,
    },
    Error(String),
}
