//! Node roles and the shared run state.

pub mod master;
pub mod worker;

pub use master::{MasterConfig, MasterNode};
pub use worker::WorkerNode;

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::control::{ControlError, StateSnapshot};
use crate::graph::Graph;
use crate::queue::QueueError;

/// Node errors.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Broker failure; fatal to the run
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Control channel failure
    #[error("control error: {0}")]
    Control(#[from] ControlError),

    /// Configuration collaborator failure
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// State snapshot carried an unknown phase discriminator
    #[error("invalid phase discriminator {0}")]
    InvalidPhase(u8),
}

pub type NodeResult<T> = Result<T, NodeError>;

/// Phases of one PageRank iteration. Travels as a `u8` discriminator
/// inside state snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Wait,
    Map,
    Collect,
    Reduce,
    Convergence,
}

impl Phase {
    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Phase {
    type Error = NodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Phase::Wait),
            1 => Ok(Phase::Map),
            2 => Ok(Phase::Collect),
            3 => Ok(Phase::Reduce),
            4 => Ok(Phase::Convergence),
            other => Err(NodeError::InvalidPhase(other)),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Wait => "Wait",
            Phase::Map => "Map",
            Phase::Collect => "Collect",
            Phase::Reduce => "Reduce",
            Phase::Convergence => "Convergence",
        };
        write!(f, "{name}")
    }
}

/// Run state: the graph being ranked, the damping and threshold
/// parameters, the current phase and the worker roster.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub graph: Graph,
    pub c: f64,
    pub threshold: f64,
    pub phase: Phase,
    pub others: Vec<String>,
}

impl State {
    /// Fresh Wait state with no run in progress.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Back to a fresh Wait with no graph loaded. The worker roster
    /// survives so the next run does not force a rejoin.
    pub fn reset(&mut self) {
        self.graph = Graph::new();
        self.c = 0.0;
        self.threshold = 0.0;
        self.phase = Phase::Wait;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            graph: self.graph.clone(),
            c: self.c,
            threshold: self.threshold,
            phase: self.phase.as_wire(),
            others: self.others.clone(),
        }
    }

    pub fn from_snapshot(snapshot: StateSnapshot) -> NodeResult<Self> {
        Ok(Self {
            graph: snapshot.graph,
            c: snapshot.c,
            threshold: snapshot.threshold,
            phase: Phase::try_from(snapshot.phase)?,
            others: snapshot.others,
        })
    }
}
