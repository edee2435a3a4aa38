//! Broker-backed work and result queues.
//!
//! The master publishes serialized jobs to the `work` queue and
//! consumes results from the `result` queue; workers do the
//! opposite. `WorkQueues` abstracts the broker so the same node code
//! runs against JetStream in production and against the in-process
//! broker in embedded runs and tests.

pub mod memory;
pub mod message;
pub mod nats;

pub use memory::MemoryWorkQueues;
pub use message::{Job, JobResult, MapEntry, ReduceEntry, CONTENT_TYPE};
pub use nats::NatsWorkQueues;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Queue errors.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Message serialization or deserialization failed
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Broker connection, publish, consume or ack failure
    #[error("broker error: {0}")]
    Broker(String),

    /// The shared publish deadline for a job batch expired
    #[error("publish deadline of {0:?} expired")]
    Deadline(std::time::Duration),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Names of the durable queues a network runs on. Workers receive
/// these in the join handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueNames {
    pub work: String,
    pub result: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            work: "work".to_string(),
            result: "result".to_string(),
        }
    }
}

/// A delivered message plus its acknowledgement handle.
pub struct Delivery {
    pub payload: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { payload, acker }
    }

    /// Acknowledge: the broker removes the message from the queue.
    pub async fn ack(self) -> QueueResult<()> {
        self.acker.ack().await
    }

    /// Negatively acknowledge without requeue: the broker drops the
    /// message instead of redelivering it.
    pub async fn reject(self) -> QueueResult<()> {
        self.acker.reject().await
    }
}

/// Broker-specific acknowledgement.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> QueueResult<()>;
    async fn reject(self: Box<Self>) -> QueueResult<()>;
}

/// Stream of deliveries from one queue.
pub type DeliveryStream = BoxStream<'static, QueueResult<Delivery>>;

/// The broker seam: publish and consume on the work/result queues.
#[async_trait]
pub trait WorkQueues: Send + Sync {
    /// Publish one serialized job to the work queue with persistent
    /// delivery.
    async fn publish_job(&self, job: &Job) -> QueueResult<()>;

    /// Publish one serialized result to the result queue.
    async fn publish_result(&self, result: &JobResult) -> QueueResult<()>;

    /// Consume the work queue (worker side, manual ack).
    async fn work_stream(&self) -> QueueResult<DeliveryStream>;

    /// Consume the result queue (master side, manual ack).
    async fn result_stream(&self) -> QueueResult<DeliveryStream>;

    /// Queue names, for the join handshake.
    fn names(&self) -> &QueueNames;
}
