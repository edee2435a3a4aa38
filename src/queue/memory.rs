//! In-process broker for embedded single-machine runs and tests.
//!
//! Delivery semantics mirror the JetStream backend: one consumer
//! receives each message, acknowledgement is manual (and here a
//! no-op, since nothing is redelivered).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{mpsc, Mutex};

use super::{
    Acker, Delivery, DeliveryStream, Job, JobResult, QueueError, QueueNames, QueueResult,
    WorkQueues,
};

/// One in-memory queue. Competing consumers share the receiver; a
/// message goes to whichever consumer holds the lock when it lands.
#[derive(Clone)]
struct Channel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl Channel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    fn publish(&self, payload: Vec<u8>) -> QueueResult<()> {
        self.tx
            .send(payload)
            .map_err(|_| QueueError::Broker("queue closed".to_string()))
    }

    fn stream(&self) -> DeliveryStream {
        let rx = Arc::clone(&self.rx);
        Box::pin(stream::unfold(rx, |rx| async move {
            let payload = rx.lock().await.recv().await?;
            let delivery = Delivery::new(payload, Box::new(MemoryAcker));
            Some((Ok(delivery), rx))
        }))
    }
}

struct MemoryAcker;

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> QueueResult<()> {
        Ok(())
    }

    async fn reject(self: Box<Self>) -> QueueResult<()> {
        Ok(())
    }
}

/// In-process work/result queue pair.
pub struct MemoryWorkQueues {
    names: QueueNames,
    work: Channel,
    result: Channel,
}

impl MemoryWorkQueues {
    pub fn new() -> Self {
        Self {
            names: QueueNames::default(),
            work: Channel::new(),
            result: Channel::new(),
        }
    }
}

impl Default for MemoryWorkQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueues for MemoryWorkQueues {
    async fn publish_job(&self, job: &Job) -> QueueResult<()> {
        self.work.publish(job.encode()?)
    }

    async fn publish_result(&self, result: &JobResult) -> QueueResult<()> {
        self.result.publish(result.encode()?)
    }

    async fn work_stream(&self) -> QueueResult<DeliveryStream> {
        Ok(self.work.stream())
    }

    async fn result_stream(&self) -> QueueResult<DeliveryStream> {
        Ok(self.result.stream())
    }

    fn names(&self) -> &QueueNames {
        &self.names
    }
}
