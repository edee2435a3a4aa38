//! JetStream-backed queues: durable streams with work-queue
//! retention, persistent file storage and explicit acknowledgement.

use async_nats::jetstream::{self, consumer, consumer::pull, stream, AckKind};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{info, warn};

use super::{
    Acker, Delivery, DeliveryStream, Job, JobResult, QueueError, QueueNames, QueueResult,
    WorkQueues, CONTENT_TYPE,
};

/// Durable consumer name for the master's result subscription.
const RESULT_CONSUMER: &str = "master";
/// Durable consumer name shared by all workers; JetStream balances
/// deliveries across the subscribers of one durable.
const WORK_CONSUMER: &str = "workers";

/// JetStream work/result queue pair.
pub struct NatsWorkQueues {
    context: jetstream::Context,
    names: QueueNames,
}

impl NatsWorkQueues {
    /// Connect to the broker and declare both durable queues.
    pub async fn connect(url: &str, names: QueueNames) -> QueueResult<Self> {
        let client = async_nats::connect(url).await.map_err(broker_err)?;
        let queues = Self {
            context: jetstream::new(client),
            names,
        };
        queues.declare(&queues.names.work).await?;
        queues.declare(&queues.names.result).await?;
        info!(url, work = %queues.names.work, result = %queues.names.result, "broker queues declared");
        Ok(queues)
    }

    /// Idempotently declare one durable work-queue stream.
    async fn declare(&self, name: &str) -> QueueResult<()> {
        self.context
            .get_or_create_stream(stream::Config {
                name: name.to_string(),
                subjects: vec![name.to_string().into()],
                retention: stream::RetentionPolicy::WorkQueue,
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(broker_err)?;
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> QueueResult<()> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Content-Type", CONTENT_TYPE);
        self.context
            .publish_with_headers(subject.to_string(), headers, payload.into())
            .await
            .map_err(broker_err)?
            .await
            .map_err(broker_err)?;
        Ok(())
    }

    async fn subscribe(&self, name: &str, durable: &str) -> QueueResult<DeliveryStream> {
        let stream = self.context.get_stream(name).await.map_err(broker_err)?;
        let consumer = stream
            .get_or_create_consumer(
                durable,
                pull::Config {
                    durable_name: Some(durable.to_string()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(broker_err)?;
        let messages = consumer.messages().await.map_err(broker_err)?;
        Ok(Box::pin(messages.map(|item| match item {
            Ok(message) => {
                let payload = message.payload.to_vec();
                Ok(Delivery::new(payload, Box::new(NatsAcker { message })))
            }
            Err(e) => {
                warn!("broker stream error: {e}");
                Err(broker_err(e))
            }
        })))
    }
}

#[async_trait]
impl WorkQueues for NatsWorkQueues {
    async fn publish_job(&self, job: &Job) -> QueueResult<()> {
        self.publish(&self.names.work, job.encode()?).await
    }

    async fn publish_result(&self, result: &JobResult) -> QueueResult<()> {
        self.publish(&self.names.result, result.encode()?).await
    }

    async fn work_stream(&self) -> QueueResult<DeliveryStream> {
        self.subscribe(&self.names.work, WORK_CONSUMER).await
    }

    async fn result_stream(&self) -> QueueResult<DeliveryStream> {
        self.subscribe(&self.names.result, RESULT_CONSUMER).await
    }

    fn names(&self) -> &QueueNames {
        &self.names
    }
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acker for NatsAcker {
    async fn ack(self: Box<Self>) -> QueueResult<()> {
        self.message.ack().await.map_err(broker_err)
    }

    async fn reject(self: Box<Self>) -> QueueResult<()> {
        // Term stops redelivery: an undecodable message must not
        // circulate back into the queue.
        self.message.ack_with(AckKind::Term).await.map_err(broker_err)
    }
}

fn broker_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Broker(e.to_string())
}
