//! Worker node: consumes jobs from the work queue, runs the
//! map/reduce arithmetic and publishes partial results.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::control::{ControlHandler, Request, Response, StateSnapshot};
use crate::graph::VertexId;
use crate::queue::message::{JOB_TYPE_MAP, JOB_TYPE_REDUCE};
use crate::queue::{Job, JobResult, WorkQueues};

use super::{NodeResult, State};

/// A computing node. Holds the last state snapshot the master
/// pushed; the damping factor from it feeds the Reduce arithmetic.
pub struct WorkerNode {
    state: Arc<RwLock<State>>,
    queues: Arc<dyn WorkQueues>,
}

impl WorkerNode {
    pub fn new(queues: Arc<dyn WorkQueues>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::fresh())),
            queues,
        }
    }

    /// Seed the local state from a join handshake.
    pub async fn install_state(&self, snapshot: StateSnapshot) -> NodeResult<()> {
        let state = State::from_snapshot(snapshot)?;
        *self.state.write().await = state;
        Ok(())
    }

    /// The state as last pushed by the master.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.read().await.snapshot()
    }

    /// Consume the work queue until the stream ends or the task is
    /// aborted. Each job is computed, its result published, and only
    /// then acknowledged.
    pub async fn run(&self) -> NodeResult<()> {
        let mut stream = self.queues.work_stream().await?;
        info!("worker consuming work queue");
        while let Some(delivery) = stream.next().await {
            let delivery = delivery?;
            let job = match Job::decode(&delivery.payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!("dropping undecodable job: {e}");
                    delivery.reject().await?;
                    continue;
                }
            };
            let Some(values) = self.compute(&job).await else {
                warn!(job_type = job.job_type, "dropping job of unknown type");
                delivery.reject().await?;
                continue;
            };
            self.queues.publish_result(&JobResult { values }).await?;
            delivery.ack().await?;
        }
        Ok(())
    }

    /// Map jobs produce per-vertex contribution sums; Reduce jobs
    /// fold in the damping factor and teleport weight. Unknown job
    /// types produce `None`.
    async fn compute(&self, job: &Job) -> Option<HashMap<VertexId, f64>> {
        match job.job_type {
            JOB_TYPE_MAP => {
                let values = job
                    .map_data
                    .iter()
                    .map(|(&id, entry)| {
                        let sum: f64 = entry
                            .in_links
                            .values()
                            .filter(|link| link.out_degree > 0)
                            .map(|link| link.rank / link.out_degree as f64)
                            .sum();
                        (id, sum)
                    })
                    .collect();
                debug!(vertices = job.map_data.len(), "map job computed");
                Some(values)
            }
            JOB_TYPE_REDUCE => {
                let c = self.state.read().await.c;
                let values = job
                    .reduce_data
                    .iter()
                    .map(|(&id, entry)| (id, c * entry.sum + (1.0 - c) * entry.e))
                    .collect();
                debug!(vertices = job.reduce_data.len(), "reduce job computed");
                Some(values)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ControlHandler for WorkerNode {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::StateUpdate(snapshot) => match State::from_snapshot(snapshot) {
                Ok(new_state) => {
                    debug!(phase = %new_state.phase, "state update received");
                    *self.state.write().await = new_state;
                    Response::Ack
                }
                Err(e) => Response::Error(e.to_string()),
            },
            Request::MembershipUpdate(others) => {
                self.state.write().await.others = others;
                Response::Ack
            }
            Request::Ping => Response::Ack,
            Request::Join { .. } => Response::Error("not the master".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InLink;
    use crate::node::Phase;
    use crate::queue::{MapEntry, MemoryWorkQueues, ReduceEntry};

    fn worker() -> WorkerNode {
        WorkerNode::new(Arc::new(MemoryWorkQueues::new()))
    }

    #[tokio::test]
    async fn test_map_job_sums_in_links() {
        let worker = worker();
        let mut in_links = HashMap::new();
        in_links.insert(2, InLink { rank: 0.5, out_degree: 2 });
        in_links.insert(3, InLink { rank: 0.25, out_degree: 1 });
        // Dangling source must not contribute.
        in_links.insert(4, InLink { rank: 0.25, out_degree: 0 });
        let job = Job::map([(1, MapEntry { in_links })].into_iter().collect());

        let values = worker.compute(&job).await.unwrap();
        assert!((values[&1] - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_reduce_job_applies_damping() {
        let worker = worker();
        worker
            .handle(Request::StateUpdate(StateSnapshot {
                graph: HashMap::new(),
                c: 0.85,
                threshold: 1e-6,
                phase: Phase::Reduce.as_wire(),
                others: Vec::new(),
            }))
            .await;
        let job = Job::reduce([(7, ReduceEntry { sum: 0.4, e: 0.2 })].into_iter().collect());

        let values = worker.compute(&job).await.unwrap();
        assert!((values[&7] - (0.85 * 0.4 + 0.15 * 0.2)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unknown_job_type() {
        let worker = worker();
        let mut job = Job::map(HashMap::new());
        job.job_type = 9;
        assert!(worker.compute(&job).await.is_none());
    }

    #[tokio::test]
    async fn test_membership_update_replaces_roster() {
        let worker = worker();
        let response = worker
            .handle(Request::MembershipUpdate(vec!["a:1".to_string(), "b:2".to_string()]))
            .await;
        assert_eq!(response, Response::Ack);
        assert_eq!(worker.snapshot().await.others.len(), 2);
    }
}
