//! Master node: the phase machine driving the PageRank fixpoint and
//! the coordination around it.
//!
//! One logical thread of control polls the phase machine every tick;
//! a second, spawned once per master lifetime, consumes the result
//! queue and feeds the accumulator; short-lived broadcast tasks fan
//! state updates out to the workers and are always joined before the
//! phase driver proceeds.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use async_trait::async_trait;

use crate::accumulator::RankAccumulator;
use crate::config::ConfigSource;
use crate::control::{ControlHandler, PeerClient, Request, Response, StateSnapshot};
use crate::graph::{self, VertexId};
use crate::partition;
use crate::queue::{Job, JobResult, MapEntry, QueueError, QueueNames, ReduceEntry, WorkQueues};

use super::{NodeResult, Phase, State};

/// Timing knobs of the master loop.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Phase-machine polling cadence.
    pub tick: Duration,
    /// Shared deadline for one batch of job publishes.
    pub publish_deadline: Duration,
    /// Per-peer deadline for control calls.
    pub rpc_deadline: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            publish_deadline: Duration::from_secs(5),
            rpc_deadline: Duration::from_secs(5),
        }
    }
}

/// The coordinating node. Owns the run state, dispatches work,
/// absorbs results and decides convergence.
pub struct MasterNode {
    state: Arc<RwLock<State>>,
    data: RankAccumulator,
    jobs: AtomicUsize,
    responses: AtomicUsize,
    consumer_started: AtomicBool,
    queues: Arc<dyn WorkQueues>,
    config: MasterConfig,
    source: Option<Box<dyn ConfigSource>>,
}

impl MasterNode {
    pub fn new(queues: Arc<dyn WorkQueues>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::fresh())),
            data: RankAccumulator::new(),
            jobs: AtomicUsize::new(0),
            responses: AtomicUsize::new(0),
            consumer_started: AtomicBool::new(false),
            queues,
            config: MasterConfig::default(),
            source: None,
        }
    }

    pub fn with_config(mut self, config: MasterConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the collaborator that supplies `(c, threshold, graph)`
    /// whenever Wait finds no graph loaded.
    pub fn with_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Load a run directly, bypassing the configuration collaborator.
    pub async fn load_run(&self, c: f64, threshold: f64, graph: graph::Graph) {
        let mut state = self.state.write().await;
        state.c = c;
        state.threshold = threshold;
        state.graph = graph;
        state.phase = Phase::Wait;
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    pub async fn roster(&self) -> Vec<String> {
        self.state.read().await.others.clone()
    }

    /// `(jobs, responses)` as last observed by the phase driver.
    pub fn counters(&self) -> (usize, usize) {
        (
            self.jobs.load(Ordering::SeqCst),
            self.responses.load(Ordering::SeqCst),
        )
    }

    /// The shared accumulator (clones view the same map).
    pub fn accumulator(&self) -> RankAccumulator {
        self.data.clone()
    }

    /// Drive the phase machine until stopped.
    pub async fn run(self: Arc<Self>) -> NodeResult<()> {
        Arc::clone(&self).start_result_consumer();
        loop {
            if let Some(ranks) = self.tick().await? {
                for (id, rank) in &ranks {
                    println!("{id} -> {rank:.6}");
                }
            }
            sleep(self.config.tick).await;
        }
    }

    /// Drive the phase machine until the loaded run terminates and
    /// return its normalized ranks.
    pub async fn run_computation(self: Arc<Self>) -> NodeResult<HashMap<VertexId, f64>> {
        Arc::clone(&self).start_result_consumer();
        loop {
            if let Some(ranks) = self.tick().await? {
                return Ok(ranks);
            }
            sleep(self.config.tick).await;
        }
    }

    /// Start the result consumer task. Idempotent; the run loops
    /// call this on entry.
    pub fn start_result_consumer(self: Arc<Self>) {
        if self.consumer_started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = self.consume_results().await {
                error!("result consumer stopped: {e}");
            }
        });
    }

    /// One pass of the phase machine. Returns the final ranks when a
    /// run terminates on this tick.
    pub async fn tick(&self) -> NodeResult<Option<HashMap<VertexId, f64>>> {
        let phase = self.state.read().await.phase;
        match phase {
            Phase::Wait => self.wait_phase().await,
            Phase::Map => {
                self.absorb_responses(Phase::Collect).await;
                Ok(None)
            }
            Phase::Collect => {
                self.collect_phase().await?;
                Ok(None)
            }
            Phase::Reduce => {
                self.absorb_responses(Phase::Convergence).await;
                Ok(None)
            }
            Phase::Convergence => Ok(self.convergence_phase().await),
        }
    }

    /// Map and Reduce are pure waiting states: the consumer task
    /// absorbs results, the machine only watches the counters.
    async fn absorb_responses(&self, next: Phase) {
        let jobs = self.jobs.load(Ordering::SeqCst);
        let responses = self.responses.load(Ordering::SeqCst);
        if responses == jobs {
            self.responses.store(0, Ordering::SeqCst);
            let mut state = self.state.write().await;
            info!(phase = %state.phase, jobs, "phase complete; switching to {next}");
            state.phase = next;
        }
    }

    async fn wait_phase(&self) -> NodeResult<Option<HashMap<VertexId, f64>>> {
        {
            let state = self.state.read().await;
            if state.graph.is_empty() {
                drop(state);
                self.fetch_configuration().await;
                return Ok(None);
            }
            if state.others.is_empty() {
                drop(state);
                return Ok(Some(self.single_node_run().await));
            }
        }
        self.broadcast_state().await;

        let mut state = self.state.write().await;
        if state.others.is_empty() {
            // Every worker crashed; the next tick takes the local path.
            return Ok(None);
        }
        let shards = partition::shard_count(state.others.len(), state.graph.len());
        let batch: Vec<Job> = partition::round_robin(&state.graph, shards)
            .into_iter()
            .map(|part| {
                Job::map(
                    part.into_iter()
                        .map(|(id, node)| (id, MapEntry { in_links: node.in_links }))
                        .collect(),
                )
            })
            .collect();
        self.responses.store(0, Ordering::SeqCst);
        self.publish_batch(batch).await?;
        state.phase = Phase::Map;
        info!(jobs = shards, "Wait phase complete; switching to Map");
        Ok(None)
    }

    async fn collect_phase(&self) -> NodeResult<()> {
        let has_workers = !self.state.read().await.others.is_empty();
        if has_workers {
            self.broadcast_state().await;
        }

        let mut state = self.state.write().await;
        if state.others.is_empty() {
            // Local finalization: fold the teleport term in directly
            // so Convergence observes finished ranks.
            let sums = self.data.take();
            let finished: HashMap<VertexId, f64> = state
                .graph
                .iter()
                .map(|(&id, node)| {
                    let sum = sums.get(&id).copied().unwrap_or(0.0);
                    (id, state.c * sum + (1.0 - state.c) * node.e)
                })
                .collect();
            self.data.replace(finished);
            state.phase = Phase::Convergence;
            info!("Collect phase finalized locally; switching to Convergence");
            return Ok(());
        }

        let sums = self.data.take();
        let shards = partition::shard_count(state.others.len(), state.graph.len());
        let batch: Vec<Job> = partition::round_robin(&state.graph, shards)
            .into_iter()
            .map(|part| {
                Job::reduce(
                    part.iter()
                        .map(|(&id, node)| {
                            let entry = ReduceEntry {
                                sum: sums.get(&id).copied().unwrap_or(0.0),
                                e: node.e,
                            };
                            (id, entry)
                        })
                        .collect(),
                )
            })
            .collect();
        self.responses.store(0, Ordering::SeqCst);
        self.publish_batch(batch).await?;
        state.phase = Phase::Reduce;
        info!(jobs = shards, "Collect phase complete; switching to Reduce");
        Ok(())
    }

    /// Convergence check: the L1 distance between the accumulated
    /// ranks and the committed ones decides iterate vs terminate.
    async fn convergence_phase(&self) -> Option<HashMap<VertexId, f64>> {
        let mut state = self.state.write().await;
        let new_ranks = self.data.take();
        let delta = graph::commit_ranks(&mut state.graph, &new_ranks);
        graph::refresh_in_links(&mut state.graph);

        if delta > state.threshold {
            info!(delta, "convergence check failed; iterating");
            state.phase = Phase::Wait;
            return None;
        }

        graph::normalize_ranks(&mut state.graph);
        let ranks = graph::ranks(&state.graph);
        info!(delta, vertices = ranks.len(), "convergence reached");
        state.reset();
        self.jobs.store(0, Ordering::SeqCst);
        self.responses.store(0, Ordering::SeqCst);
        Some(ranks)
    }

    /// Degenerate path: no workers on the roster, compute locally
    /// and finish the run.
    async fn single_node_run(&self) -> HashMap<VertexId, f64> {
        let mut state = self.state.write().await;
        let (c, threshold) = (state.c, state.threshold);
        graph::single_node_pagerank(&mut state.graph, c, threshold);
        let ranks = graph::ranks(&state.graph);
        info!(vertices = ranks.len(), "single-node run complete");
        state.reset();
        self.jobs.store(0, Ordering::SeqCst);
        self.responses.store(0, Ordering::SeqCst);
        self.data.reset();
        ranks
    }

    /// Obtain `(c, threshold, graph)` from the configuration
    /// collaborator. Failures stay at this boundary: log and retry
    /// on a later tick.
    async fn fetch_configuration(&self) {
        let Some(source) = &self.source else {
            return;
        };
        match source.load().await {
            Ok(input) => {
                self.data.reset();
                let mut state = self.state.write().await;
                state.c = input.c;
                state.threshold = input.threshold;
                state.graph = input.graph;
                info!(vertices = state.graph.len(), "configuration loaded");
            }
            Err(e) => warn!("configuration not loaded, retrying later: {e}"),
        }
    }

    /// Publish one batch under the shared deadline. `jobs` is set
    /// only after every publish has succeeded.
    async fn publish_batch(&self, batch: Vec<Job>) -> NodeResult<()> {
        let count = batch.len();
        let deadline = self.config.publish_deadline;
        timeout(deadline, async {
            for job in &batch {
                self.queues.publish_job(job).await?;
            }
            Ok::<(), QueueError>(())
        })
        .await
        .map_err(|_| QueueError::Deadline(deadline))??;
        self.jobs.store(count, Ordering::SeqCst);
        Ok(())
    }

    /// Push the current state to every worker concurrently. Peers
    /// that fail to answer are dropped; the survivor list replaces
    /// the roster only after every attempt has finished.
    async fn broadcast_state(&self) {
        let snapshot = self.state.read().await.snapshot();
        if snapshot.others.is_empty() {
            return;
        }
        let survivors = broadcast(
            Request::StateUpdate(snapshot.clone()),
            &snapshot.others,
            self.config.rpc_deadline,
        )
        .await;

        let mut state = self.state.write().await;
        if survivors.len() < state.others.len() {
            info!(
                before = state.others.len(),
                after = survivors.len(),
                "worker roster shrank"
            );
        }
        state.others = survivors;
    }

    /// Long-running result consumer: fold every contribution in,
    /// acknowledge, then count the response. The counter increment
    /// comes last so the phase driver never observes a response
    /// whose contributions are missing from the accumulator.
    async fn consume_results(&self) -> NodeResult<()> {
        let mut stream = self.queues.result_stream().await?;
        info!("result consumer registered");
        while let Some(delivery) = stream.next().await {
            let delivery = delivery?;
            let result = match JobResult::decode(&delivery.payload) {
                Ok(result) => result,
                Err(e) => {
                    warn!("dropping undecodable result: {e}");
                    delivery.reject().await?;
                    continue;
                }
            };
            for (id, value) in result.values {
                self.data.increment(id, value);
            }
            delivery.ack().await?;
            self.responses.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Admit a worker: record its endpoint, hand back the queue
    /// names and the current state, and fan the new roster out to
    /// the previously known workers.
    pub async fn register_worker(&self, endpoint: String) -> (QueueNames, StateSnapshot) {
        let snapshot = {
            let mut state = self.state.write().await;
            if !state.others.contains(&endpoint) {
                state.others.push(endpoint.clone());
            }
            info!(%endpoint, workers = state.others.len(), "worker joined");
            state.snapshot()
        };

        let peers: Vec<String> = snapshot
            .others
            .iter()
            .filter(|peer| **peer != endpoint)
            .cloned()
            .collect();
        if !peers.is_empty() {
            // Membership-only update; the full state follows with the
            // next phase transition.
            let roster = snapshot.others.clone();
            let deadline = self.config.rpc_deadline;
            tokio::spawn(async move {
                broadcast(Request::MembershipUpdate(roster), &peers, deadline).await;
            });
        }

        (self.queues.names().clone(), snapshot)
    }
}

#[async_trait]
impl ControlHandler for MasterNode {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Join { endpoint } => {
                let (queues, state) = self.register_worker(endpoint).await;
                Response::JoinAccepted { queues, state }
            }
            Request::Ping => Response::Ack,
            Request::StateUpdate(_) | Request::MembershipUpdate(_) => {
                Response::Error("master does not accept state updates".to_string())
            }
        }
    }
}

/// Best-effort fan-out of one request; returns the endpoints that
/// acknowledged, in their original roster order. Completes only
/// after every peer attempt has finished.
async fn broadcast(request: Request, peers: &[String], deadline: Duration) -> Vec<String> {
    let mut tasks = JoinSet::new();
    for endpoint in peers.iter().cloned() {
        let request = request.clone();
        tasks.spawn(async move {
            let client = PeerClient::new(endpoint.clone(), deadline);
            match client.call(&request).await {
                Ok(Response::Error(e)) => {
                    warn!(%endpoint, "peer rejected update: {e}");
                    None
                }
                Ok(_) => Some(endpoint),
                Err(e) => {
                    warn!(%endpoint, "peer unreachable: {e}");
                    None
                }
            }
        });
    }

    let mut alive = HashSet::new();
    while let Some(task) = tasks.join_next().await {
        if let Ok(Some(endpoint)) = task {
            alive.insert(endpoint);
        }
    }
    peers
        .iter()
        .filter(|peer| alive.contains(*peer))
        .cloned()
        .collect()
}
