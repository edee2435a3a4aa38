//! End-to-end runs over the in-process broker with real TCP control
//! channels on ephemeral ports.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use distrank::control::{ControlResult, ControlServer};
use distrank::graph::{self, VertexId};
use distrank::node::{MasterConfig, MasterNode, Phase, WorkerNode};
use distrank::queue::{JobResult, MemoryWorkQueues, WorkQueues};

fn fast() -> MasterConfig {
    MasterConfig {
        tick: Duration::from_millis(5),
        publish_deadline: Duration::from_secs(5),
        rpc_deadline: Duration::from_millis(500),
    }
}

/// Edges all pointing at vertex 0.
fn star_edges() -> Vec<(VertexId, VertexId)> {
    vec![(1, 0), (2, 0), (3, 0), (4, 0)]
}

struct TestWorker {
    endpoint: String,
    server: JoinHandle<ControlResult<()>>,
    runner: JoinHandle<()>,
}

impl TestWorker {
    async fn spawn(queues: Arc<MemoryWorkQueues>, master: &MasterNode) -> Self {
        let worker = Arc::new(WorkerNode::new(queues));
        let server = ControlServer::bind("127.0.0.1:0").await.unwrap();
        let endpoint = server.local_addr().unwrap().to_string();
        let server = server.spawn(worker.clone());

        let (_names, state) = master.register_worker(endpoint.clone()).await;
        worker.install_state(state).await.unwrap();

        let runner = tokio::spawn(async move {
            let _ = worker.run().await;
        });
        Self {
            endpoint,
            server,
            runner,
        }
    }

    /// Tear the worker down abruptly: control endpoint and queue
    /// consumption both stop answering.
    fn crash(&self) {
        self.server.abort();
        self.runner.abort();
    }
}

impl Drop for TestWorker {
    fn drop(&mut self) {
        self.crash();
    }
}

/// Poll the counters until `responses` reaches `expected`, checking
/// the `responses <= jobs` invariant at every observation.
async fn wait_for_responses(master: &MasterNode, expected: usize) {
    for _ in 0..2000 {
        let (jobs, responses) = master.counters();
        assert!(responses <= jobs, "responses {responses} exceeded jobs {jobs}");
        if responses == expected {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("responses never reached {expected}");
}

/// Tick the machine until the run terminates.
async fn drive_to_completion(master: &Arc<MasterNode>) -> HashMap<VertexId, f64> {
    for _ in 0..20_000 {
        if let Some(ranks) = master.tick().await.unwrap() {
            return ranks;
        }
        sleep(Duration::from_millis(2)).await;
    }
    panic!("run did not terminate");
}

/// Reference result from the local path with identical parameters.
fn local_reference(edges: &[(VertexId, VertexId)], c: f64, threshold: f64) -> HashMap<VertexId, f64> {
    let mut graph = graph::from_edges(edges);
    graph::single_node_pagerank(&mut graph, c, threshold);
    graph::ranks(&graph)
}

#[tokio::test]
async fn test_trivial_graph_no_workers() {
    let master = Arc::new(
        MasterNode::new(Arc::new(MemoryWorkQueues::new())).with_config(fast()),
    );
    master.load_run(0.85, 1e-6, graph::from_edges(&[(1, 2), (2, 1)])).await;

    let ranks = timeout(Duration::from_secs(10), master.run_computation())
        .await
        .unwrap()
        .unwrap();

    assert!((ranks[&1] - 0.5).abs() < 1e-6);
    assert!((ranks[&2] - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn test_star_graph_two_workers() {
    let queues = Arc::new(MemoryWorkQueues::new());
    let master = Arc::new(MasterNode::new(queues.clone()).with_config(fast()));
    let _w1 = TestWorker::spawn(queues.clone(), &master).await;
    let _w2 = TestWorker::spawn(queues.clone(), &master).await;

    master.load_run(0.85, 1e-6, graph::from_edges(&star_edges())).await;
    let ranks = timeout(Duration::from_secs(30), master.clone().run_computation())
        .await
        .unwrap()
        .unwrap();

    let sum: f64 = ranks.values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
    for id in 1..=4 {
        assert!(ranks[&0] > ranks[&id]);
        assert!((ranks[&id] - ranks[&1]).abs() < 1e-9);
    }

    // The distributed run agrees with the local path.
    let reference = local_reference(&star_edges(), 0.85, 1e-6);
    for (id, rank) in &ranks {
        assert!((rank - reference[id]).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_worker_crash_mid_run() {
    let queues = Arc::new(MemoryWorkQueues::new());
    let master = Arc::new(MasterNode::new(queues.clone()).with_config(fast()));
    let w1 = TestWorker::spawn(queues.clone(), &master).await;
    let w2 = TestWorker::spawn(queues.clone(), &master).await;

    master.load_run(0.85, 1e-6, graph::from_edges(&star_edges())).await;
    master.clone().start_result_consumer();

    // First Map round goes to both workers.
    master.tick().await.unwrap();
    assert_eq!(master.phase().await, Phase::Map);
    let (jobs, _) = master.counters();
    assert_eq!(jobs, 2);
    wait_for_responses(&master, 2).await;

    // One worker dies; the next broadcast must evict it and the run
    // must still finish on the survivor.
    w2.crash();
    sleep(Duration::from_millis(20)).await;
    let ranks = drive_to_completion(&master).await;

    assert_eq!(master.roster().await, vec![w1.endpoint.clone()]);
    let reference = local_reference(&star_edges(), 0.85, 1e-6);
    for (id, rank) in &ranks {
        assert!((rank - reference[id]).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_all_workers_crash_before_collect() {
    let queues = Arc::new(MemoryWorkQueues::new());
    let master = Arc::new(MasterNode::new(queues.clone()).with_config(fast()));
    let w1 = TestWorker::spawn(queues.clone(), &master).await;
    let w2 = TestWorker::spawn(queues.clone(), &master).await;

    master.load_run(0.85, 1e-6, graph::from_edges(&star_edges())).await;
    master.clone().start_result_consumer();

    master.tick().await.unwrap();
    assert_eq!(master.phase().await, Phase::Map);
    wait_for_responses(&master, 2).await;

    w1.crash();
    w2.crash();
    sleep(Duration::from_millis(20)).await;

    // Map completes on the counters, then Collect finds the whole
    // fleet gone and finalizes locally instead of publishing zero
    // jobs.
    master.tick().await.unwrap();
    assert_eq!(master.phase().await, Phase::Collect);
    master.tick().await.unwrap();
    assert_eq!(master.phase().await, Phase::Convergence);
    assert!(master.roster().await.is_empty());

    let ranks = drive_to_completion(&master).await;
    let sum: f64 = ranks.values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_zero_threshold_iterates_again() {
    let queues = Arc::new(MemoryWorkQueues::new());
    let master = Arc::new(MasterNode::new(queues.clone()).with_config(fast()));
    let _w1 = TestWorker::spawn(queues.clone(), &master).await;

    // Asymmetric cycle: the first sweep moves every rank.
    let edges = vec![(1, 2), (2, 1), (1, 3), (3, 1)];
    master.load_run(0.85, 0.0, graph::from_edges(&edges)).await;
    master.clone().start_result_consumer();

    let mut map_rounds = 0;
    for _ in 0..5000 {
        let before = master.phase().await;
        master.tick().await.unwrap();
        let after = master.phase().await;
        if before == Phase::Wait && after == Phase::Map {
            map_rounds += 1;
            if map_rounds == 2 {
                break;
            }
        }
        sleep(Duration::from_millis(2)).await;
    }
    assert!(map_rounds >= 2, "expected at least two full iterations");
}

#[tokio::test]
async fn test_result_order_is_irrelevant() {
    // Dyadic values keep the sums exact, so the comparison can be
    // bitwise.
    let shards = vec![
        JobResult {
            values: [(1, 0.25), (2, 0.5)].into_iter().collect(),
        },
        JobResult {
            values: [(1, 0.125), (3, 0.75)].into_iter().collect(),
        },
        JobResult {
            values: [(2, 0.0625), (3, 0.25)].into_iter().collect(),
        },
    ];

    let forward = accumulate(shards.clone()).await;
    let mut reordered = shards;
    reordered.reverse();
    let backward = accumulate(reordered).await;

    assert_eq!(forward, backward);
}

/// Feed results through the broker and the master's consumer, then
/// snapshot the accumulator sorted by vertex.
async fn accumulate(results: Vec<JobResult>) -> Vec<(VertexId, f64)> {
    let queues = Arc::new(MemoryWorkQueues::new());
    let master = Arc::new(MasterNode::new(queues.clone()).with_config(fast()));
    let expected = results.len();

    for result in &results {
        queues.publish_result(result).await.unwrap();
    }
    master.clone().start_result_consumer();

    let accumulator = master.accumulator();
    for _ in 0..2000 {
        let (_, responses) = master.counters();
        if responses == expected {
            let mut snapshot: Vec<(VertexId, f64)> =
                accumulator.snapshot().into_iter().collect();
            snapshot.sort_by_key(|(id, _)| *id);
            return snapshot;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("consumer never absorbed {expected} results");
}
