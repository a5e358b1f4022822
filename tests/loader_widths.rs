// tests/loader_widths.rs
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::strategy::{Just, Strategy, ValueTree};
use proptest::test_runner::TestRunner;
use taskdag::{Loader, NodeId, RunPhase, TaskGraph};
use taskdag_test_utils::callbacks::RecordingCallback;
use taskdag_test_utils::init_tracing;
use taskdag_test_utils::tasks::{RecordingTask, WaitTask};

type TestResult = Result<(), Box<dyn Error>>;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(6);

const LABELS: [&str; 9] = ["A", "B", "C", "D", "E", "F", "G", "H", "I"];

fn wire_sample_edges(graph: &mut TaskGraph, ids: &HashMap<&str, NodeId>) -> TestResult {
    graph.depends_on(ids["A"], &[ids["B"]])?;
    graph.depends_on(ids["B"], &[ids["C"]])?;
    graph.depends_on(ids["D"], &[ids["C"]])?;
    graph.depends_on(ids["F"], &[ids["B"]])?;
    graph.depends_on(ids["I"], &[ids["H"], ids["A"]])?;
    Ok(())
}

fn sample_graph(delay_ms: u64) -> (TaskGraph, HashMap<&'static str, NodeId>) {
    let mut graph = TaskGraph::new();
    let mut ids = HashMap::new();
    for label in LABELS {
        ids.insert(label, graph.add_task(label, WaitTask::millis(delay_ms)));
    }
    wire_sample_edges(&mut graph, &ids).unwrap();
    (graph, ids)
}

async fn run_settles_at_width(width: usize) -> TestResult {
    let callback = Arc::new(RecordingCallback::new());
    let loader = Loader::new(width);
    let (graph, ids) = sample_graph(20);

    loader.load(callback.clone(), graph)?;
    callback.wait_finished(SETTLE_TIMEOUT).await;

    assert_eq!(callback.finished_count(), 1);
    assert!(callback.node_errors().is_empty());
    assert!(callback.errors().is_empty());

    let graph = loader.graph().expect("a run was loaded");
    for (label, id) in ids {
        let node = graph.node(id);
        assert!(node.success(), "{label} should have succeeded");
        assert!(node.gate().is_released());
    }
    assert!(loader.await_termination(SETTLE_TIMEOUT).await);
    assert_eq!(loader.phase(), RunPhase::Terminated);
    Ok(())
}

#[tokio::test]
async fn sample_graph_settles_with_width_1() -> TestResult {
    init_tracing();
    run_settles_at_width(1).await
}

#[tokio::test]
async fn sample_graph_settles_with_width_2() -> TestResult {
    init_tracing();
    run_settles_at_width(2).await
}

#[tokio::test]
async fn sample_graph_settles_with_width_3() -> TestResult {
    init_tracing();
    run_settles_at_width(3).await
}

#[tokio::test]
async fn sample_graph_settles_with_width_5() -> TestResult {
    init_tracing();
    run_settles_at_width(5).await
}

#[tokio::test]
async fn sample_graph_settles_with_width_9() -> TestResult {
    init_tracing();
    run_settles_at_width(9).await
}

#[tokio::test]
async fn width_one_executes_a_chain_in_dependency_order() -> TestResult {
    init_tracing();

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = TaskGraph::new();
    let a = graph.add_task("A", RecordingTask::new("A", Arc::clone(&log), 10));
    let b = graph.add_task("B", RecordingTask::new("B", Arc::clone(&log), 10));
    let c = graph.add_task("C", RecordingTask::new("C", Arc::clone(&log), 10));
    graph.depends_on(a, &[b])?;
    graph.depends_on(b, &[c])?;

    let callback = Arc::new(RecordingCallback::new());
    let loader = Loader::new(1);
    loader.load(callback.clone(), graph)?;
    callback.wait_finished(SETTLE_TIMEOUT).await;

    assert_eq!(*log.lock().unwrap(), vec!["C", "B", "A"]);

    // The synthetic finish node trails everything in the resolved order.
    let order = loader.resolved_order();
    assert_eq!(order.len(), 4);
    let graph = loader.graph().expect("a run was loaded");
    assert_eq!(graph.node(order[3]).label(), "<finish>");

    assert!(loader.await_termination(SETTLE_TIMEOUT).await);
    Ok(())
}

#[tokio::test]
async fn width_one_runs_the_sample_graph_strictly_serially() -> TestResult {
    init_tracing();

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = TaskGraph::new();
    let mut ids = HashMap::new();
    for label in LABELS {
        ids.insert(label, graph.add_task(label, RecordingTask::new(label, Arc::clone(&log), 5)));
    }
    wire_sample_edges(&mut graph, &ids)?;

    let callback = Arc::new(RecordingCallback::new());
    let loader = Loader::new(1);
    loader.load(callback.clone(), graph)?;
    callback.wait_finished(SETTLE_TIMEOUT).await;

    let recorded = log.lock().unwrap().clone();
    assert_eq!(recorded.len(), LABELS.len());
    let position: HashMap<&str, usize> = recorded
        .iter()
        .enumerate()
        .map(|(pos, label)| (label.as_str(), pos))
        .collect();
    for (node, dep) in [("A", "B"), ("B", "C"), ("D", "C"), ("F", "B"), ("I", "H"), ("I", "A")] {
        assert!(position[dep] < position[node], "{dep} must run before {node}");
    }

    assert!(loader.await_termination(SETTLE_TIMEOUT).await);
    Ok(())
}

#[tokio::test]
async fn no_op_join_node_settles_as_success() -> TestResult {
    init_tracing();

    let mut graph = TaskGraph::new();
    let left = graph.add_task("left", taskdag::task_fn(|| Ok(())));
    let right = graph.add_task("right", taskdag::task_fn(|| Ok(())));
    let join = graph.add_node("join");
    let bottom = graph.add_task("bottom", WaitTask::millis(5));
    graph.depends_on(join, &[left, right])?;
    graph.depends_on(bottom, &[join])?;

    let callback = Arc::new(RecordingCallback::new());
    let loader = Loader::new(2);
    loader.load(callback.clone(), graph)?;

    assert!(loader.await_finished(SETTLE_TIMEOUT).await);
    assert_eq!(callback.finished_count(), 1);

    let graph = loader.graph().expect("a run was loaded");
    for id in [left, right, join, bottom] {
        assert!(graph.node(id).success());
    }
    assert!(loader.await_termination(SETTLE_TIMEOUT).await);
    Ok(())
}

#[tokio::test]
async fn zero_delay_runs_settle_for_shuffled_insertion_orders() -> TestResult {
    init_tracing();

    // Seeded shuffles keep the rounds reproducible.
    let mut runner = TestRunner::deterministic();
    let orders = Just(LABELS.to_vec()).prop_shuffle();
    for round in 0..20 {
        let shuffled = orders
            .new_tree(&mut runner)
            .expect("shuffle strategy never fails")
            .current();

        let mut graph = TaskGraph::new();
        let mut ids = HashMap::new();
        for label in shuffled {
            ids.insert(label, graph.add_task(label, WaitTask::millis(0)));
        }
        wire_sample_edges(&mut graph, &ids)?;

        let callback = Arc::new(RecordingCallback::new());
        let loader = Loader::new(3);
        loader.load(callback.clone(), graph)?;
        callback.wait_finished(SETTLE_TIMEOUT).await;

        assert_eq!(callback.finished_count(), 1, "round {round}");
        assert!(loader.await_termination(SETTLE_TIMEOUT).await, "round {round}");
    }
    Ok(())
}
