// src/dag/node.rs

//! Nodes and the tasks they wrap.
//!
//! A [`Node`] pairs one [`Task`] with the synchronization state a run needs:
//! a [`Gate`] that releases when the node settles, a started flag, and a
//! tri-state outcome (success / cancelled / failed). Nodes live in the
//! [`TaskGraph`](crate::dag::TaskGraph) arena and are addressed by
//! [`NodeId`] handles; dependency edges are stored on the graph, not here.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use futures::FutureExt;
use petgraph::stable_graph::NodeIndex;

use crate::gate::Gate;

/// A unit of work scheduled through the graph.
///
/// The boxed future keeps the trait object-safe, so tasks can be stored as
/// `Arc<dyn Task>` and shared between an original node and its retry
/// replacement. Failures are reported as `anyhow` errors; the scheduler
/// records them on the node and cancels the dependent subtree.
pub trait Task: Send + Sync {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

/// Adapter turning a plain closure into a [`Task`].
///
/// Meant for short synchronous bodies; anything that needs to suspend
/// should implement [`Task`] directly.
pub struct FnTask<F> {
    f: F,
}

impl<F> Task for FnTask<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move { (self.f)() })
    }
}

/// Wrap a closure as a [`Task`].
pub fn task_fn<F>(f: F) -> FnTask<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    FnTask { f }
}

/// Stable handle to a node in a [`TaskGraph`](crate::dag::TaskGraph).
///
/// Handles stay valid for the lifetime of the graph they came from; using a
/// handle against a different graph is a misuse the arena will panic on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) NodeIndex);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0.index())
    }
}

const OUTCOME_PENDING: u8 = 0;
const OUTCOME_SUCCESS: u8 = 1;
const OUTCOME_CANCELLED: u8 = 2;
const OUTCOME_FAILED: u8 = 3;

/// One schedulable node: a task, its settle gate, and its lifecycle state.
///
/// State transitions exactly once into one of three terminal outcomes, and
/// `failed` and `cancelled` are mutually exclusive. The outcome is written
/// by the worker executing the node, except for the cancelled transition,
/// which a cascading thread may also perform; that transition uses a
/// compare-exchange so it can never overwrite a settled node.
pub struct Node {
    label: String,
    task: Option<Arc<dyn Task>>,
    gate: Gate,
    started: AtomicBool,
    outcome: AtomicU8,
    error: Mutex<Option<Arc<anyhow::Error>>>,
    terminal: bool,
}

impl Node {
    pub(crate) fn new(label: impl Into<String>, task: Option<Arc<dyn Task>>) -> Self {
        Self {
            label: label.into(),
            task,
            gate: Gate::new(),
            started: AtomicBool::new(false),
            outcome: AtomicU8::new(OUTCOME_PENDING),
            error: Mutex::new(None),
            terminal: false,
        }
    }

    pub(crate) fn new_terminal(label: impl Into<String>, task: Arc<dyn Task>) -> Self {
        let mut node = Self::new(label, Some(task));
        node.terminal = true;
        node
    }

    /// Display label used in logs and error messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Gate released when this node settles.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Whether a worker has picked this node up.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether the node reached any terminal state.
    pub fn finished(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) != OUTCOME_PENDING
    }

    /// True only once the task completed without error or cancellation.
    pub fn success(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) == OUTCOME_SUCCESS
    }

    /// Whether the node was cancelled before its task could run.
    pub fn cancelled(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) == OUTCOME_CANCELLED
    }

    /// Whether the node's own task failed.
    pub fn failed(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) == OUTCOME_FAILED
    }

    /// The recorded failure cause, if the task failed.
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub(crate) fn task(&self) -> Option<Arc<dyn Task>> {
        self.task.clone()
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Settle as success. Clears any stale error and wins over a concurrent
    /// cancel flag: a task that ran to completion did execute.
    pub(crate) fn mark_success(&self) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.outcome.store(OUTCOME_SUCCESS, Ordering::SeqCst);
    }

    /// Settle as failed, recording the cause.
    pub(crate) fn record_failure(&self, cause: Arc<anyhow::Error>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(cause);
        self.outcome.store(OUTCOME_FAILED, Ordering::SeqCst);
    }

    /// Flag as cancelled unless already settled. The terminal node is
    /// exempt: it must always run, or the finished notification would be
    /// lost. Returns whether the flag was newly set.
    pub(crate) fn try_cancel(&self) -> bool {
        if self.terminal {
            return false;
        }
        self.outcome
            .compare_exchange(
                OUTCOME_PENDING,
                OUTCOME_CANCELLED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Run the wrapped task. A panicking task surfaces as an ordinary task
    /// failure, so the cascade and retry machinery treat it like any other
    /// error.
    pub(crate) async fn run_task(&self) -> anyhow::Result<()> {
        let Some(task) = &self.task else {
            return Ok(());
        };
        match AssertUnwindSafe(task.run()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("task panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("label", &self.label)
            .field("started", &self.started())
            .field("finished", &self.finished())
            .field("success", &self.success())
            .field("cancelled", &self.cancelled())
            .field("failed", &self.failed())
            .field("terminal", &self.terminal)
            .finish()
    }
}
