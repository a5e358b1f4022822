// src/loader/mod.rs

//! Scheduler driving a graph through the worker pool.
//!
//! A [`Loader`] owns the pool and, per run, the resolved node order. `load`
//! resolves the graph, appends a synthetic terminal node depending on every
//! resolved node, and submits everything FIFO in resolved order; dependency
//! order during execution is enforced purely by the node gates. Failures
//! are classified by the per-node job wrapper: a task failure cancels the
//! failing node's subtree and is reported through
//! [`LoaderCallback::on_node_error`]; anything else cancels the whole run
//! and is reported through [`LoaderCallback::on_error`]. `retry` rebuilds
//! the failed subtree as fresh nodes and runs it as a new load.

pub mod callback;
mod retry;

pub use callback::{LoaderCallback, NoopCallback};

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::dag::{NodeId, Task, TaskGraph, WAIT_SLICE, resolve};
use crate::errors::{Result, TaskDagError};
use crate::exec::{Job, TokioWorkerPool, WorkerPool};

/// Tuning knobs for a [`Loader`].
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Worker-pool width (clamped to at least 1).
    pub width: usize,
    /// Slice length for the await polls.
    pub poll_interval: Duration,
    /// Slice length for dependency-gate waits inside node execution.
    pub wait_slice: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            width: 1,
            poll_interval: Duration::from_millis(100),
            wait_slice: WAIT_SLICE,
        }
    }
}

/// Phase of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Resolving,
    Running,
    Cancelling,
    Draining,
    Terminated,
}

/// Everything a submitted job needs to know about its run.
struct RunContext {
    graph: Arc<TaskGraph>,
    resolved: Vec<NodeId>,
    terminal: NodeId,
    callback: Arc<dyn LoaderCallback>,
    failed: Mutex<Vec<NodeId>>,
    pool: Arc<dyn WorkerPool>,
}

struct LoaderState {
    phase: RunPhase,
    run: Option<Arc<RunContext>>,
}

/// Scheduler for one graph at a time.
///
/// One `load` per instance; after a failure, `retry` starts the next run.
/// All methods take `&self`; a `Loader` can be shared behind an `Arc` and
/// driven from several tasks.
pub struct Loader {
    pool: Arc<dyn WorkerPool>,
    options: LoaderOptions,
    state: Mutex<LoaderState>,
}

impl Loader {
    /// Loader with a freshly spawned [`TokioWorkerPool`] of `width`
    /// workers. Must be called from within a tokio runtime.
    pub fn new(width: usize) -> Self {
        Self::with_options(LoaderOptions {
            width,
            ..LoaderOptions::default()
        })
    }

    /// Loader with explicit options and a fresh [`TokioWorkerPool`].
    pub fn with_options(options: LoaderOptions) -> Self {
        let pool = Arc::new(TokioWorkerPool::new(options.width));
        Self::with_pool(pool, options)
    }

    /// Loader over a caller-supplied pool; the seam tests use to
    /// substitute pool implementations.
    pub fn with_pool(pool: Arc<dyn WorkerPool>, options: LoaderOptions) -> Self {
        Self {
            pool,
            options,
            state: Mutex::new(LoaderState {
                phase: RunPhase::Idle,
                run: None,
            }),
        }
    }

    /// Resolve `graph` and submit every node for execution.
    ///
    /// Fails with [`TaskDagError::IllegalState`] if a run was already
    /// loaded on this instance, and with
    /// [`TaskDagError::CircularDependency`] if resolution finds an indirect
    /// cycle; in that case nothing was submitted and the instance stays
    /// usable. A pool that rejects a submission mid-load cancels the
    /// partially-submitted run and surfaces
    /// [`TaskDagError::Interrupted`]. `callback` receives the run's
    /// notifications.
    pub fn load(&self, callback: Arc<dyn LoaderCallback>, mut graph: TaskGraph) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.phase != RunPhase::Idle {
                return Err(TaskDagError::IllegalState(
                    "a graph is already loaded; use retry() to run again".into(),
                ));
            }
            state.phase = RunPhase::Resolving;
        }

        let mut resolved = match resolve(&graph) {
            Ok(order) => order,
            Err(err) => {
                self.lock_state().phase = RunPhase::Idle;
                return Err(err);
            }
        };

        let terminal = graph.add_terminal(
            "<finish>",
            Arc::new(NotifyFinished {
                callback: Arc::clone(&callback),
            }),
        );
        if let Err(err) = graph.depends_on(terminal, &resolved) {
            self.lock_state().phase = RunPhase::Idle;
            return Err(err);
        }
        resolved.push(terminal);

        info!(nodes = resolved.len(), "graph resolved; submitting run");
        let context = Arc::new(RunContext {
            graph: Arc::new(graph),
            resolved,
            terminal,
            callback,
            failed: Mutex::new(Vec::new()),
            pool: Arc::clone(&self.pool),
        });
        self.lock_state().run = Some(Arc::clone(&context));

        for &id in &context.resolved {
            let job = node_job(
                Arc::clone(&context),
                id,
                self.pool.stop_watch(),
                self.options.wait_slice,
            );
            if let Err(err) = self.pool.submit(job) {
                error!(error = %err, "submission failed; cancelling run");
                self.pool.shutdown();
                for &node in &context.resolved {
                    context.graph.cancel(node);
                }
                self.lock_state().phase = RunPhase::Cancelling;
                // Pool rejection mid-run is an infrastructure failure, not
                // caller misuse.
                return Err(TaskDagError::Interrupted(format!(
                    "worker pool rejected node '{}': {err}",
                    context.graph.node(id).label()
                )));
            }
        }

        self.lock_state().phase = RunPhase::Running;
        Ok(())
    }

    /// Stop the run: shut the pool to new submissions and cancel every
    /// resolved node. Queued jobs still drain, so the terminal node still
    /// fires `on_finished`.
    pub fn cancel(&self) {
        info!("cancelling run");
        self.pool.shutdown();
        let run = {
            let mut state = self.lock_state();
            if state.run.is_some() {
                state.phase = RunPhase::Cancelling;
            }
            state.run.clone()
        };
        if let Some(context) = run {
            for &id in &context.resolved {
                context.graph.cancel(id);
            }
        }
    }

    /// Close the pool to new submissions; queued and in-flight work drains.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Best-effort stop: close the pool, discard queued jobs, and raise the
    /// stop request that waiting nodes observe between wait slices. The
    /// affected node fails with [`TaskDagError::Interrupted`], which the
    /// failure handler turns into `on_error` plus whole-run cancellation.
    pub fn interrupt(&self) {
        info!("interrupting run");
        self.pool.shutdown_now();
    }

    /// Wait until the run settles (the terminal node's gate releases)
    /// without touching the pool; the wait to use before
    /// [`Loader::retry`]. Returns whether the run settled in time; trivially
    /// true when nothing is loaded.
    pub async fn await_finished(&self, timeout: Duration) -> bool {
        self.await_finished_until(Instant::now() + timeout).await
    }

    /// Wait until the run has settled and the pool has terminated, or the
    /// timeout elapses; returns whether termination was reached.
    ///
    /// When the pool is still accepting, this first waits for the terminal
    /// node to settle and then shuts the pool down. When the pool was
    /// already shut down (after `cancel` or `interrupt`), the settle wait
    /// is skipped; after an interrupt the terminal gate may never release.
    /// Polls in slices rather than blocking indefinitely.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        if self.pool.is_terminated() {
            self.lock_state().phase = RunPhase::Terminated;
            return true;
        }

        if !self.pool.is_shutdown() {
            if !self.await_finished_until(deadline).await {
                return false;
            }
            self.pool.shutdown();
            if self.current_run().is_some() {
                self.lock_state().phase = RunPhase::Draining;
            }
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let slice = self.options.poll_interval.min(remaining);
            if self.pool.await_termination(slice).await {
                self.lock_state().phase = RunPhase::Terminated;
                return true;
            }
        }
    }

    /// Re-run the failed subtree with the callback from the original load.
    pub fn retry(&self) -> Result<()> {
        let callback = match self.current_run() {
            Some(context) => Arc::clone(&context.callback),
            None => {
                return Err(TaskDagError::IllegalState(
                    "nothing has been loaded; call load() first".into(),
                ));
            }
        };
        self.retry_with(callback)
    }

    /// Re-run the failed subtree, replacing the callback.
    ///
    /// Builds fresh nodes (sharing the original task references) for every
    /// failed node and its transitive dependents, excluding the old
    /// terminal node, and loads them as a new run. Previously succeeded
    /// nodes are not re-executed. Fails with
    /// [`TaskDagError::IllegalState`] when the pool is already shut down or
    /// terminated, or when nothing was ever loaded.
    pub fn retry_with(&self, callback: Arc<dyn LoaderCallback>) -> Result<()> {
        if self.pool.is_shutdown() || self.pool.is_terminated() {
            return Err(TaskDagError::IllegalState(
                "worker pool is shut down; nothing can be retried".into(),
            ));
        }

        let context = {
            let mut state = self.lock_state();
            let Some(context) = state.run.take() else {
                return Err(TaskDagError::IllegalState(
                    "nothing has been loaded; call load() first".into(),
                ));
            };
            state.phase = RunPhase::Idle;
            context
        };

        let failed: Vec<NodeId> = context
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        info!(failed = failed.len(), "retrying failed subtree");

        let fresh = retry::rebuild_failed_subgraph(&context.graph, &failed)?;
        self.load(callback, fresh)
    }

    /// Phase of the current run.
    pub fn phase(&self) -> RunPhase {
        self.lock_state().phase
    }

    /// Graph of the current run, for node-state queries; `None` before the
    /// first load.
    pub fn graph(&self) -> Option<Arc<TaskGraph>> {
        self.current_run().map(|context| Arc::clone(&context.graph))
    }

    /// Resolved submission order of the current run, terminal node last;
    /// empty when nothing is loaded.
    pub fn resolved_order(&self) -> Vec<NodeId> {
        self.current_run()
            .map(|context| context.resolved.clone())
            .unwrap_or_default()
    }

    /// Nodes whose tasks failed in the current run.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.current_run()
            .map(|context| {
                context
                    .failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .unwrap_or_default()
    }

    fn lock_state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_run(&self) -> Option<Arc<RunContext>> {
        self.lock_state().run.clone()
    }

    async fn await_finished_until(&self, deadline: Instant) -> bool {
        let Some(context) = self.current_run() else {
            return true;
        };
        let gate = context.graph.node(context.terminal).gate();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return gate.is_released();
            }
            let slice = self.options.poll_interval.min(remaining);
            if gate.wait_timeout(slice).await {
                return true;
            }
        }
    }
}

/// Per-node job wrapper: run the node, then classify any failure.
fn node_job(
    context: Arc<RunContext>,
    node: NodeId,
    stop: watch::Receiver<bool>,
    wait_slice: Duration,
) -> Job {
    Box::pin(async move {
        match context
            .graph
            .run_node_monitored(node, stop, wait_slice)
            .await
        {
            Ok(()) => {}
            Err(TaskDagError::NodeExecution(err)) => {
                warn!(node = %err.label, "node failed; cancelling its dependents");
                context.callback.on_node_error(&err);
                // Record before cancelling: the cascade releases the gates
                // the terminal node waits on, and a retry may start the
                // moment the run settles.
                context
                    .failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(err.node);
                context.graph.cancel(err.node);
            }
            Err(err) => {
                error!(error = %err, "infrastructure failure; cancelling the run");
                context.callback.on_error(&err);
                context.pool.shutdown();
                for &id in &context.resolved {
                    context.graph.cancel(id);
                }
            }
        }
    })
}

/// Task of the synthetic terminal node: fires the finished notification.
struct NotifyFinished {
    callback: Arc<dyn LoaderCallback>,
}

impl Task for NotifyFinished {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            info!("run settled; notifying finished");
            self.callback.on_finished();
            Ok(())
        })
    }
}
