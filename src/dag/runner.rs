// src/dag/runner.rs

//! Per-node execution routine.
//!
//! This is the body a worker runs for one node: wait for every dependency
//! gate, observing cancellation and stop requests between wait slices; skip
//! the task when cancelled; otherwise run the task and settle the node.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::dag::TaskGraph;
use crate::dag::node::NodeId;
use crate::errors::{NodeExecutionError, Result, TaskDagError};

/// Default length of one dependency-gate wait slice.
pub(crate) const WAIT_SLICE: Duration = Duration::from_millis(25);

impl TaskGraph {
    /// Execute `node` on the calling context.
    ///
    /// Fails with [`TaskDagError::IllegalState`] if the node already
    /// succeeded or failed; re-executing a settled node is a misuse, not
    /// something to recover from. A node flagged cancelled takes the skip
    /// path and returns `Ok` without running its task.
    ///
    /// A task failure is returned as
    /// [`TaskDagError::NodeExecution`]; the node's gate is left closed in
    /// that case and it is the caller's job (normally the scheduler's
    /// failure handler) to run the cancellation cascade that releases it.
    pub async fn run_node(&self, node: NodeId) -> Result<()> {
        let (_stop_tx, stop_rx) = watch::channel(false);
        self.run_node_monitored(node, stop_rx, WAIT_SLICE).await
    }

    /// Execution routine with a stop-request channel, as submitted to the
    /// worker pool. A stop observed mid-wait surfaces as
    /// [`TaskDagError::Interrupted`].
    pub(crate) async fn run_node_monitored(
        &self,
        node: NodeId,
        stop: watch::Receiver<bool>,
        wait_slice: Duration,
    ) -> Result<()> {
        let entry = self.node(node);
        if entry.success() || entry.failed() {
            return Err(TaskDagError::IllegalState(format!(
                "node '{}' has already executed",
                entry.label()
            )));
        }
        entry.mark_started();

        for dep_id in self.dependencies_of(node) {
            let dep = self.node(dep_id);
            while !dep.gate().wait_timeout(wait_slice).await {
                if entry.cancelled() {
                    break;
                }
                if *stop.borrow() {
                    debug!(
                        node = %entry.label(),
                        dep = %dep.label(),
                        "stop requested while waiting on dependency"
                    );
                    return Err(TaskDagError::Interrupted(format!(
                        "stopped while '{}' was waiting on '{}'",
                        entry.label(),
                        dep.label()
                    )));
                }
            }
            if entry.cancelled() {
                break;
            }
            if dep.cancelled() {
                // Cancellation is transitive through a waited edge, even
                // when this node was not reached by a cascade directly.
                // `try_cancel` exempts the terminal node, which must run
                // no matter how its dependencies settled.
                entry.try_cancel();
            }
        }

        if entry.cancelled() {
            debug!(node = %entry.label(), "cancelled before execution; skipping task");
            entry.gate().release();
            return Ok(());
        }

        debug!(node = %entry.label(), "running task");
        match entry.run_task().await {
            Ok(()) => {
                entry.mark_success();
                entry.gate().release();
                debug!(node = %entry.label(), "task finished");
                Ok(())
            }
            Err(cause) => {
                warn!(node = %entry.label(), error = %cause, "task failed");
                let cause = Arc::new(cause);
                entry.record_failure(Arc::clone(&cause));
                // Gate stays closed; the cancellation cascade releases it
                // once the dependent subtree is flagged.
                Err(TaskDagError::NodeExecution(NodeExecutionError {
                    node,
                    label: entry.label().to_string(),
                    cause,
                }))
            }
        }
    }
}
