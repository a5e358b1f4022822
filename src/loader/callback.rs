// src/loader/callback.rs

//! Run-completion and failure notifications.

use crate::errors::{NodeExecutionError, TaskDagError};

/// Caller-supplied observer for a scheduling run.
///
/// Notifications fire on worker contexts, so implementations should be
/// cheap and must not block.
pub trait LoaderCallback: Send + Sync {
    /// The run settled: every resolved node reached a terminal state.
    /// Fired exactly once per run, as its last observable event.
    fn on_finished(&self);

    /// A node's task failed. Fired once per failing node, right before its
    /// dependent subtree is cancelled.
    fn on_node_error(&self, error: &NodeExecutionError);

    /// An infrastructure failure not attributable to a single task. The
    /// whole run is cancelled alongside this notification.
    fn on_error(&self, error: &TaskDagError);
}

/// Callback that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl LoaderCallback for NoopCallback {
    fn on_finished(&self) {}

    fn on_node_error(&self, _error: &NodeExecutionError) {}

    fn on_error(&self, _error: &TaskDagError) {}
}
