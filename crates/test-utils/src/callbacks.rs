use std::sync::Mutex;
use std::time::Duration;

use taskdag::{LoaderCallback, NodeExecutionError, TaskDagError};
use tokio::sync::watch;

/// Callback recording every notification, with an awaitable finish count.
pub struct RecordingCallback {
    finished_tx: watch::Sender<u32>,
    node_errors: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        let (finished_tx, _) = watch::channel(0);
        Self {
            finished_tx,
            node_errors: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Number of `on_finished` notifications so far.
    pub fn finished_count(&self) -> u32 {
        *self.finished_tx.borrow()
    }

    /// Labels of the nodes reported through `on_node_error`, in order.
    pub fn node_errors(&self) -> Vec<String> {
        self.node_errors.lock().unwrap().clone()
    }

    /// Rendered messages reported through `on_error`.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Wait until at least `count` runs have finished; panics on timeout so
    /// a hanging run fails the test loudly.
    pub async fn wait_finished_count(&self, count: u32, timeout: Duration) {
        let mut rx = self.finished_tx.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|finished| *finished >= count))
            .await
            .expect("timed out waiting for on_finished")
            .expect("finished channel closed");
    }

    /// Wait for the first finish.
    pub async fn wait_finished(&self, timeout: Duration) {
        self.wait_finished_count(1, timeout).await;
    }
}

impl Default for RecordingCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderCallback for RecordingCallback {
    fn on_finished(&self) {
        self.finished_tx.send_modify(|finished| *finished += 1);
    }

    fn on_node_error(&self, error: &NodeExecutionError) {
        self.node_errors.lock().unwrap().push(error.label.clone());
    }

    fn on_error(&self, error: &TaskDagError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
