use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use taskdag::errors::{Result, TaskDagError};
use taskdag::exec::{Job, WorkerPool};
use tokio::sync::watch;

/// A fake pool that spawns every submitted job immediately, with no width
/// bound. Stands in for the production pool when Loader semantics, not pool
/// semantics, are under test.
pub struct ImmediatePool {
    shutdown: AtomicBool,
    stop_tx: watch::Sender<bool>,
    in_flight: Arc<AtomicUsize>,
}

impl ImmediatePool {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            shutdown: AtomicBool::new(false),
            stop_tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for ImmediatePool {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool for ImmediatePool {
    fn submit(&self, job: Job) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(TaskDagError::IllegalState(
                "immediate pool is shut down".into(),
            ));
        }
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            job.await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutdown_now(&self) {
        self.shutdown();
        self.stop_tx.send_replace(true);
    }

    fn await_termination(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self.is_terminated() {
                    return true;
                }
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    fn stop_watch(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}
