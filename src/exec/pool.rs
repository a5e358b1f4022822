// src/exec/pool.rs

//! Bounded worker pool.
//!
//! The scheduler depends only on the [`WorkerPool`] trait; tests can swap
//! in a fake. [`TokioWorkerPool`] is the production implementation: a fixed
//! number of spawned workers draining one FIFO queue, so submission order
//! is dequeue order and width bounds parallelism.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info};

use crate::errors::{Result, TaskDagError};

/// Unit of work accepted by a [`WorkerPool`].
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded-width FIFO executor.
///
/// Lifecycle: accepting → shut down (no new submissions; queued and
/// in-flight work drains) → terminated (every worker exited). The boxed
/// future on `await_termination` keeps the trait object-safe.
pub trait WorkerPool: Send + Sync {
    /// Queue a job for execution. Fails with
    /// [`TaskDagError::IllegalState`] once the pool is shut down.
    fn submit(&self, job: Job) -> Result<()>;

    /// Stop accepting submissions; queued and in-flight jobs still run.
    fn shutdown(&self);

    /// [`WorkerPool::shutdown`] plus a stop request: still-queued jobs are
    /// discarded, and in-flight jobs observe the request through
    /// [`WorkerPool::stop_watch`]. Cooperative, never aborts a job.
    fn shutdown_now(&self);

    /// Wait until every worker exited, or the timeout elapses. Returns
    /// whether the pool terminated.
    fn await_termination(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    fn is_shutdown(&self) -> bool;

    fn is_terminated(&self) -> bool;

    /// Receiver flipped to `true` by [`WorkerPool::shutdown_now`].
    fn stop_watch(&self) -> watch::Receiver<bool>;
}

/// Production pool: `width` tokio workers sharing one unbounded FIFO queue.
///
/// Workers exit when the queue closes (on shutdown) and is drained; the
/// last one out flips the terminated flag.
#[derive(Debug)]
pub struct TokioWorkerPool {
    width: usize,
    tx: StdMutex<Option<mpsc::UnboundedSender<Job>>>,
    stop_tx: watch::Sender<bool>,
    live_workers: Arc<AtomicUsize>,
    terminated_rx: watch::Receiver<bool>,
}

impl TokioWorkerPool {
    /// Spawn `width` workers (clamped to at least 1). Must be called from
    /// within a tokio runtime.
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let (stop_tx, _) = watch::channel(false);
        let (terminated_tx, terminated_rx) = watch::channel(false);
        let terminated_tx = Arc::new(terminated_tx);
        let live_workers = Arc::new(AtomicUsize::new(width));

        info!(width, "starting worker pool");
        for worker in 0..width {
            let rx = Arc::clone(&rx);
            let stop_rx = stop_tx.subscribe();
            let live = Arc::clone(&live_workers);
            let terminated_tx = Arc::clone(&terminated_tx);
            tokio::spawn(async move {
                debug!(worker, "worker started");
                worker_loop(rx, stop_rx).await;
                if live.fetch_sub(1, Ordering::SeqCst) == 1 {
                    debug!("last worker exited; pool terminated");
                    terminated_tx.send_replace(true);
                }
                debug!(worker, "worker exited");
            });
        }

        Self {
            width,
            tx: StdMutex::new(Some(tx)),
            stop_tx,
            live_workers,
            terminated_rx,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

async fn worker_loop(rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>, stop_rx: watch::Receiver<bool>) {
    loop {
        // Hold the queue lock only while dequeuing so the job itself runs
        // with the queue free for the other workers.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            // Queue closed and drained.
            break;
        };
        if *stop_rx.borrow() {
            // Stop requested; discard work that never started.
            drop(job);
            continue;
        }
        // A panicking job must not take the worker with it; the pool keeps
        // its width and the remaining queue still drains.
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!("job panicked; worker continues");
        }
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, job: Job) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|_| TaskDagError::IllegalState("worker pool queue is closed".into())),
            None => Err(TaskDagError::IllegalState(
                "worker pool is shut down".into(),
            )),
        }
    }

    fn shutdown(&self) {
        // Dropping the sender closes the queue; workers drain and exit.
        let dropped = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if dropped {
            info!("worker pool shutting down");
        }
    }

    fn shutdown_now(&self) {
        self.shutdown();
        self.stop_tx.send_replace(true);
    }

    fn await_termination(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let mut terminated = self.terminated_rx.clone();
        Box::pin(async move {
            match tokio::time::timeout(timeout, terminated.wait_for(|done| *done)).await {
                Ok(result) => result.is_ok(),
                Err(_) => false,
            }
        })
    }

    fn is_shutdown(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn is_terminated(&self) -> bool {
        self.live_workers.load(Ordering::SeqCst) == 0
    }

    fn stop_watch(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}
