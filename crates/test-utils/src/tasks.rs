use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use taskdag::Task;

/// Task that sleeps for a fixed delay and succeeds.
pub struct WaitTask {
    delay: Duration,
}

impl WaitTask {
    pub fn millis(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Task for WaitTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
    }
}

/// Task that sleeps, then appends its name to a shared execution log.
pub struct RecordingTask {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl RecordingTask {
    pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>, delay_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            log,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Task for RecordingTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(self.name.clone());
            Ok(())
        })
    }
}

/// Task counting how many times it ran; the counter is shared so it stays
/// observable after the task moves into a graph (and into retry copies).
pub struct CountingTask {
    counter: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingTask {
    pub fn new(delay_ms: u64) -> (Self, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        (
            Self {
                counter: Arc::clone(&counter),
                delay: Duration::from_millis(delay_ms),
            },
            counter,
        )
    }
}

impl Task for CountingTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Task that always fails with the given message after a delay.
pub struct FailTask {
    message: String,
    delay: Duration,
}

impl FailTask {
    pub fn new(message: &str, delay_ms: u64) -> Self {
        Self {
            message: message.to_string(),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Task for FailTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Err(anyhow!("{}", self.message))
        })
    }
}

/// Task that panics with the given message after a delay, for crash
/// containment coverage.
pub struct PanicTask {
    message: String,
    delay: Duration,
}

impl PanicTask {
    pub fn new(message: &str, delay_ms: u64) -> Self {
        Self {
            message: message.to_string(),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Task for PanicTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            panic!("{}", self.message);
        })
    }
}

/// Task failing its first `failures` runs, succeeding afterwards. The shared
/// counter reports how many times it ran in total.
pub struct FlakyTask {
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl FlakyTask {
    pub fn new(failures: usize) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                failures,
                attempts: Arc::clone(&attempts),
            },
            attempts,
        )
    }
}

impl Task for FlakyTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(anyhow!("flaky failure on attempt {}", attempt + 1))
            } else {
                Ok(())
            }
        })
    }
}
