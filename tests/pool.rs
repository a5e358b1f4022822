// tests/pool.rs
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskdag::{Job, TokioWorkerPool, WorkerPool};
use taskdag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn recording_job(log: Arc<Mutex<Vec<u32>>>, tag: u32, delay_ms: u64) -> Job {
    Box::pin(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        log.lock().unwrap().push(tag);
    })
}

#[tokio::test]
async fn width_one_runs_jobs_in_submission_order() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    for tag in 0..4 {
        pool.submit(recording_job(Arc::clone(&log), tag, 5))?;
    }

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn width_bounds_the_number_of_concurrent_jobs() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    for _ in 0..6 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        let completed = Arc::clone(&completed);
        pool.submit(Box::pin(async move {
            let now_running = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now_running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
        }))?;
    }

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert_eq!(completed.load(Ordering::SeqCst), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2, "more than two jobs ran at once");
    Ok(())
}

#[tokio::test]
async fn shutdown_drains_queued_jobs_and_refuses_new_ones() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    for tag in 0..3 {
        pool.submit(recording_job(Arc::clone(&log), tag, 20))?;
    }

    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(pool.submit(recording_job(Arc::clone(&log), 99, 0)).is_err());

    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert!(pool.is_terminated());
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn shutdown_now_discards_queued_jobs() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    pool.submit(recording_job(Arc::clone(&log), 0, 100))?;
    pool.submit(recording_job(Arc::clone(&log), 1, 0))?;

    // Let the first job start, then stop the pool under it.
    tokio::time::sleep(Duration::from_millis(30)).await;
    pool.shutdown_now();

    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert_eq!(
        *log.lock().unwrap(),
        vec![0],
        "the in-flight job finishes, the queued one is dropped"
    );
    Ok(())
}

#[tokio::test]
async fn panicking_job_does_not_take_its_worker_down() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    pool.submit(Box::pin(async {
        panic!("job blew up");
    }))?;
    pool.submit(recording_job(Arc::clone(&log), 1, 0))?;

    pool.shutdown();
    assert!(
        pool.await_termination(Duration::from_secs(5)).await,
        "the worker must survive the panic and drain the queue"
    );
    assert!(pool.is_terminated());
    assert_eq!(*log.lock().unwrap(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn await_termination_times_out_while_a_job_runs() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(1);
    pool.submit(Box::pin(async {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }))?;
    pool.shutdown();

    assert!(!pool.await_termination(Duration::from_millis(50)).await);
    assert!(!pool.is_terminated());

    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert!(pool.is_terminated());
    Ok(())
}

#[tokio::test]
async fn zero_width_is_clamped_to_a_single_worker() -> TestResult {
    init_tracing();

    let pool = TokioWorkerPool::new(0);
    assert_eq!(pool.width(), 1);

    let log = Arc::new(Mutex::new(Vec::new()));
    pool.submit(recording_job(Arc::clone(&log), 7, 0))?;
    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)).await);
    assert_eq!(*log.lock().unwrap(), vec![7]);
    Ok(())
}
