// src/exec/mod.rs

//! Execution layer.
//!
//! - [`pool`] defines the [`Job`] unit, the [`WorkerPool`] trait the
//!   scheduler depends on, and [`TokioWorkerPool`], the production
//!   implementation running jobs on spawned tokio workers.

pub mod pool;

pub use pool::{Job, TokioWorkerPool, WorkerPool};
