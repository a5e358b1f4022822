// src/lib.rs

//! Dependency-graph task scheduler.
//!
//! Build a [`TaskGraph`] of [`Task`]s, declare edges with
//! [`TaskGraph::depends_on`], and hand the graph to a [`Loader`]: every
//! node runs exactly once on a bounded worker pool, in an order consistent
//! with its dependencies. A failing node cancels its dependent subtree
//! while the rest of the graph completes; a synthetic terminal node fires
//! [`LoaderCallback::on_finished`] exactly once when the whole run has
//! settled; [`Loader::retry`] re-runs just the failed subtree with fresh
//! nodes around the same tasks.

pub mod dag;
pub mod errors;
pub mod exec;
pub mod gate;
pub mod loader;

pub use dag::{FnTask, Node, NodeId, Task, TaskGraph, resolve, task_fn};
pub use errors::{NodeExecutionError, Result, TaskDagError};
pub use exec::{Job, TokioWorkerPool, WorkerPool};
pub use gate::Gate;
pub use loader::{Loader, LoaderCallback, LoaderOptions, NoopCallback, RunPhase};
