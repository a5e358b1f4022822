// src/dag/mod.rs

//! Dependency graph: nodes, edges, resolution, execution.
//!
//! - [`node`] defines the [`Task`] trait, [`Node`] lifecycle state, and
//!   [`NodeId`] handles.
//! - [`graph`] holds the node arena and dependency edges, including the
//!   cancellation cascade.
//! - [`resolve`] produces the topological execution order.
//! - the execution routine (`run_node`) lives in a private `runner` module
//!   and is exposed as methods on [`TaskGraph`].

pub mod graph;
pub mod node;
pub mod resolve;
mod runner;

pub use graph::TaskGraph;
pub use node::{FnTask, Node, NodeId, Task, task_fn};
pub use resolve::resolve;

pub(crate) use runner::WAIT_SLICE;
