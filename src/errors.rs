// src/errors.rs

//! Crate-wide error types.
//!
//! Failures fall into four families:
//! - graph construction problems (`CircularDependency`),
//! - task-body failures surfaced from a worker (`NodeExecution`),
//! - infrastructure problems not attributable to one task (`Interrupted`),
//! - programmer misuse of the API (`IllegalState`).
//!
//! Task failures are delivered through [`crate::loader::LoaderCallback`],
//! never unwound onto the caller's thread; the other families return `Err`
//! synchronously from the offending call.

use std::sync::Arc;

use thiserror::Error;

use crate::dag::NodeId;

/// A task body failed inside a worker.
///
/// Carries the handle and display label of the failing node plus the
/// original cause. Cloneable so the same failure can be recorded on the
/// node and handed to the callback.
#[derive(Error, Debug, Clone)]
#[error("Failed running node '{label}': {cause}")]
pub struct NodeExecutionError {
    pub node: NodeId,
    pub label: String,
    pub cause: Arc<anyhow::Error>,
}

#[derive(Error, Debug)]
pub enum TaskDagError {
    #[error("Circular dependency: {from} --> {to}")]
    CircularDependency { from: String, to: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error(transparent)]
    NodeExecution(#[from] NodeExecutionError),
}

pub type Result<T> = std::result::Result<T, TaskDagError>;
