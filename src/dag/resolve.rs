// src/dag/resolve.rs

//! Topological resolution of the execution order.

use std::collections::HashSet;

use tracing::debug;

use crate::dag::TaskGraph;
use crate::dag::node::NodeId;
use crate::errors::{Result, TaskDagError};

/// Produce the execution order for `graph`: every node exactly once, each
/// placed after all of its dependencies.
///
/// Orphan nodes (zero dependencies) are seeded first, keeping their
/// insertion order, so independent leaves are dispatched before anything
/// that has to wait. The remaining nodes are placed by a depth-first walk
/// of their dependency edges; a per-root "currently visiting" set catches
/// indirect cycles that edge registration could not reject cheaply, failing
/// with [`TaskDagError::CircularDependency`] naming both ends of the
/// offending edge.
pub fn resolve(graph: &TaskGraph) -> Result<Vec<NodeId>> {
    let mut order: Vec<NodeId> = Vec::with_capacity(graph.len());
    let mut placed: HashSet<NodeId> = HashSet::with_capacity(graph.len());

    for id in graph.node_ids() {
        if graph.dependencies_of(id).is_empty() {
            placed.insert(id);
            order.push(id);
        }
    }

    for id in graph.node_ids() {
        let mut visiting: HashSet<NodeId> = HashSet::new();
        visit(graph, id, &mut order, &mut placed, &mut visiting)?;
    }

    debug!(nodes = order.len(), "dependency order resolved");
    Ok(order)
}

fn visit(
    graph: &TaskGraph,
    id: NodeId,
    order: &mut Vec<NodeId>,
    placed: &mut HashSet<NodeId>,
    visiting: &mut HashSet<NodeId>,
) -> Result<()> {
    if placed.contains(&id) {
        return Ok(());
    }
    visiting.insert(id);

    for dep in graph.dependencies_of(id) {
        if placed.contains(&dep) {
            continue;
        }
        if visiting.contains(&dep) {
            return Err(TaskDagError::CircularDependency {
                from: graph.node(id).label().to_string(),
                to: graph.node(dep).label().to_string(),
            });
        }
        visit(graph, dep, order, placed, visiting)?;
    }

    if placed.insert(id) {
        order.push(id);
    }
    Ok(())
}
