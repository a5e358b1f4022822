// src/loader/retry.rs

//! Failed-subtree reconstruction.

use std::collections::HashMap;

use crate::dag::{NodeId, TaskGraph};
use crate::errors::Result;

/// Build a fresh graph containing one new node per failed node and per
/// transitive dependent, mirroring the dependency edges between them.
///
/// Fresh nodes share the original task references but get fresh gates and
/// state. The walk is memoized by original handle, so a diamond produces
/// exactly one copy of the shared dependent. The old run's terminal node is
/// skipped; the next load synthesizes a new one.
pub(crate) fn rebuild_failed_subgraph(graph: &TaskGraph, failed: &[NodeId]) -> Result<TaskGraph> {
    let mut fresh = TaskGraph::new();
    let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();

    for &root in failed {
        copy_with_dependents(graph, root, &mut fresh, &mut mapping)?;
    }
    Ok(fresh)
}

fn copy_with_dependents(
    graph: &TaskGraph,
    original: NodeId,
    fresh: &mut TaskGraph,
    mapping: &mut HashMap<NodeId, NodeId>,
) -> Result<NodeId> {
    if let Some(&copied) = mapping.get(&original) {
        return Ok(copied);
    }

    let source = graph.node(original);
    let copied = fresh.add_shared(source.label().to_string(), source.task());
    mapping.insert(original, copied);

    for dependent in graph.dependents_of(original) {
        if graph.node(dependent).is_terminal() {
            continue;
        }
        let copied_dependent = copy_with_dependents(graph, dependent, fresh, mapping)?;
        // Mirroring a DAG cannot close a cycle, but depends_on keeps its
        // contract either way.
        fresh.depends_on(copied_dependent, &[copied])?;
    }
    Ok(copied)
}
