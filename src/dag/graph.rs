// src/dag/graph.rs

//! Node arena and dependency edges.
//!
//! Edge direction: dependency -> dependent. Dependencies of a node are its
//! incoming neighbors, dependents its outgoing neighbors, so the forward
//! wait-on relation and the reverse cascade index come from one edge set.
//!
//! Topology is mutated only while the caller still owns the graph; a run
//! takes the graph by value, so workers only ever read it.

use std::collections::HashSet;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::stable_graph::StableDiGraph;
use tracing::debug;

use crate::dag::node::{Node, NodeId, Task};
use crate::errors::{Result, TaskDagError};

/// Directed acyclic graph of [`Node`]s addressed by [`NodeId`] handles.
#[derive(Debug, Default)]
pub struct TaskGraph {
    inner: StableDiGraph<Node, ()>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            inner: StableDiGraph::new(),
        }
    }

    /// Register a node without a task. It settles as success the moment a
    /// worker executes it; useful as a join point between subgraphs.
    pub fn add_node(&mut self, label: impl Into<String>) -> NodeId {
        NodeId(self.inner.add_node(Node::new(label, None)))
    }

    /// Register `task` under `label`, returning the node handle.
    pub fn add_task(&mut self, label: impl Into<String>, task: impl Task + 'static) -> NodeId {
        NodeId(self.inner.add_node(Node::new(label, Some(Arc::new(task)))))
    }

    /// Register a node sharing an existing task reference. Retry uses this
    /// to rebuild fresh nodes around the original task bodies.
    pub(crate) fn add_shared(
        &mut self,
        label: impl Into<String>,
        task: Option<Arc<dyn Task>>,
    ) -> NodeId {
        NodeId(self.inner.add_node(Node::new(label, task)))
    }

    /// Register the synthetic end-of-run node. The cancellation cascade
    /// leaves it alone so the finished notification always fires.
    pub(crate) fn add_terminal(&mut self, label: impl Into<String>, task: Arc<dyn Task>) -> NodeId {
        NodeId(self.inner.add_node(Node::new_terminal(label, task)))
    }

    /// Declare that `node` waits on each of `deps`.
    ///
    /// Rejects a self dependency and any edge that would close a direct
    /// two-node cycle; indirect cycles are caught later by
    /// [`resolve`](crate::dag::resolve::resolve). Duplicate edges are
    /// ignored. On rejection the graph keeps every edge added so far.
    pub fn depends_on(&mut self, node: NodeId, deps: &[NodeId]) -> Result<()> {
        for &dep in deps {
            if dep == node {
                return Err(self.cycle_error(node, dep));
            }
            // Cheap direct check: `dep` already waiting on `node` means
            // this edge would close a two-node cycle.
            if self.inner.find_edge(node.0, dep.0).is_some() {
                return Err(self.cycle_error(node, dep));
            }
            self.inner.update_edge(dep.0, node.0, ());
        }
        Ok(())
    }

    fn cycle_error(&self, from: NodeId, to: NodeId) -> TaskDagError {
        TaskDagError::CircularDependency {
            from: self.node(from).label().to_string(),
            to: self.node(to).label().to_string(),
        }
    }

    /// Borrow a node by handle.
    ///
    /// Panics when given a handle from a different graph; handles are only
    /// meaningful against the arena that created them.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.inner[id.0]
    }

    /// Direct dependencies of `node`.
    pub fn dependencies_of(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .neighbors_directed(node.0, Direction::Incoming)
            .map(NodeId)
            .collect()
    }

    /// Direct dependents of `node`; the cancellation-cascade index.
    pub fn dependents_of(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .neighbors_directed(node.0, Direction::Outgoing)
            .map(NodeId)
            .collect()
    }

    /// Every node handle in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.node_indices().map(NodeId).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Cancel `node` and cascade through its transitive dependents.
    ///
    /// Idempotent. Nodes that already settled keep their outcome, and the
    /// synthetic terminal node is never flagged. Every visited gate is
    /// force-released, but only after the whole subtree is flagged, so a
    /// dependent that wakes under a released gate already observes its own
    /// cancelled flag.
    pub fn cancel(&self, node: NodeId) {
        let mut to_release: Vec<NodeId> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![node];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let entry = self.node(id);
            if entry.is_terminal() {
                continue;
            }
            if entry.try_cancel() {
                debug!(node = %entry.label(), "node cancelled");
            }
            to_release.push(id);
            stack.extend(self.dependents_of(id));
        }

        for id in to_release {
            self.node(id).gate().release();
        }
    }
}
