// tests/resolver_properties.rs
use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use taskdag::{NodeId, TaskGraph, resolve, task_fn};

/// Dependency lists where node `i` may only depend on nodes `0..i`,
/// so the generated graph is acyclic by construction.
fn dag_deps_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_nodes).prop_flat_map(|node_count| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..node_count),
            node_count,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    let unique: HashSet<usize> = deps
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|dep| dep % i)
                        .collect();
                    let mut cleaned: Vec<usize> = unique.into_iter().collect();
                    cleaned.sort_unstable();
                    cleaned
                })
                .collect()
        })
    })
}

fn build_graph(dep_lists: &[Vec<usize>]) -> (TaskGraph, Vec<NodeId>) {
    let mut graph = TaskGraph::new();
    let ids: Vec<NodeId> = (0..dep_lists.len())
        .map(|i| graph.add_task(format!("task_{i}"), task_fn(|| Ok(()))))
        .collect();
    for (i, deps) in dep_lists.iter().enumerate() {
        let dep_ids: Vec<NodeId> = deps.iter().map(|&dep| ids[dep]).collect();
        graph
            .depends_on(ids[i], &dep_ids)
            .expect("edges pointing at earlier nodes cannot form a cycle");
    }
    (graph, ids)
}

proptest! {
    #[test]
    fn resolution_is_a_complete_topological_order(dep_lists in dag_deps_strategy(24)) {
        let (graph, ids) = build_graph(&dep_lists);

        let order = resolve(&graph).expect("generated graphs are acyclic");
        prop_assert_eq!(order.len(), ids.len());

        let position: HashMap<NodeId, usize> = order
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect();
        prop_assert_eq!(position.len(), ids.len());
        for (i, deps) in dep_lists.iter().enumerate() {
            for &dep in deps {
                prop_assert!(position[&ids[dep]] < position[&ids[i]]);
            }
        }
    }

    #[test]
    fn free_standing_nodes_never_trail_dependent_ones(dep_lists in dag_deps_strategy(24)) {
        let (graph, _ids) = build_graph(&dep_lists);

        let order = resolve(&graph).expect("generated graphs are acyclic");

        let mut past_the_front = false;
        for &id in &order {
            let free_standing = graph.dependencies_of(id).is_empty();
            if !free_standing {
                past_the_front = true;
            }
            prop_assert!(
                !(free_standing && past_the_front),
                "free-standing node placed after a dependent one"
            );
        }
    }

    #[test]
    fn directed_rings_are_rejected(len in 3usize..12) {
        let mut graph = TaskGraph::new();
        let ids: Vec<NodeId> = (0..len)
            .map(|i| graph.add_task(format!("ring_{i}"), task_fn(|| Ok(()))))
            .collect();
        // node i waits on node i+1; only the closing edge makes it a ring,
        // and none of the edges is caught by the direct two-node check.
        for i in 0..len {
            graph
                .depends_on(ids[i], &[ids[(i + 1) % len]])
                .expect("ring edges are not direct two-node cycles");
        }

        prop_assert!(resolve(&graph).is_err());
    }
}
