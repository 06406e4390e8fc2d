//! Property-based tests for the sync adapter using proptest.
//!
//! Random sequences of model mutations, UI events and cycle boundaries are
//! replayed against an in-memory tree. The tests check that:
//!
//! - ids stay stable for as long as a node is known to the client
//! - every registered node is still alive in the model after a cycle
//! - detaching always leaves an empty registry
//! - a node inserted and removed within one cycle never reaches the client

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use crate::adapter::{SyncAdapter, SyncConfig};
    use crate::model::{NewNode, NodeKey, Tree, TreeModel};
    use crate::wire::{CheckedNode, UiEvent};

    #[derive(Debug, Clone)]
    enum Op {
        Insert { pick: usize, count: usize },
        Remove { pick: usize },
        RemoveAll { pick: usize },
        Expand { pick: usize, expanded: bool },
        ExpandAll { expanded: bool },
        Select { picks: Vec<usize> },
        Check { pick: usize, checked: bool },
        Rename { pick: usize },
        Filter { modulus: u64 },
        ClearFilter,
        UiSelect { pick: usize },
        UiExpand { pick: usize, expanded: bool, lazy: bool },
        UiCheck { pick: usize, checked: bool },
        EndOfCycle,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (any::<usize>(), 1usize..4).prop_map(|(pick, count)| Op::Insert { pick, count }),
            2 => any::<usize>().prop_map(|pick| Op::Remove { pick }),
            1 => any::<usize>().prop_map(|pick| Op::RemoveAll { pick }),
            1 => (any::<usize>(), any::<bool>()).prop_map(|(pick, expanded)| Op::Expand { pick, expanded }),
            1 => any::<bool>().prop_map(|expanded| Op::ExpandAll { expanded }),
            1 => prop::collection::vec(any::<usize>(), 0..3).prop_map(|picks| Op::Select { picks }),
            1 => (any::<usize>(), any::<bool>()).prop_map(|(pick, checked)| Op::Check { pick, checked }),
            1 => any::<usize>().prop_map(|pick| Op::Rename { pick }),
            1 => (2u64..5).prop_map(|modulus| Op::Filter { modulus }),
            1 => Just(Op::ClearFilter),
            1 => any::<usize>().prop_map(|pick| Op::UiSelect { pick }),
            1 => (any::<usize>(), any::<bool>(), any::<bool>())
                .prop_map(|(pick, expanded, lazy)| Op::UiExpand { pick, expanded, lazy }),
            1 => (any::<usize>(), any::<bool>()).prop_map(|(pick, checked)| Op::UiCheck { pick, checked }),
            2 => Just(Op::EndOfCycle),
        ]
    }

    /// Live nodes in depth-first order, root first.
    fn live_nodes(tree: &Tree) -> Vec<NodeKey> {
        let mut nodes = Vec::new();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            nodes.push(node);
            stack.extend(tree.child_nodes(node).iter().rev().copied());
        }
        nodes
    }

    fn pick_node(tree: &Tree, pick: usize) -> NodeKey {
        let nodes = live_nodes(tree);
        nodes[pick % nodes.len()]
    }

    fn pick_known(adapter: &SyncAdapter, pick: usize) -> Option<String> {
        let mut ids: Vec<String> = adapter
            .registry()
            .entries()
            .map(|(_, id)| id.to_string())
            .collect();
        if ids.is_empty() {
            return None;
        }
        ids.sort();
        Some(ids.swap_remove(pick % ids.len()))
    }

    fn seeded() -> (Tree, SyncAdapter) {
        let mut tree = Tree::new();
        let root = tree.root_node();
        tree.add_child_nodes(
            root,
            vec![
                NewNode::new("a")
                    .with_child(NewNode::new("a1"))
                    .with_child(NewNode::new("a2")),
                NewNode::new("b"),
            ],
        )
        .unwrap();
        let mut adapter = SyncAdapter::new(SyncConfig::new().sequential_ids("n"));
        adapter.attach(&mut tree).unwrap();
        adapter.to_wire(&tree).unwrap();
        (tree, adapter)
    }

    fn apply(tree: &mut Tree, adapter: &mut SyncAdapter, op: &Op, counter: &mut u64) {
        let root = tree.root_node();
        match op {
            Op::Insert { pick, count } => {
                let parent = pick_node(tree, *pick);
                let nodes = (0..*count)
                    .map(|_| {
                        *counter += 1;
                        NewNode::new(format!("x{}", counter))
                    })
                    .collect();
                let _ = tree.add_child_nodes(parent, nodes);
            }
            Op::Remove { pick } => {
                let node = pick_node(tree, *pick);
                if let Some(parent) = tree.parent_node(node) {
                    let _ = tree.remove_child_nodes(parent, &[node]);
                }
            }
            Op::RemoveAll { pick } => {
                let _ = tree.remove_all_child_nodes(pick_node(tree, *pick));
            }
            Op::Expand { pick, expanded } => {
                let node = pick_node(tree, *pick);
                if node != root {
                    let _ = tree.set_node_expanded(node, *expanded);
                }
            }
            Op::ExpandAll { expanded } => {
                let _ = tree.set_node_expanded_recursive(root, *expanded);
            }
            Op::Select { picks } => {
                let nodes: Vec<NodeKey> = picks
                    .iter()
                    .map(|pick| pick_node(tree, *pick))
                    .filter(|node| *node != root)
                    .collect();
                let _ = tree.select_nodes(&nodes);
            }
            Op::Check { pick, checked } => {
                let node = pick_node(tree, *pick);
                let _ = tree.set_nodes_checked(&[node], *checked);
            }
            Op::Rename { pick } => {
                *counter += 1;
                let node = pick_node(tree, *pick);
                let _ = tree.set_node_cell(node, crate::model::Cell::text(format!("r{}", counter)));
            }
            Op::Filter { modulus } => {
                let modulus = *modulus;
                tree.set_filter(move |node| node.key.0 % modulus != 0, false);
            }
            Op::ClearFilter => tree.clear_filter(),
            Op::UiSelect { pick } => {
                if let Some(id) = pick_known(adapter, *pick) {
                    let _ = adapter.on_ui_event(tree, UiEvent::NodesSelected { node_ids: vec![id] });
                }
            }
            Op::UiExpand { pick, expanded, lazy } => {
                if let Some(node_id) = pick_known(adapter, *pick) {
                    let _ = adapter.on_ui_event(
                        tree,
                        UiEvent::NodeExpanded {
                            node_id,
                            expanded: *expanded,
                            expanded_lazy: *lazy,
                        },
                    );
                }
            }
            Op::UiCheck { pick, checked } => {
                if let Some(node_id) = pick_known(adapter, *pick) {
                    let _ = adapter.on_ui_event(
                        tree,
                        UiEvent::NodesChecked {
                            nodes: vec![CheckedNode {
                                node_id,
                                checked: *checked,
                            }],
                        },
                    );
                }
            }
            Op::EndOfCycle => {
                adapter.end_of_cycle(tree).unwrap();
            }
        }
    }

    fn known_ids(adapter: &SyncAdapter) -> HashMap<NodeKey, String> {
        adapter
            .registry()
            .entries()
            .map(|(node, id)| (node, id.to_string()))
            .collect()
    }

    // =========================================================================
    // Registry properties
    // =========================================================================

    proptest! {
        /// A node keeps its id across cycles for as long as it stays known.
        #[test]
        fn ids_are_stable_while_known(ops in prop::collection::vec(op(), 1..40)) {
            let (mut tree, mut adapter) = seeded();
            let mut counter = 0;
            let mut previous = known_ids(&adapter);

            for op in &ops {
                apply(&mut tree, &mut adapter, op, &mut counter);
                if matches!(op, Op::EndOfCycle) {
                    let current = known_ids(&adapter);
                    for (node, id) in &current {
                        if let Some(before) = previous.get(node) {
                            prop_assert_eq!(before, id, "id of {} changed", node);
                        }
                    }
                    previous = current;
                }
            }
        }

        /// After a cycle every registered node still exists in the model.
        #[test]
        fn registered_nodes_are_alive(ops in prop::collection::vec(op(), 1..40)) {
            let (mut tree, mut adapter) = seeded();
            let mut counter = 0;

            for op in &ops {
                apply(&mut tree, &mut adapter, op, &mut counter);
            }
            adapter.end_of_cycle(&tree).unwrap();

            for (node, id) in adapter.registry().entries() {
                prop_assert!(tree.node(node).is_some(), "{} ({}) is gone from the model", id, node);
            }
            prop_assert_eq!(adapter.pending_events(), 0);
            prop_assert_eq!(adapter.pending_conditions(), 0);
        }

        /// Detach retires every id, whatever happened before.
        #[test]
        fn detach_leaves_no_ids(ops in prop::collection::vec(op(), 0..40), flush in any::<bool>()) {
            let (mut tree, mut adapter) = seeded();
            let mut counter = 0;

            for op in &ops {
                apply(&mut tree, &mut adapter, op, &mut counter);
            }
            if flush {
                adapter.end_of_cycle(&tree).unwrap();
            }

            prop_assert!(adapter.detach(&mut tree).is_ok());
            prop_assert!(adapter.registry().is_empty());
        }
    }

    // =========================================================================
    // Coalescing properties
    // =========================================================================

    proptest! {
        /// Inserting and removing a node in the same cycle sends nothing.
        #[test]
        fn insert_then_remove_is_invisible(pick in any::<usize>(), count in 1usize..4) {
            let (mut tree, mut adapter) = seeded();
            let parent = pick_node(&tree, pick);

            let nodes = (0..count).map(|i| NewNode::new(format!("tmp{}", i))).collect();
            let inserted = tree.add_child_nodes(parent, nodes).unwrap();
            tree.remove_child_nodes(parent, &inserted).unwrap();
            let output = adapter.end_of_cycle(&tree).unwrap();

            prop_assert!(output.is_empty(), "unexpected events {:?}", output.events);
            for node in inserted {
                prop_assert!(!adapter.registry().contains(node));
            }
        }
    }
}
