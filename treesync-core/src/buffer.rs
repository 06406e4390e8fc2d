//! Per-cycle event buffering and coalescing.
//!
//! Model notifications are collected as [`BufferedEvent`]s during a cycle and
//! reduced to a minimal, order-preserving sequence by
//! [`EventBuffer::consume_and_coalesce`]. The buffer is pure data: ancestry
//! questions are answered by a [`ParentLookup`] supplied by the caller.
//!
//! Passes, applied in this order:
//!
//! 1. Insert-then-delete of the same node cancels both, along with anything
//!    that happened below the node in between. Delete-then-reinsert under
//!    the same parent becomes an update.
//! 2. An all-children-deleted event for P drops earlier node-level events
//!    about P's descendants. Selection is never dropped here.
//! 3. Only the last selection survives. Updates of nodes inserted earlier in
//!    the cycle are dropped. Adjacent events of the same shape merge, and
//!    runs of node-changed or node-expanded keep the last event per node.
//! 4. Events left without nodes are removed.
//!
//! Everything else keeps its relative order.

use std::collections::{HashMap, HashSet};

use crate::model::NodeKey;
use crate::registry::NodeIdRegistry;

/// Answers "who is the parent of this node".
pub trait ParentLookup {
    fn parent_of(&self, node: NodeKey) -> Option<NodeKey>;

    /// Whether `ancestor` is a strict ancestor of `node`.
    fn is_descendant_of(&self, node: NodeKey, ancestor: NodeKey) -> bool {
        let mut seen = HashSet::new();
        let mut current = self.parent_of(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            if !seen.insert(parent) {
                return false;
            }
            current = self.parent_of(parent);
        }
        false
    }
}

impl ParentLookup for HashMap<NodeKey, NodeKey> {
    fn parent_of(&self, node: NodeKey) -> Option<NodeKey> {
        self.get(&node).copied()
    }
}

impl ParentLookup for NodeIdRegistry {
    fn parent_of(&self, node: NodeKey) -> Option<NodeKey> {
        NodeIdRegistry::parent_of(self, node)
    }
}

/// Adapts a closure to [`ParentLookup`].
pub struct ParentFn<F>(pub F);

impl<F> ParentLookup for ParentFn<F>
where
    F: Fn(NodeKey) -> Option<NodeKey>,
{
    fn parent_of(&self, node: NodeKey) -> Option<NodeKey> {
        (self.0)(node)
    }
}

/// Event type used to match echo conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeEventType {
    NodesInserted,
    NodesUpdated,
    NodesDeleted,
    AllChildNodesDeleted,
    NodeExpanded,
    NodeCollapsed,
    NodeExpandedRecursive,
    NodeCollapsedRecursive,
    NodesSelected,
    NodesChecked,
    NodeChanged,
    ChildNodeOrderChanged,
    RequestFocus,
    ScrollToSelection,
}

impl std::fmt::Display for TreeEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NodesInserted => "nodes_inserted",
            Self::NodesUpdated => "nodes_updated",
            Self::NodesDeleted => "nodes_deleted",
            Self::AllChildNodesDeleted => "all_child_nodes_deleted",
            Self::NodeExpanded => "node_expanded",
            Self::NodeCollapsed => "node_collapsed",
            Self::NodeExpandedRecursive => "node_expanded_recursive",
            Self::NodeCollapsedRecursive => "node_collapsed_recursive",
            Self::NodesSelected => "nodes_selected",
            Self::NodesChecked => "nodes_checked",
            Self::NodeChanged => "node_changed",
            Self::ChildNodeOrderChanged => "child_node_order_changed",
            Self::RequestFocus => "request_focus",
            Self::ScrollToSelection => "scroll_to_selection",
        };
        f.write_str(name)
    }
}

/// A model mutation waiting for the end of the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferedEvent {
    NodesInserted { parent: NodeKey, nodes: Vec<NodeKey> },
    NodesUpdated { parent: NodeKey, nodes: Vec<NodeKey> },
    NodesDeleted { parent: NodeKey, nodes: Vec<NodeKey> },
    AllChildNodesDeleted { parent: NodeKey, children: Vec<NodeKey> },
    NodeExpanded {
        node: NodeKey,
        expanded: bool,
        recursive: bool,
    },
    NodesSelected { nodes: Vec<NodeKey> },
    NodesChecked { nodes: Vec<NodeKey> },
    NodeChanged { node: NodeKey },
    ChildNodeOrderChanged { parent: NodeKey, children: Vec<NodeKey> },
    RequestFocus,
    ScrollToSelection,
}

impl BufferedEvent {
    pub fn event_type(&self) -> TreeEventType {
        match self {
            Self::NodesInserted { .. } => TreeEventType::NodesInserted,
            Self::NodesUpdated { .. } => TreeEventType::NodesUpdated,
            Self::NodesDeleted { .. } => TreeEventType::NodesDeleted,
            Self::AllChildNodesDeleted { .. } => TreeEventType::AllChildNodesDeleted,
            Self::NodeExpanded {
                expanded,
                recursive,
                ..
            } => match (*expanded, *recursive) {
                (true, false) => TreeEventType::NodeExpanded,
                (false, false) => TreeEventType::NodeCollapsed,
                (true, true) => TreeEventType::NodeExpandedRecursive,
                (false, true) => TreeEventType::NodeCollapsedRecursive,
            },
            Self::NodesSelected { .. } => TreeEventType::NodesSelected,
            Self::NodesChecked { .. } => TreeEventType::NodesChecked,
            Self::NodeChanged { .. } => TreeEventType::NodeChanged,
            Self::ChildNodeOrderChanged { .. } => TreeEventType::ChildNodeOrderChanged,
            Self::RequestFocus => TreeEventType::RequestFocus,
            Self::ScrollToSelection => TreeEventType::ScrollToSelection,
        }
    }

    /// The nodes this event is about (children for order changes).
    pub fn nodes(&self) -> Vec<NodeKey> {
        match self {
            Self::NodesInserted { nodes, .. }
            | Self::NodesUpdated { nodes, .. }
            | Self::NodesDeleted { nodes, .. }
            | Self::NodesSelected { nodes }
            | Self::NodesChecked { nodes } => nodes.clone(),
            Self::AllChildNodesDeleted { children, .. }
            | Self::ChildNodeOrderChanged { children, .. } => children.clone(),
            Self::NodeExpanded { node, .. } | Self::NodeChanged { node } => vec![*node],
            Self::RequestFocus | Self::ScrollToSelection => Vec::new(),
        }
    }

    /// Copy of this event scoped to `nodes`. Events about a single node or no
    /// node at all are returned unchanged.
    pub fn with_nodes(&self, nodes: Vec<NodeKey>) -> Self {
        match self {
            Self::NodesInserted { parent, .. } => Self::NodesInserted {
                parent: *parent,
                nodes,
            },
            Self::NodesUpdated { parent, .. } => Self::NodesUpdated {
                parent: *parent,
                nodes,
            },
            Self::NodesDeleted { parent, .. } => Self::NodesDeleted {
                parent: *parent,
                nodes,
            },
            Self::AllChildNodesDeleted { parent, .. } => Self::AllChildNodesDeleted {
                parent: *parent,
                children: nodes,
            },
            Self::NodesSelected { .. } => Self::NodesSelected { nodes },
            Self::NodesChecked { .. } => Self::NodesChecked { nodes },
            Self::ChildNodeOrderChanged { parent, .. } => Self::ChildNodeOrderChanged {
                parent: *parent,
                children: nodes,
            },
            other => other.clone(),
        }
    }

    /// Parent node the event is scoped to, if any.
    pub fn parent(&self) -> Option<NodeKey> {
        match self {
            Self::NodesInserted { parent, .. }
            | Self::NodesUpdated { parent, .. }
            | Self::NodesDeleted { parent, .. }
            | Self::AllChildNodesDeleted { parent, .. }
            | Self::ChildNodeOrderChanged { parent, .. } => Some(*parent),
            _ => None,
        }
    }

    /// Whether nothing is left to report. An empty selection still means
    /// "deselect everything".
    fn is_empty(&self) -> bool {
        match self {
            Self::NodesInserted { nodes, .. }
            | Self::NodesUpdated { nodes, .. }
            | Self::NodesDeleted { nodes, .. }
            | Self::NodesChecked { nodes } => nodes.is_empty(),
            Self::ChildNodeOrderChanged { children, .. } => children.is_empty(),
            _ => false,
        }
    }

    /// Strip every reference to `node` or its descendants. Returns `None` if
    /// the event is entirely about that subtree.
    fn without_subtree(self, node: NodeKey, lookup: &dyn ParentLookup) -> Option<Self> {
        let in_subtree = |n: NodeKey| n == node || lookup.is_descendant_of(n, node);
        if let Some(parent) = self.parent() {
            if in_subtree(parent) {
                return None;
            }
        }
        match self {
            Self::NodeExpanded { node: n, .. } | Self::NodeChanged { node: n } if in_subtree(n) => {
                None
            }
            Self::NodesSelected { .. } | Self::AllChildNodesDeleted { .. } => Some(self),
            Self::NodesInserted { .. }
            | Self::NodesUpdated { .. }
            | Self::NodesDeleted { .. }
            | Self::NodesChecked { .. }
            | Self::ChildNodeOrderChanged { .. } => {
                let kept: Vec<NodeKey> = self.nodes().into_iter().filter(|n| !in_subtree(*n)).collect();
                Some(self.with_nodes(kept))
            }
            other => Some(other),
        }
    }
}

/// Ordered event buffer for one processing cycle.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<BufferedEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: BufferedEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Drop everything buffered so far.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Drain the buffer and return the coalesced sequence.
    pub fn consume_and_coalesce(&mut self, lookup: &dyn ParentLookup) -> Vec<BufferedEvent> {
        let events = std::mem::take(&mut self.events);
        coalesce(events, lookup)
    }
}

/// Reduce `events` to a minimal equivalent sequence.
pub fn coalesce(events: Vec<BufferedEvent>, lookup: &dyn ParentLookup) -> Vec<BufferedEvent> {
    let events = cancel_insert_delete(events, lookup);
    let events = reinsert_as_update(events);
    let events = subsume_all_child_deletes(events, lookup);
    let events = keep_last_selection(events);
    let events = drop_updates_of_inserted(events, lookup);
    let events = events.into_iter().filter(|e| !e.is_empty()).collect();
    let events = merge_adjacent(events);
    let events = dedupe_runs(events);
    events.into_iter().filter(|e| !e.is_empty()).collect()
}

/// Rule 1a: a node inserted and deleted in the same cycle never existed for
/// the client.
fn cancel_insert_delete(
    mut events: Vec<BufferedEvent>,
    lookup: &dyn ParentLookup,
) -> Vec<BufferedEvent> {
    let mut i = 0;
    while i < events.len() {
        let inserted = match &events[i] {
            BufferedEvent::NodesInserted { nodes, .. } => nodes.clone(),
            _ => {
                i += 1;
                continue;
            }
        };
        for node in inserted {
            let delete_at = events.iter().enumerate().skip(i + 1).find_map(|(j, e)| match e {
                BufferedEvent::NodesDeleted { nodes, .. } if nodes.contains(&node) => Some(j),
                _ => None,
            });
            let Some(j) = delete_at else { continue };

            events[i] = remove_node(&events[i], node);
            events[j] = remove_node(&events[j], node);
            let between: Vec<BufferedEvent> = events.drain(i + 1..j).collect();
            let cleaned: Vec<BufferedEvent> = between
                .into_iter()
                .filter_map(|e| e.without_subtree(node, lookup))
                .collect();
            let tail = events.split_off(i + 1);
            events.extend(cleaned);
            events.extend(tail);
        }
        i += 1;
    }
    events
}

/// Rule 1b: delete-then-reinsert under the same parent only changes state.
fn reinsert_as_update(mut events: Vec<BufferedEvent>) -> Vec<BufferedEvent> {
    let mut updates: HashMap<usize, (NodeKey, Vec<NodeKey>)> = HashMap::new();
    for i in 0..events.len() {
        let (deleted_parent, deleted) = match &events[i] {
            BufferedEvent::NodesDeleted { parent, nodes } => (*parent, nodes.clone()),
            _ => continue,
        };
        for node in deleted {
            let reinsert_at = events.iter().enumerate().skip(i + 1).find_map(|(j, e)| match e {
                BufferedEvent::NodesInserted { parent, nodes }
                    if *parent == deleted_parent && nodes.contains(&node) =>
                {
                    Some(j)
                }
                _ => None,
            });
            let Some(j) = reinsert_at else { continue };
            events[i] = remove_node(&events[i], node);
            events[j] = remove_node(&events[j], node);
            updates
                .entry(j)
                .or_insert_with(|| (deleted_parent, Vec::new()))
                .1
                .push(node);
        }
    }
    if updates.is_empty() {
        return events;
    }
    let mut out = Vec::with_capacity(events.len() + updates.len());
    for (j, event) in events.into_iter().enumerate() {
        out.push(event);
        if let Some((parent, nodes)) = updates.remove(&j) {
            out.push(BufferedEvent::NodesUpdated { parent, nodes });
        }
    }
    out
}

/// Rule 3: all-children-deleted makes earlier events below its parent moot.
/// Nodes of dropped delete events are folded into the all-children event so
/// their ids are still retired.
fn subsume_all_child_deletes(
    events: Vec<BufferedEvent>,
    lookup: &dyn ParentLookup,
) -> Vec<BufferedEvent> {
    let mut out: Vec<BufferedEvent> = Vec::with_capacity(events.len());
    for event in events {
        let (parent, mut children) = match event {
            BufferedEvent::AllChildNodesDeleted { parent, children } => (parent, children),
            other => {
                out.push(other);
                continue;
            }
        };

        let deleted_here: Vec<NodeKey> = out
            .iter()
            .filter_map(|e| match e {
                BufferedEvent::NodesDeleted { parent: p, nodes }
                | BufferedEvent::AllChildNodesDeleted {
                    parent: p,
                    children: nodes,
                } if *p == parent => Some(nodes.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        union_into(&mut children, &deleted_here);

        let below = |n: NodeKey| children.contains(&n) || lookup.is_descendant_of(n, parent);
        out = out
            .into_iter()
            .filter_map(|earlier| subsumed(earlier, parent, &below))
            .collect();
        out.push(BufferedEvent::AllChildNodesDeleted { parent, children });
    }
    out
}

/// What is left of `earlier` once every child of `parent` is gone.
fn subsumed(
    earlier: BufferedEvent,
    parent: NodeKey,
    below: &dyn Fn(NodeKey) -> bool,
) -> Option<BufferedEvent> {
    match earlier {
        BufferedEvent::NodesSelected { .. } => Some(earlier),
        e if e.parent().is_some_and(|p| p == parent || below(p)) => None,
        BufferedEvent::NodeExpanded { node, .. } | BufferedEvent::NodeChanged { node }
            if below(node) =>
        {
            None
        }
        BufferedEvent::NodesChecked { nodes } => Some(BufferedEvent::NodesChecked {
            nodes: nodes.into_iter().filter(|n| !below(*n)).collect(),
        }),
        other => Some(other),
    }
}

fn keep_last_selection(events: Vec<BufferedEvent>) -> Vec<BufferedEvent> {
    let last = events
        .iter()
        .rposition(|e| matches!(e, BufferedEvent::NodesSelected { .. }));
    events
        .into_iter()
        .enumerate()
        .filter(|(i, e)| !matches!(e, BufferedEvent::NodesSelected { .. }) || Some(*i) == last)
        .map(|(_, e)| e)
        .collect()
}

/// An insertion serializes the node's current state, so later updates of the
/// same node (or of anything inside the inserted subtree) are redundant.
fn drop_updates_of_inserted(
    events: Vec<BufferedEvent>,
    lookup: &dyn ParentLookup,
) -> Vec<BufferedEvent> {
    let mut inserted: Vec<NodeKey> = Vec::new();
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        match event {
            BufferedEvent::NodesInserted { ref nodes, .. } => {
                inserted.extend(nodes.iter().copied());
                out.push(event);
            }
            BufferedEvent::NodesUpdated { parent, nodes } => {
                let kept = nodes
                    .into_iter()
                    .filter(|n| {
                        !inserted
                            .iter()
                            .any(|i| i == n || lookup.is_descendant_of(*n, *i))
                    })
                    .collect();
                out.push(BufferedEvent::NodesUpdated {
                    parent,
                    nodes: kept,
                });
            }
            BufferedEvent::NodesDeleted { ref nodes, .. } => {
                inserted.retain(|i| !nodes.contains(i));
                out.push(event);
            }
            other => out.push(other),
        }
    }
    out
}

/// Rule 2: merge adjacent events of the same shape.
fn merge_adjacent(events: Vec<BufferedEvent>) -> Vec<BufferedEvent> {
    let mut out: Vec<BufferedEvent> = Vec::with_capacity(events.len());
    for event in events {
        let merged = match (out.last_mut(), &event) {
            (
                Some(BufferedEvent::NodesInserted { parent: p1, nodes: n1 }),
                BufferedEvent::NodesInserted { parent: p2, nodes: n2 },
            )
            | (
                Some(BufferedEvent::NodesUpdated { parent: p1, nodes: n1 }),
                BufferedEvent::NodesUpdated { parent: p2, nodes: n2 },
            )
            | (
                Some(BufferedEvent::NodesDeleted { parent: p1, nodes: n1 }),
                BufferedEvent::NodesDeleted { parent: p2, nodes: n2 },
            ) if p1 == p2 => {
                union_into(n1, n2);
                true
            }
            (
                Some(BufferedEvent::NodesChecked { nodes: n1 }),
                BufferedEvent::NodesChecked { nodes: n2 },
            ) => {
                union_into(n1, n2);
                true
            }
            (
                Some(BufferedEvent::ChildNodeOrderChanged { parent: p1, children: c1 }),
                BufferedEvent::ChildNodeOrderChanged { parent: p2, children: c2 },
            ) if p1 == p2 => {
                *c1 = c2.clone();
                true
            }
            _ => false,
        };
        if !merged {
            out.push(event);
        }
    }
    out
}

fn union_into(target: &mut Vec<NodeKey>, extra: &[NodeKey]) {
    for node in extra {
        if !target.contains(node) {
            target.push(*node);
        }
    }
}

/// Within a run of adjacent node-changed (or node-expanded) events keep only
/// the last event per node.
fn dedupe_runs(events: Vec<BufferedEvent>) -> Vec<BufferedEvent> {
    let run_key = |e: &BufferedEvent| match e {
        BufferedEvent::NodeChanged { node } => Some((0u8, *node)),
        BufferedEvent::NodeExpanded { node, .. } => Some((1u8, *node)),
        _ => None,
    };
    let mut out = Vec::with_capacity(events.len());
    let mut i = 0;
    while i < events.len() {
        let Some((kind, _)) = run_key(&events[i]) else {
            out.push(events[i].clone());
            i += 1;
            continue;
        };
        let mut end = i;
        while end < events.len() && run_key(&events[end]).map(|(k, _)| k) == Some(kind) {
            end += 1;
        }
        for j in i..end {
            let key = run_key(&events[j]);
            let superseded = (j + 1..end).any(|k| run_key(&events[k]) == key);
            if !superseded {
                out.push(events[j].clone());
            }
        }
        i = end;
    }
    out
}

fn remove_node(event: &BufferedEvent, node: NodeKey) -> BufferedEvent {
    let kept = event.nodes().into_iter().filter(|n| *n != node).collect();
    event.with_nodes(kept)
}
