//! Echo suppression for UI-originated mutations.
//!
//! When the client changes selection, expansion or checked state it has
//! already applied the change locally. The adapter registers a
//! [`FilterCondition`] describing the model notification it expects in
//! return; [`EchoFilter::filter`] then removes whatever part of that
//! notification the client already knows.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::buffer::{BufferedEvent, TreeEventType};
use crate::model::NodeKey;

/// Expected shape of one model notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCondition {
    /// The event is expected to be about exactly these nodes.
    Nodes {
        event_type: TreeEventType,
        nodes: Vec<NodeKey>,
    },
    /// A nodes-checked event is expected to leave these nodes checked and
    /// those unchecked.
    CheckedPartition {
        checked: Vec<NodeKey>,
        unchecked: Vec<NodeKey>,
    },
}

impl FilterCondition {
    pub fn event_type(&self) -> TreeEventType {
        match self {
            Self::Nodes { event_type, .. } => *event_type,
            Self::CheckedPartition { .. } => TreeEventType::NodesChecked,
        }
    }
}

/// Result of running one event through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// No condition applied.
    Unchanged(BufferedEvent),
    /// Some nodes were echoes; the rest still has to be sent.
    Trimmed(BufferedEvent),
    /// The whole event was an echo.
    Suppressed,
}

impl FilterOutcome {
    pub fn into_event(self) -> Option<BufferedEvent> {
        match self {
            Self::Unchanged(event) | Self::Trimmed(event) => Some(event),
            Self::Suppressed => None,
        }
    }
}

/// Queue of pending echo conditions, consumed at most once each.
#[derive(Debug, Default)]
pub struct EchoFilter {
    conditions: VecDeque<FilterCondition>,
}

impl EchoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_condition(&mut self, event_type: TreeEventType, nodes: Vec<NodeKey>) {
        self.conditions
            .push_back(FilterCondition::Nodes { event_type, nodes });
    }

    pub fn add_checked_condition(&mut self, checked: Vec<NodeKey>, unchecked: Vec<NodeKey>) {
        self.conditions
            .push_back(FilterCondition::CheckedPartition { checked, unchecked });
    }

    /// Drop every pending condition. Called at the end of each request.
    pub fn clear(&mut self) {
        self.conditions.clear();
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &FilterCondition> {
        self.conditions.iter()
    }

    /// Match `event` against the first pending condition of the same type.
    ///
    /// `is_checked` reports the model's current checked state. Nodes in
    /// `fresh_parents` received children in the current cycle; an expansion
    /// of such a node is always reported so the client expands the new
    /// children too.
    pub fn filter(
        &mut self,
        event: BufferedEvent,
        is_checked: &dyn Fn(NodeKey) -> bool,
        fresh_parents: &HashSet<NodeKey>,
    ) -> FilterOutcome {
        let event_type = event.event_type();
        let Some(index) = self
            .conditions
            .iter()
            .position(|c| c.event_type() == event_type)
        else {
            return FilterOutcome::Unchanged(event);
        };
        let Some(condition) = self.conditions.remove(index) else {
            return FilterOutcome::Unchanged(event);
        };
        debug!(event_type = %event_type, "Consumed echo condition");

        match condition {
            FilterCondition::Nodes { nodes, .. } => {
                if let BufferedEvent::NodeExpanded { node, expanded: true, .. } = &event {
                    if fresh_parents.contains(node) {
                        return FilterOutcome::Unchanged(event);
                    }
                }
                let remaining: Vec<NodeKey> = event
                    .nodes()
                    .into_iter()
                    .filter(|n| !nodes.contains(n))
                    .collect();
                trim(event, remaining)
            }
            FilterCondition::CheckedPartition { checked, unchecked } => {
                let nodes = event.nodes();
                let (now_checked, now_unchecked): (Vec<NodeKey>, Vec<NodeKey>) =
                    nodes.iter().copied().partition(|n| is_checked(*n));
                if same_set(&now_checked, &checked) && same_set(&now_unchecked, &unchecked) {
                    return FilterOutcome::Suppressed;
                }
                let remaining: Vec<NodeKey> = nodes
                    .into_iter()
                    .filter(|n| {
                        if now_checked.contains(n) {
                            !checked.contains(n)
                        } else {
                            !unchecked.contains(n)
                        }
                    })
                    .collect();
                trim(event, remaining)
            }
        }
    }
}

fn trim(event: BufferedEvent, remaining: Vec<NodeKey>) -> FilterOutcome {
    if remaining.is_empty() {
        return FilterOutcome::Suppressed;
    }
    if remaining.len() == event.nodes().len() {
        return FilterOutcome::Unchanged(event);
    }
    FilterOutcome::Trimmed(event.with_nodes(remaining))
}

fn same_set(a: &[NodeKey], b: &[NodeKey]) -> bool {
    let a: HashSet<&NodeKey> = a.iter().collect();
    let b: HashSet<&NodeKey> = b.iter().collect();
    a == b
}
