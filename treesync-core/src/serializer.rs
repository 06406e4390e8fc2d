//! Conversion of model state and buffered events into wire messages.
//!
//! Deleted and filtered-out nodes do not exist for the client and the
//! invisible root never has an id, so every node reference goes through the
//! same acceptance check. Only [`WireSerializer::node_to_wire`] allocates ids;
//! every other reference uses the id the client already knows.

use tracing::trace;

use crate::buffer::BufferedEvent;
use crate::model::{NodeKey, TreeModel};
use crate::registry::{NodeId, NodeIdRegistry};
use crate::wire::{
    TreeSnapshot, TreeWireEvent, WireCell, WireNode, WireNodeChecked, WireNodeUpdate,
};

/// Serializes against one model and registry.
pub struct WireSerializer<'a, M: TreeModel + ?Sized> {
    model: &'a M,
    registry: &'a mut NodeIdRegistry,
    auto_check_child_nodes: bool,
    collapse_full_deletes: bool,
    accepted: Vec<NodeKey>,
}

impl<'a, M: TreeModel + ?Sized> WireSerializer<'a, M> {
    pub fn new(model: &'a M, registry: &'a mut NodeIdRegistry) -> Self {
        let auto_check_child_nodes = model.properties().auto_check_child_nodes;
        Self {
            model,
            registry,
            auto_check_child_nodes,
            collapse_full_deletes: true,
            accepted: Vec::new(),
        }
    }

    pub fn with_auto_check_child_nodes(mut self, enabled: bool) -> Self {
        self.auto_check_child_nodes = enabled;
        self
    }

    pub fn with_collapse_full_deletes(mut self, enabled: bool) -> Self {
        self.collapse_full_deletes = enabled;
        self
    }

    /// Nodes serialized by `node_to_wire` since the last call.
    pub fn take_accepted(&mut self) -> Vec<NodeKey> {
        std::mem::take(&mut self.accepted)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    fn is_visible(&self, node: NodeKey) -> bool {
        self.model.is_node_accepted(node) && !self.model.is_invisible_root(node)
    }

    /// Id the client knows for an accepted node.
    fn known_id(&self, node: NodeKey) -> Option<NodeId> {
        if !self.is_visible(node) {
            return None;
        }
        self.registry.opt_id(node).cloned()
    }

    /// Serialize `node` and its accepted subtree, allocating ids as needed.
    pub fn node_to_wire(&mut self, node: NodeKey) -> Option<WireNode> {
        if !self.is_visible(node) {
            return None;
        }
        let model = self.model;
        let state = model.node(node)?;
        let id = self.registry.id_for(node, state.parent)?;
        self.accepted.push(node);

        let child_nodes = model
            .accepted_child_nodes(node)
            .into_iter()
            .filter_map(|child| self.node_to_wire(child))
            .collect();

        Some(WireNode {
            id,
            expanded: state.expanded,
            expanded_lazy: state.expanded_lazy,
            lazy_expanding_enabled: state.lazy_expanding_enabled,
            leaf: state.leaf,
            checked: state.checked,
            enabled: state.enabled,
            child_node_index: self.child_node_index(node),
            cell: WireCell::from(&state.cell),
            child_nodes,
        })
    }

    pub fn nodes_to_wire(&mut self, nodes: &[NodeKey]) -> Vec<WireNode> {
        nodes
            .iter()
            .filter_map(|node| self.node_to_wire(*node))
            .collect()
    }

    /// Position among the parent's accepted children. The count differs from
    /// the model's own index whenever preceding siblings are filtered.
    pub fn child_node_index(&self, node: NodeKey) -> Option<usize> {
        let parent = self.model.parent_node(node)?;
        self.model
            .accepted_child_nodes(parent)
            .iter()
            .position(|child| *child == node)
    }

    /// Client ids of the accepted nodes in `nodes`, in order.
    pub fn node_set_to_ids(&self, nodes: &[NodeKey]) -> Vec<NodeId> {
        nodes.iter().filter_map(|node| self.known_id(*node)).collect()
    }

    /// Id of a parent reference. `Ok(None)` stands for the invisible root,
    /// `Err(())` for a parent the client does not know.
    fn parent_id(&self, parent: NodeKey) -> std::result::Result<Option<NodeId>, ()> {
        if self.model.is_invisible_root(parent) {
            return Ok(None);
        }
        match self.registry.opt_id(parent) {
            Some(id) => Ok(Some(id.clone())),
            None => Err(()),
        }
    }

    /// Full visible state plus selection and tree properties.
    pub fn snapshot(&mut self) -> TreeSnapshot {
        let top_level = self.model.top_level_nodes();
        let nodes = self.nodes_to_wire(&top_level);
        let selected_node_ids = self.node_set_to_ids(&self.model.selected_nodes());
        let properties = self.model.properties();
        TreeSnapshot {
            nodes,
            selected_node_ids,
            title: properties.title.clone(),
            checkable: properties.checkable,
            multi_check: properties.multi_check,
            enabled: properties.enabled,
            auto_check_children: self.auto_check_child_nodes,
            lazy_expanding_enabled: properties.lazy_expanding_enabled,
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Wire messages for one coalesced event. Usually zero or one; a recursive
    /// expansion of the invisible root fans out per top-level node.
    pub fn event_to_wire(&mut self, event: &BufferedEvent) -> Vec<TreeWireEvent> {
        let wire = match event {
            BufferedEvent::NodesInserted { parent, nodes } => self.nodes_inserted(*parent, nodes),
            BufferedEvent::NodesUpdated { parent, nodes } => self.nodes_updated(*parent, nodes),
            BufferedEvent::NodesDeleted { parent, nodes } => self.nodes_deleted(*parent, nodes),
            BufferedEvent::AllChildNodesDeleted { parent, children } => {
                self.all_child_nodes_deleted(*parent, children)
            }
            BufferedEvent::NodeExpanded {
                node, recursive, ..
            } => return self.node_expanded(*node, *recursive),
            BufferedEvent::NodesSelected { nodes } => Some(TreeWireEvent::NodesSelected {
                node_ids: self.node_set_to_ids(nodes),
            }),
            BufferedEvent::NodesChecked { nodes } => self.nodes_checked(nodes),
            BufferedEvent::NodeChanged { node } => self.node_changed(*node),
            BufferedEvent::ChildNodeOrderChanged { parent, children } => {
                self.child_node_order_changed(*parent, children)
            }
            BufferedEvent::RequestFocus => Some(TreeWireEvent::RequestFocus),
            BufferedEvent::ScrollToSelection => Some(TreeWireEvent::ScrollToSelection),
        };
        if wire.is_none() {
            trace!(event_type = %event.event_type(), "Nothing left to send");
        }
        wire.into_iter().collect()
    }

    fn nodes_inserted(&mut self, parent: NodeKey, nodes: &[NodeKey]) -> Option<TreeWireEvent> {
        if !self.model.is_invisible_root(parent) && !self.is_visible(parent) {
            return None;
        }
        let parent_id = self.parent_id(parent).ok()?;
        // nodes the client already has arrived with an earlier insertion of
        // an ancestor
        let fresh: Vec<NodeKey> = nodes
            .iter()
            .copied()
            .filter(|node| !self.registry.contains(*node))
            .collect();
        let wire_nodes = self.nodes_to_wire(&fresh);
        if wire_nodes.is_empty() {
            return None;
        }
        Some(TreeWireEvent::NodesInserted {
            nodes: wire_nodes,
            common_parent_node_id: parent_id,
        })
    }

    fn nodes_updated(&self, parent: NodeKey, nodes: &[NodeKey]) -> Option<TreeWireEvent> {
        let updates: Vec<WireNodeUpdate> = nodes
            .iter()
            .filter_map(|node| {
                let id = self.known_id(*node)?;
                let state = self.model.node(*node)?;
                Some(WireNodeUpdate {
                    id,
                    leaf: state.leaf,
                    enabled: state.enabled,
                    lazy_expanding_enabled: state.lazy_expanding_enabled,
                })
            })
            .collect();
        if updates.is_empty() {
            return None;
        }
        Some(TreeWireEvent::NodesUpdated {
            nodes: updates,
            common_parent_node_id: self.registry.opt_id(parent).cloned(),
        })
    }

    /// The model no longer has these nodes, so only the registry is asked.
    fn nodes_deleted(&self, parent: NodeKey, nodes: &[NodeKey]) -> Option<TreeWireEvent> {
        let node_ids: Vec<NodeId> = nodes
            .iter()
            .filter_map(|node| self.registry.opt_id(*node).cloned())
            .collect();
        if node_ids.is_empty() {
            return None;
        }
        let common_parent_node_id = self.registry.opt_id(parent).cloned();
        if self.collapse_full_deletes
            && parent == self.model.root_node()
            && self.model.accepted_child_nodes(parent).is_empty()
        {
            return Some(TreeWireEvent::AllNodesDeleted {
                common_parent_node_id,
            });
        }
        Some(TreeWireEvent::NodesDeleted {
            node_ids,
            common_parent_node_id,
        })
    }

    fn all_child_nodes_deleted(
        &self,
        parent: NodeKey,
        children: &[NodeKey],
    ) -> Option<TreeWireEvent> {
        if !children.iter().any(|child| self.registry.contains(*child)) {
            return None;
        }
        let common_parent_node_id = self.parent_id(parent).ok()?;
        Some(TreeWireEvent::AllNodesDeleted {
            common_parent_node_id,
        })
    }

    fn node_expanded(&self, node: NodeKey, recursive: bool) -> Vec<TreeWireEvent> {
        if recursive && self.model.is_invisible_root(node) {
            return self
                .model
                .accepted_child_nodes(node)
                .into_iter()
                .filter_map(|child| self.single_node_expanded(child, true))
                .collect();
        }
        self.single_node_expanded(node, recursive)
            .into_iter()
            .collect()
    }

    /// Reports the model's current state, not the state at notification time.
    fn single_node_expanded(&self, node: NodeKey, recursive: bool) -> Option<TreeWireEvent> {
        let node_id = self.known_id(node)?;
        let state = self.model.node(node)?;
        Some(TreeWireEvent::NodeExpanded {
            node_id,
            expanded: state.expanded,
            expanded_lazy: state.expanded_lazy,
            recursive,
        })
    }

    fn nodes_checked(&self, nodes: &[NodeKey]) -> Option<TreeWireEvent> {
        let mut affected: Vec<NodeKey> = Vec::new();
        for node in nodes {
            push_unique(&mut affected, *node);
            if self.auto_check_child_nodes {
                for descendant in self.accepted_descendants(*node) {
                    push_unique(&mut affected, descendant);
                }
            }
        }
        let wire: Vec<WireNodeChecked> = affected
            .into_iter()
            .filter_map(|node| {
                let id = self.known_id(node)?;
                let checked = self.model.node(node)?.checked;
                Some(WireNodeChecked { id, checked })
            })
            .collect();
        if wire.is_empty() {
            return None;
        }
        Some(TreeWireEvent::NodesChecked { nodes: wire })
    }

    fn accepted_descendants(&self, node: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = self.model.accepted_child_nodes(node);
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut children = self.model.accepted_child_nodes(next);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    fn node_changed(&self, node: NodeKey) -> Option<TreeWireEvent> {
        let node_id = self.known_id(node)?;
        let state = self.model.node(node)?;
        Some(TreeWireEvent::NodeChanged {
            node_id,
            cell: WireCell::from(&state.cell),
        })
    }

    fn child_node_order_changed(
        &self,
        parent: NodeKey,
        children: &[NodeKey],
    ) -> Option<TreeWireEvent> {
        let parent_node_id = self.parent_id(parent).ok()?;
        let child_node_ids = self.node_set_to_ids(children);
        if child_node_ids.is_empty() {
            return None;
        }
        Some(TreeWireEvent::ChildNodeOrderChanged {
            parent_node_id,
            child_node_ids,
        })
    }
}

fn push_unique(nodes: &mut Vec<NodeKey>, node: NodeKey) {
    if !nodes.contains(&node) {
        nodes.push(node);
    }
}
