//! In-memory tree model.
//!
//! `Tree` is a small, complete implementation of [`TreeModel`] backed by a
//! node map. Every mutation notifies subscribers before it returns.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::{Error, Result};

use super::source::{Subscribers, SubscriptionId, TreeModel, TreeSubscription};
use super::types::{Cell, NodeKey, TreeEvent, TreeNode, TreeProperties};

/// Template for inserting a node together with its subtree.
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub cell: Cell,
    pub leaf: bool,
    pub expanded: bool,
    pub lazy_expanding_enabled: bool,
    pub checked: bool,
    pub enabled: bool,
    pub children: Vec<NewNode>,
}

impl NewNode {
    /// Create an enabled node with the given label.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            cell: Cell::text(text),
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_cell(mut self, cell: Cell) -> Self {
        self.cell = cell;
        self
    }

    pub fn leaf(mut self, leaf: bool) -> Self {
        self.leaf = leaf;
        self
    }

    pub fn expanded(mut self, expanded: bool) -> Self {
        self.expanded = expanded;
        self
    }

    pub fn lazy_expanding_enabled(mut self, enabled: bool) -> Self {
        self.lazy_expanding_enabled = enabled;
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_child(mut self, child: NewNode) -> Self {
        self.children.push(child);
        self
    }
}

type AcceptFn = Box<dyn Fn(&TreeNode) -> bool + Send + Sync>;

struct NodeFilter {
    accept: AcceptFn,
    by_user: bool,
}

/// In-memory tree model.
pub struct Tree {
    nodes: HashMap<NodeKey, TreeNode>,
    root: NodeKey,
    next_key: u64,
    root_visible: bool,
    selection: Vec<NodeKey>,
    properties: TreeProperties,
    filter: Option<NodeFilter>,
    subscribers: Subscribers,
    clicked: Vec<NodeKey>,
    actions: Vec<NodeKey>,
}

impl Tree {
    /// Create a tree holding only an invisible root node.
    pub fn new() -> Self {
        let root = NodeKey(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, TreeNode::new(root, None, Cell::text("root")));
        Self {
            nodes,
            root,
            next_key: 1,
            root_visible: false,
            selection: Vec::new(),
            properties: TreeProperties::default(),
            filter: None,
            subscribers: Subscribers::new(),
            clicked: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Show the root node itself as the single top-level node.
    pub fn with_root_visible(mut self, visible: bool) -> Self {
        self.root_visible = visible;
        self
    }

    pub fn with_properties(mut self, properties: TreeProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// First node whose label equals `text`.
    pub fn find_by_text(&self, text: &str) -> Option<NodeKey> {
        let mut keys: Vec<_> = self.nodes.keys().copied().collect();
        keys.sort();
        keys.into_iter()
            .find(|key| self.nodes[key].cell.text.as_deref() == Some(text))
    }

    /// Nodes clicked from the UI, oldest first.
    pub fn clicked_nodes(&self) -> &[NodeKey] {
        &self.clicked
    }

    /// Nodes whose action was fired from the UI, oldest first.
    pub fn node_actions(&self) -> &[NodeKey] {
        &self.actions
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Insert a single node (with its subtree) below `parent`.
    pub fn add_child_node(&mut self, parent: NodeKey, node: NewNode) -> Result<NodeKey> {
        let keys = self.add_child_nodes(parent, vec![node])?;
        keys.into_iter()
            .next()
            .ok_or_else(|| Error::invariant("insertion produced no node"))
    }

    /// Insert nodes (with their subtrees) below `parent`, appended in order.
    pub fn add_child_nodes(&mut self, parent: NodeKey, nodes: Vec<NewNode>) -> Result<Vec<NodeKey>> {
        self.require(parent)?;
        let mut keys = Vec::with_capacity(nodes.len());
        for template in nodes {
            keys.push(self.insert_rec(parent, template));
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.extend(keys.iter().copied());
        }
        self.apply_filter();
        if !keys.is_empty() {
            self.subscribers.notify(TreeEvent::NodesInserted {
                parent,
                nodes: keys.clone(),
            });
        }
        Ok(keys)
    }

    fn insert_rec(&mut self, parent: NodeKey, template: NewNode) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;

        let mut node = TreeNode::new(key, Some(parent), template.cell);
        node.leaf = template.leaf;
        node.expanded = template.expanded;
        node.lazy_expanding_enabled = template.lazy_expanding_enabled;
        node.checked = template.checked;
        node.enabled = template.enabled;
        self.nodes.insert(key, node);

        let children: Vec<NodeKey> = template
            .children
            .into_iter()
            .map(|child| self.insert_rec(key, child))
            .collect();
        if let Some(node) = self.nodes.get_mut(&key) {
            node.children = children;
        }
        key
    }

    /// Remove the given children of `parent` together with their subtrees.
    pub fn remove_child_nodes(&mut self, parent: NodeKey, nodes: &[NodeKey]) -> Result<()> {
        let siblings = self.require(parent)?.children.clone();
        for node in nodes {
            if !siblings.contains(node) {
                return Err(Error::unknown_node(*node));
            }
        }
        if nodes.is_empty() {
            return Ok(());
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|child| !nodes.contains(child));
        }
        let removed = self.remove_subtrees(nodes);
        self.subscribers.notify(TreeEvent::NodesDeleted {
            parent,
            nodes: nodes.to_vec(),
        });
        self.deselect(&removed);
        Ok(())
    }

    /// Remove every child of `parent`.
    pub fn remove_all_child_nodes(&mut self, parent: NodeKey) -> Result<()> {
        let children = match self.nodes.get_mut(&parent) {
            Some(node) => std::mem::take(&mut node.children),
            None => return Err(Error::unknown_node(parent)),
        };
        if children.is_empty() {
            return Ok(());
        }
        let removed = self.remove_subtrees(&children);
        self.subscribers
            .notify(TreeEvent::AllChildNodesDeleted { parent, children });
        self.deselect(&removed);
        Ok(())
    }

    fn remove_subtrees(&mut self, roots: &[NodeKey]) -> HashSet<NodeKey> {
        let mut removed = HashSet::new();
        let mut stack: Vec<NodeKey> = roots.to_vec();
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.remove(&key) {
                stack.extend(node.children);
                removed.insert(key);
            }
        }
        removed
    }

    fn deselect(&mut self, removed: &HashSet<NodeKey>) {
        let before = self.selection.len();
        self.selection.retain(|key| !removed.contains(key));
        if self.selection.len() != before {
            self.subscribers.notify(TreeEvent::NodesSelected {
                nodes: self.selection.clone(),
            });
        }
    }

    /// Replace the children order of `parent`. `order` must be a permutation
    /// of the current children.
    pub fn reorder_child_nodes(&mut self, parent: NodeKey, order: &[NodeKey]) -> Result<()> {
        let current = &self.require(parent)?.children;
        let mut expected = current.clone();
        let mut given = order.to_vec();
        expected.sort();
        given.sort();
        if expected != given {
            return Err(Error::invalid_argument(format!(
                "new child order of {parent} is not a permutation of its children"
            )));
        }
        if current.as_slice() == order {
            return Ok(());
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = order.to_vec();
        }
        self.subscribers.notify(TreeEvent::ChildNodeOrderChanged {
            parent,
            children: order.to_vec(),
        });
        Ok(())
    }

    // =========================================================================
    // Node state
    // =========================================================================

    pub fn set_node_expanded(&mut self, node: NodeKey, expanded: bool) -> Result<()> {
        self.set_node_expanded_lazy(node, expanded, false)
    }

    /// Expand `node` showing only the children of interest. The lazy flag is
    /// only kept while the node is expanded.
    pub fn set_node_expanded_lazy(
        &mut self,
        node: NodeKey,
        expanded: bool,
        lazy: bool,
    ) -> Result<()> {
        let entry = self.require_mut(node)?;
        let lazy = expanded && lazy;
        if entry.expanded == expanded && entry.expanded_lazy == lazy {
            return Ok(());
        }
        entry.expanded = expanded;
        entry.expanded_lazy = lazy;
        self.subscribers.notify(TreeEvent::NodeExpanded {
            node,
            expanded,
            recursive: false,
        });
        Ok(())
    }

    /// Expand or collapse `node` and its whole subtree with one notification.
    pub fn set_node_expanded_recursive(&mut self, node: NodeKey, expanded: bool) -> Result<()> {
        self.require(node)?;
        let mut stack = vec![node];
        while let Some(key) = stack.pop() {
            if let Some(entry) = self.nodes.get_mut(&key) {
                entry.expanded = expanded;
                entry.expanded_lazy = false;
                stack.extend(entry.children.iter().copied());
            }
        }
        self.subscribers.notify(TreeEvent::NodeExpanded {
            node,
            expanded,
            recursive: true,
        });
        Ok(())
    }

    /// Replace the selection.
    pub fn select_nodes(&mut self, nodes: &[NodeKey]) -> Result<()> {
        for node in nodes {
            self.require(*node)?;
        }
        if self.selection.as_slice() == nodes {
            return Ok(());
        }
        self.selection = nodes.to_vec();
        self.subscribers.notify(TreeEvent::NodesSelected {
            nodes: self.selection.clone(),
        });
        Ok(())
    }

    /// Set the checked flag; only nodes whose flag changes are reported.
    pub fn set_nodes_checked(&mut self, nodes: &[NodeKey], checked: bool) -> Result<()> {
        for node in nodes {
            self.require(*node)?;
        }
        let mut changed = Vec::new();
        for node in nodes {
            if let Some(entry) = self.nodes.get_mut(node) {
                if entry.checked != checked {
                    entry.checked = checked;
                    changed.push(*node);
                }
            }
        }
        if self.properties.auto_check_child_nodes {
            let mut stack: Vec<NodeKey> = nodes
                .iter()
                .flat_map(|n| self.child_nodes(*n).to_vec())
                .collect();
            while let Some(key) = stack.pop() {
                if let Some(entry) = self.nodes.get_mut(&key) {
                    entry.checked = checked;
                    stack.extend(entry.children.iter().copied());
                }
            }
        }
        if !changed.is_empty() {
            self.subscribers
                .notify(TreeEvent::NodesChecked { nodes: changed });
        }
        Ok(())
    }

    pub fn set_node_cell(&mut self, node: NodeKey, cell: Cell) -> Result<()> {
        let entry = self.require_mut(node)?;
        if entry.cell == cell {
            return Ok(());
        }
        entry.cell = cell;
        self.subscribers.notify(TreeEvent::NodeChanged { node });
        Ok(())
    }

    pub fn set_node_leaf(&mut self, node: NodeKey, leaf: bool) -> Result<()> {
        let entry = self.require_mut(node)?;
        if entry.leaf == leaf {
            return Ok(());
        }
        entry.leaf = leaf;
        self.notify_updated(node);
        Ok(())
    }

    pub fn set_node_lazy_expanding_enabled(&mut self, node: NodeKey, enabled: bool) -> Result<()> {
        let entry = self.require_mut(node)?;
        if entry.lazy_expanding_enabled == enabled {
            return Ok(());
        }
        entry.lazy_expanding_enabled = enabled;
        self.notify_updated(node);
        Ok(())
    }

    pub fn set_node_enabled(&mut self, node: NodeKey, enabled: bool) -> Result<()> {
        let entry = self.require_mut(node)?;
        if entry.enabled == enabled {
            return Ok(());
        }
        entry.enabled = enabled;
        self.notify_updated(node);
        Ok(())
    }

    fn notify_updated(&mut self, node: NodeKey) {
        let parent = self.parent_node(node).unwrap_or(self.root);
        self.subscribers.notify(TreeEvent::NodesUpdated {
            parent,
            nodes: vec![node],
        });
    }

    // =========================================================================
    // Filtering
    // =========================================================================

    /// Install a node filter. With `by_user`, rejected nodes stay known to the
    /// client, which hides them itself.
    pub fn set_filter<F>(&mut self, accept: F, by_user: bool)
    where
        F: Fn(&TreeNode) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(NodeFilter {
            accept: Box::new(accept),
            by_user,
        });
        self.apply_filter();
        self.subscribers.notify(TreeEvent::NodeFilterChanged);
    }

    pub fn clear_filter(&mut self) {
        if self.filter.take().is_none() {
            return;
        }
        self.apply_filter();
        self.subscribers.notify(TreeEvent::NodeFilterChanged);
    }

    fn apply_filter(&mut self) {
        let decisions: Vec<(NodeKey, bool, bool)> = self
            .nodes
            .values()
            .filter(|node| node.key != self.root)
            .map(|node| match &self.filter {
                Some(filter) => {
                    let accepted = (filter.accept)(node);
                    (node.key, accepted, !accepted && filter.by_user)
                }
                None => (node.key, true, false),
            })
            .collect();
        for (key, accepted, rejected_by_user) in decisions {
            if let Some(node) = self.nodes.get_mut(&key) {
                node.filter_accepted = accepted;
                node.rejected_by_user = rejected_by_user;
            }
        }
    }

    // =========================================================================
    // Misc notifications
    // =========================================================================

    pub fn request_focus(&mut self) {
        self.subscribers.notify(TreeEvent::RequestFocus);
    }

    pub fn scroll_to_selection(&mut self) {
        self.subscribers.notify(TreeEvent::ScrollToSelection);
    }

    fn require(&self, key: NodeKey) -> Result<&TreeNode> {
        self.nodes.get(&key).ok_or_else(|| Error::unknown_node(key))
    }

    fn require_mut(&mut self, key: NodeKey) -> Result<&mut TreeNode> {
        self.nodes.get_mut(&key).ok_or_else(|| Error::unknown_node(key))
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.nodes.len())
            .field("root_visible", &self.root_visible)
            .field("selection", &self.selection)
            .field("has_filter", &self.filter.is_some())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl TreeModel for Tree {
    fn root_node(&self) -> NodeKey {
        self.root
    }

    fn is_root_node_visible(&self) -> bool {
        self.root_visible
    }

    fn node(&self, key: NodeKey) -> Option<&TreeNode> {
        self.nodes.get(&key)
    }

    fn selected_nodes(&self) -> Vec<NodeKey> {
        self.selection.clone()
    }

    fn properties(&self) -> &TreeProperties {
        &self.properties
    }

    fn subscribe(&mut self) -> TreeSubscription {
        self.subscribers.subscribe()
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn set_nodes_selected_from_ui(&mut self, nodes: &[NodeKey]) {
        if let Err(e) = self.select_nodes(nodes) {
            warn!(error = %e, "Ignoring selection from UI");
        }
    }

    fn set_node_expanded_from_ui(&mut self, node: NodeKey, expanded: bool, lazy: bool) {
        if let Err(e) = self.set_node_expanded_lazy(node, expanded, lazy) {
            warn!(error = %e, "Ignoring expansion from UI");
        }
    }

    fn set_nodes_checked_from_ui(&mut self, nodes: &[NodeKey], checked: bool) {
        if let Err(e) = self.set_nodes_checked(nodes, checked) {
            warn!(error = %e, "Ignoring check state from UI");
        }
    }

    fn fire_node_click_from_ui(&mut self, node: NodeKey) {
        self.clicked.push(node);
        self.subscribers.notify(TreeEvent::NodeClick { node });
    }

    fn fire_node_action_from_ui(&mut self, node: NodeKey) {
        self.actions.push(node);
        self.subscribers.notify(TreeEvent::NodeAction { node });
    }
}
