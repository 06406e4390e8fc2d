//! Value types of the tree model.
//!
//! These are the read-only shapes the adapter consumes. Nodes are addressed by
//! [`NodeKey`], a copyable handle owned by the model; the adapter never holds
//! references into the model between calls.

use serde::{Deserialize, Serialize};

/// Model-side handle of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(pub u64);

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Display payload of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub text: Option<String>,
    pub icon_id: Option<String>,
    pub css_class: Option<String>,
    pub tooltip_text: Option<String>,
    pub foreground_color: Option<String>,
    pub background_color: Option<String>,
    /// Font pattern, e.g. `"Arial-BOLD-12"`.
    pub font: Option<String>,
    pub html_enabled: bool,
}

impl Cell {
    /// Create a cell showing the given text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_icon(mut self, icon_id: impl Into<String>) -> Self {
        self.icon_id = Some(icon_id.into());
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip_text = Some(tooltip.into());
        self
    }

    pub fn with_colors(
        mut self,
        foreground: Option<String>,
        background: Option<String>,
    ) -> Self {
        self.foreground_color = foreground;
        self.background_color = background;
        self
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }
}

/// State of a single node as exposed by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    /// All children in sibling order, accepted or not.
    pub children: Vec<NodeKey>,
    pub expanded: bool,
    /// Expanded, but the client shows only the children of interest.
    pub expanded_lazy: bool,
    pub lazy_expanding_enabled: bool,
    pub checked: bool,
    pub leaf: bool,
    pub enabled: bool,
    /// Marked for deletion but not yet removed by the model.
    pub deleted: bool,
    pub filter_accepted: bool,
    /// Rejected by a filter the client itself controls; the client still
    /// knows the node and hides it locally.
    pub rejected_by_user: bool,
    pub cell: Cell,
}

impl TreeNode {
    /// Create a node with default flags.
    pub fn new(key: NodeKey, parent: Option<NodeKey>, cell: Cell) -> Self {
        Self {
            key,
            parent,
            children: Vec::new(),
            expanded: false,
            expanded_lazy: false,
            lazy_expanding_enabled: false,
            checked: false,
            leaf: false,
            enabled: true,
            deleted: false,
            filter_accepted: true,
            rejected_by_user: false,
            cell,
        }
    }

    /// Whether the client considers this node to exist.
    ///
    /// Deleted and filtered nodes don't exist for the client, unless the node
    /// was only rejected by a user filter.
    pub fn is_accepted(&self) -> bool {
        if self.deleted {
            return false;
        }
        self.filter_accepted || self.rejected_by_user
    }
}

/// Tree-level properties sent with the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeProperties {
    pub title: Option<String>,
    pub checkable: bool,
    pub multi_check: bool,
    pub enabled: bool,
    /// Checking a node also checks its descendants.
    pub auto_check_child_nodes: bool,
    /// Nodes may be expanded lazily by the client.
    pub lazy_expanding_enabled: bool,
}

impl Default for TreeProperties {
    fn default() -> Self {
        Self {
            title: None,
            checkable: false,
            multi_check: true,
            enabled: true,
            auto_check_child_nodes: false,
            lazy_expanding_enabled: false,
        }
    }
}

/// Notification emitted by the model after a mutation.
///
/// Node sets are given in model order. `parent` is the common parent of the
/// affected nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    NodesInserted { parent: NodeKey, nodes: Vec<NodeKey> },
    NodesUpdated { parent: NodeKey, nodes: Vec<NodeKey> },
    /// The nodes (and their subtrees) are already gone from the model.
    NodesDeleted { parent: NodeKey, nodes: Vec<NodeKey> },
    /// Every child of `parent` was removed; `children` lists them.
    AllChildNodesDeleted { parent: NodeKey, children: Vec<NodeKey> },
    NodeExpanded {
        node: NodeKey,
        expanded: bool,
        recursive: bool,
    },
    /// Carries the complete new selection.
    NodesSelected { nodes: Vec<NodeKey> },
    NodesChecked { nodes: Vec<NodeKey> },
    NodeChanged { node: NodeKey },
    /// Filter flags changed somewhere in the tree.
    NodeFilterChanged,
    ChildNodeOrderChanged { parent: NodeKey, children: Vec<NodeKey> },
    NodeClick { node: NodeKey },
    NodeAction { node: NodeKey },
    RequestFocus,
    ScrollToSelection,
}

impl TreeEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodesInserted { .. } => "nodes_inserted",
            Self::NodesUpdated { .. } => "nodes_updated",
            Self::NodesDeleted { .. } => "nodes_deleted",
            Self::AllChildNodesDeleted { .. } => "all_child_nodes_deleted",
            Self::NodeExpanded { .. } => "node_expanded",
            Self::NodesSelected { .. } => "nodes_selected",
            Self::NodesChecked { .. } => "nodes_checked",
            Self::NodeChanged { .. } => "node_changed",
            Self::NodeFilterChanged => "node_filter_changed",
            Self::ChildNodeOrderChanged { .. } => "child_node_order_changed",
            Self::NodeClick { .. } => "node_click",
            Self::NodeAction { .. } => "node_action",
            Self::RequestFocus => "request_focus",
            Self::ScrollToSelection => "scroll_to_selection",
        }
    }
}
