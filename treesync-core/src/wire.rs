//! Wire representation of tree state and events.
//!
//! Outbound events are JSON objects discriminated by `"type"` with camelCase
//! fields. Inbound UI events use `{"type": ..., "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Cell;
use crate::registry::NodeId;

// =============================================================================
// Nodes
// =============================================================================

/// Cell payload as sent to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default)]
    pub html_enabled: bool,
}

impl From<&Cell> for WireCell {
    fn from(cell: &Cell) -> Self {
        Self {
            text: cell.text.clone(),
            icon_id: cell.icon_id.clone(),
            css_class: cell.css_class.clone(),
            tooltip_text: cell.tooltip_text.clone(),
            foreground_color: cell.foreground_color.clone(),
            background_color: cell.background_color.clone(),
            font: cell.font.clone(),
            html_enabled: cell.html_enabled,
        }
    }
}

/// A node with its accepted subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub id: NodeId,
    pub expanded: bool,
    /// Expanded, but only children of interest are shown
    #[serde(default)]
    pub expanded_lazy: bool,
    #[serde(default)]
    pub lazy_expanding_enabled: bool,
    pub leaf: bool,
    pub checked: bool,
    pub enabled: bool,
    /// Position among the parent's accepted children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_node_index: Option<usize>,
    #[serde(flatten)]
    pub cell: WireCell,
    #[serde(default)]
    pub child_nodes: Vec<WireNode>,
}

impl WireNode {
    /// Ids of this node and every node below it, depth first.
    pub fn subtree_ids(&self) -> Vec<&NodeId> {
        let mut ids = vec![&self.id];
        for child in &self.child_nodes {
            ids.extend(child.subtree_ids());
        }
        ids
    }
}

/// Structural attributes carried by nodes-updated. Checked, expanded and cell
/// changes travel in their own events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNodeUpdate {
    pub id: NodeId,
    pub leaf: bool,
    pub enabled: bool,
    #[serde(default)]
    pub lazy_expanding_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNodeChecked {
    pub id: NodeId,
    pub checked: bool,
}

// =============================================================================
// Outbound events
// =============================================================================

/// Incremental change sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TreeWireEvent {
    NodesInserted {
        nodes: Vec<WireNode>,
        common_parent_node_id: Option<NodeId>,
    },
    NodesUpdated {
        nodes: Vec<WireNodeUpdate>,
        common_parent_node_id: Option<NodeId>,
    },
    NodesDeleted {
        node_ids: Vec<NodeId>,
        common_parent_node_id: Option<NodeId>,
    },
    AllNodesDeleted {
        common_parent_node_id: Option<NodeId>,
    },
    NodeExpanded {
        node_id: NodeId,
        expanded: bool,
        #[serde(default)]
        expanded_lazy: bool,
        recursive: bool,
    },
    NodesSelected {
        node_ids: Vec<NodeId>,
    },
    NodesChecked {
        nodes: Vec<WireNodeChecked>,
    },
    NodeChanged {
        node_id: NodeId,
        #[serde(flatten)]
        cell: WireCell,
    },
    ChildNodeOrderChanged {
        parent_node_id: Option<NodeId>,
        child_node_ids: Vec<NodeId>,
    },
    RequestFocus,
    ScrollToSelection,
}

impl TreeWireEvent {
    /// The `"type"` discriminator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NodesInserted { .. } => "nodesInserted",
            Self::NodesUpdated { .. } => "nodesUpdated",
            Self::NodesDeleted { .. } => "nodesDeleted",
            Self::AllNodesDeleted { .. } => "allNodesDeleted",
            Self::NodeExpanded { .. } => "nodeExpanded",
            Self::NodesSelected { .. } => "nodesSelected",
            Self::NodesChecked { .. } => "nodesChecked",
            Self::NodeChanged { .. } => "nodeChanged",
            Self::ChildNodeOrderChanged { .. } => "childNodeOrderChanged",
            Self::RequestFocus => "requestFocus",
            Self::ScrollToSelection => "scrollToSelection",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Full visible state, sent on attach and on resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    pub nodes: Vec<WireNode>,
    pub selected_node_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub checkable: bool,
    pub multi_check: bool,
    pub enabled: bool,
    pub auto_check_children: bool,
    #[serde(default)]
    pub lazy_expanding_enabled: bool,
}

impl TreeSnapshot {
    /// Every node id in the snapshot, depth first.
    pub fn all_node_ids(&self) -> Vec<&NodeId> {
        self.nodes.iter().flat_map(WireNode::subtree_ids).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Inbound events
// =============================================================================

/// One entry of an inbound nodes-checked event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckedNode {
    pub node_id: String,
    pub checked: bool,
}

/// Event sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UiEvent {
    NodeClicked { node_id: String },
    NodeAction { node_id: String },
    NodesSelected { node_ids: Vec<String> },
    NodeExpanded {
        node_id: String,
        expanded: bool,
        #[serde(default)]
        expanded_lazy: bool,
    },
    NodesChecked { nodes: Vec<CheckedNode> },
}

impl UiEvent {
    /// Parse an inbound event. Shape errors are reported as
    /// [`Error::MalformedUiEvent`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::malformed(e.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NodeClicked { .. } => "nodeClicked",
            Self::NodeAction { .. } => "nodeAction",
            Self::NodesSelected { .. } => "nodesSelected",
            Self::NodeExpanded { .. } => "nodeExpanded",
            Self::NodesChecked { .. } => "nodesChecked",
        }
    }

    /// Every node id the event refers to.
    pub fn node_ids(&self) -> Vec<&str> {
        match self {
            Self::NodeClicked { node_id }
            | Self::NodeAction { node_id }
            | Self::NodeExpanded { node_id, .. } => vec![node_id.as_str()],
            Self::NodesSelected { node_ids } => node_ids.iter().map(String::as_str).collect(),
            Self::NodesChecked { nodes } => nodes.iter().map(|n| n.node_id.as_str()).collect(),
        }
    }
}
