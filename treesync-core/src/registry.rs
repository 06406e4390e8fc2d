//! Client-visible node identifiers.
//!
//! [`NodeIdRegistry`] maps model [`NodeKey`]s to opaque [`NodeId`] strings and
//! back. It also records the parent/child links of every node it has handed
//! out an id for: delete notifications arrive after the model already dropped
//! the subtree, so recursive disposal has to walk the registry's own view of
//! the hierarchy.

use std::borrow::Borrow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::NodeKey;

/// Opaque node identifier as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How new ids are generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdStyle {
    /// Random v4 uuids.
    Uuid,
    /// `prefix` followed by a per-registry counter.
    Sequential { prefix: String },
}

impl Default for IdStyle {
    fn default() -> Self {
        Self::Uuid
    }
}

/// Bidirectional node key <-> id mapping with recorded hierarchy.
#[derive(Debug, Default)]
pub struct NodeIdRegistry {
    style: IdStyle,
    next_seq: u64,
    invisible_root: Option<NodeKey>,
    ids: HashMap<NodeKey, NodeId>,
    nodes: HashMap<NodeId, NodeKey>,
    parents: HashMap<NodeKey, NodeKey>,
    children: HashMap<NodeKey, Vec<NodeKey>>,
}

impl NodeIdRegistry {
    pub fn new(style: IdStyle) -> Self {
        Self {
            style,
            ..Default::default()
        }
    }

    /// Node that never receives an id.
    pub fn set_invisible_root(&mut self, root: Option<NodeKey>) {
        self.invisible_root = root;
    }

    pub fn invisible_root(&self) -> Option<NodeKey> {
        self.invisible_root
    }

    /// Return the node's id, allocating one if needed.
    ///
    /// A newly allocated node is recorded as a child of `parent`. Returns
    /// `None` for the invisible root.
    pub fn id_for(&mut self, node: NodeKey, parent: Option<NodeKey>) -> Option<NodeId> {
        if self.invisible_root == Some(node) {
            return None;
        }
        if let Some(id) = self.ids.get(&node) {
            return Some(id.clone());
        }
        let id = self.allocate();
        self.ids.insert(node, id.clone());
        self.nodes.insert(id.clone(), node);
        self.link(node, parent);
        Some(id)
    }

    /// Existing id of the node, without allocating.
    pub fn opt_id(&self, node: NodeKey) -> Option<&NodeId> {
        self.ids.get(&node)
    }

    pub fn contains(&self, node: NodeKey) -> bool {
        self.ids.contains_key(&node)
    }

    /// Every mapped node with its id, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (NodeKey, &NodeId)> + '_ {
        self.ids.iter().map(|(node, id)| (*node, id))
    }

    /// Resolve a client id.
    pub fn node_for(&self, id: &str) -> Result<NodeKey> {
        self.opt_node(id).ok_or_else(|| Error::unknown_node_id(id))
    }

    pub fn opt_node(&self, id: &str) -> Option<NodeKey> {
        self.nodes.get(id).copied()
    }

    fn allocate(&mut self) -> NodeId {
        loop {
            let candidate = match &self.style {
                IdStyle::Uuid => NodeId(Uuid::new_v4().to_string()),
                IdStyle::Sequential { prefix } => {
                    self.next_seq += 1;
                    NodeId(format!("{}{}", prefix, self.next_seq))
                }
            };
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Record `node` as a child of `parent`, replacing any previous link.
    pub fn link(&mut self, node: NodeKey, parent: Option<NodeKey>) {
        if let Some(old) = self.parents.get(&node).copied() {
            if Some(old) == parent {
                return;
            }
            self.unlink_from_parent(node);
        }
        if let Some(parent) = parent {
            self.parents.insert(node, parent);
            let siblings = self.children.entry(parent).or_default();
            if !siblings.contains(&node) {
                siblings.push(node);
            }
        }
    }

    /// Remove `node` from its recorded parent's child list.
    pub fn unlink_from_parent(&mut self, node: NodeKey) {
        if let Some(parent) = self.parents.remove(&node) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|child| *child != node);
                if siblings.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }

    pub fn parent_of(&self, node: NodeKey) -> Option<NodeKey> {
        self.parents.get(&node).copied()
    }

    pub fn children_of(&self, node: NodeKey) -> &[NodeKey] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Drop the mapping of `node` and, if `recursive`, of its recorded
    /// descendants. Returns the nodes whose ids were removed.
    pub fn dispose(&mut self, node: NodeKey, recursive: bool) -> Vec<NodeKey> {
        self.unlink_from_parent(node);
        let mut disposed = Vec::new();
        self.dispose_rec(node, recursive, &mut disposed);
        disposed
    }

    fn dispose_rec(&mut self, node: NodeKey, recursive: bool, disposed: &mut Vec<NodeKey>) {
        if recursive {
            for child in self.children.remove(&node).unwrap_or_default() {
                self.parents.remove(&child);
                self.dispose_rec(child, true, disposed);
            }
        }
        if let Some(id) = self.ids.remove(&node) {
            self.nodes.remove(&id);
            disposed.push(node);
        }
    }

    /// Dispose every node reachable from the top of the recorded hierarchy.
    ///
    /// Entries that are not reachable (orphans) survive; see [`Self::is_empty`].
    pub fn dispose_all(&mut self) -> Vec<NodeKey> {
        let mut tops: Vec<NodeKey> = self
            .ids
            .keys()
            .copied()
            .filter(|node| !self.parents.contains_key(node))
            .collect();
        if let Some(root) = self.invisible_root {
            tops.extend(self.children_of(root).iter().copied());
        }
        tops.sort();
        let mut disposed = Vec::new();
        for top in tops {
            disposed.extend(self.dispose(top, true));
        }
        disposed
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Ids still mapped, sorted.
    pub fn remaining_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().map(|id| id.0.clone()).collect();
        ids.sort();
        ids
    }
}
