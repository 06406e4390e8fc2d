//! Tree sync adapter.
//!
//! Owns the per-session state that mirrors one tree model on a remote client:
//!
//! - [`SyncAdapter`]: lifecycle, cycle processing and inbound UI events
//! - [`SyncConfig`]: id style and serialization switches
//!
//! ## Example
//!
//! ```rust,ignore
//! use treesync_core::adapter::{SyncAdapter, SyncConfig};
//! use treesync_core::model::{NewNode, Tree};
//!
//! let mut tree = Tree::new();
//! let mut adapter = SyncAdapter::new(SyncConfig::new());
//! adapter.attach(&mut tree)?;
//! let snapshot = adapter.to_wire(&tree)?;
//!
//! tree.add_child_node(tree.root_node(), NewNode::new("Inbox"))?;
//! let output = adapter.end_of_cycle(&tree)?;
//! ```

mod config;
mod sync;

#[cfg(test)]
mod proptest;

pub use config::SyncConfig;
pub use sync::{AdapterEvent, AdapterState, CycleOutput, ListenerId, SyncAdapter};
