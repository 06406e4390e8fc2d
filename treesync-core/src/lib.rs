//! # treesync-core
//!
//! Server-side synchronization of a hierarchical tree model with a remote UI
//! client that keeps its own mirror of the tree.
//!
//! ## Core Components
//!
//! - **Model**: The tree model interface and an in-memory [`Tree`]
//! - **Registry**: Stable opaque client ids for model nodes
//! - **Buffer**: Per-cycle event buffering and coalescing
//! - **Filter**: Suppression of echoes of client-originated changes
//! - **Wire**: JSON shapes of outbound events, snapshots and inbound UI events
//! - **Adapter**: The cycle pipeline tying it all together
//!
//! ## Example
//!
//! ```rust,ignore
//! use treesync_core::{CollectingEmitter, NewNode, SyncAdapter, SyncConfig, Tree, TreeModel};
//! use std::sync::Arc;
//!
//! let mut tree = Tree::new();
//! let emitter = CollectingEmitter::new();
//! let mut adapter = SyncAdapter::new(SyncConfig::new()).with_emitter(Arc::new(emitter.clone()));
//! adapter.attach(&mut tree)?;
//! adapter.to_wire(&tree)?;
//!
//! // one request
//! adapter.on_ui_event_json(&mut tree, r#"{"type":"nodesSelected","data":{"nodeIds":[]}}"#)?;
//! tree.add_child_node(tree.root_node(), NewNode::new("Inbox"))?;
//! adapter.end_of_cycle(&tree)?;
//!
//! for event in emitter.events() {
//!     println!("{}", event.to_json()?);
//! }
//! ```

pub mod adapter;
pub mod buffer;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod model;
pub mod registry;
pub mod serializer;
pub mod wire;

// Re-exports for convenience
pub use adapter::{AdapterEvent, AdapterState, CycleOutput, ListenerId, SyncAdapter, SyncConfig};
pub use buffer::{BufferedEvent, EventBuffer, ParentLookup, TreeEventType};
pub use emitter::{BroadcastEmitter, CollectingEmitter, NullEmitter, WireEmitter, WireMessage};
pub use error::{Error, Result, Severity};
pub use filter::{EchoFilter, FilterCondition, FilterOutcome};
pub use model::{Cell, NewNode, NodeKey, Tree, TreeEvent, TreeModel, TreeNode, TreeProperties};
pub use registry::{IdStyle, NodeId, NodeIdRegistry};
pub use serializer::WireSerializer;
pub use wire::{CheckedNode, TreeSnapshot, TreeWireEvent, UiEvent, WireNode};
