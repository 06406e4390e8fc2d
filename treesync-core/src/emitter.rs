//! Outbound channel for wire messages.
//!
//! The adapter hands every serialized event to a [`WireEmitter`]; how the
//! messages reach the client is up to the embedder.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::wire::{TreeSnapshot, TreeWireEvent};

/// Anything the adapter sends to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WireMessage {
    Event(TreeWireEvent),
    Snapshot(TreeSnapshot),
}

impl WireMessage {
    pub fn as_event(&self) -> Option<&TreeWireEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Snapshot(_) => None,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Trait for wire message sinks.
pub trait WireEmitter: Send + Sync {
    /// Emit one incremental event.
    fn emit(&self, event: TreeWireEvent);

    /// Emit a full snapshot.
    fn emit_snapshot(&self, snapshot: TreeSnapshot);

    /// Emit the events of one cycle, in order.
    fn emit_all(&self, events: Vec<TreeWireEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Broadcast-based emitter.
pub struct BroadcastEmitter {
    sender: broadcast::Sender<WireMessage>,
}

impl BroadcastEmitter {
    /// Create new broadcast emitter with channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to wire messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WireMessage> {
        self.sender.subscribe()
    }

    /// Get number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for BroadcastEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastEmitter")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl WireEmitter for BroadcastEmitter {
    fn emit(&self, event: TreeWireEvent) {
        // no receivers is not an error
        let _ = self.sender.send(WireMessage::Event(event));
    }

    fn emit_snapshot(&self, snapshot: TreeSnapshot) {
        let _ = self.sender.send(WireMessage::Snapshot(snapshot));
    }
}

/// Collecting emitter that stores messages in a Vec.
#[derive(Debug, Default, Clone)]
pub struct CollectingEmitter {
    messages: Arc<RwLock<Vec<WireMessage>>>,
}

impl CollectingEmitter {
    /// Create new collecting emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected messages.
    pub fn messages(&self) -> Vec<WireMessage> {
        self.messages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Collected incremental events, snapshots skipped.
    pub fn events(&self) -> Vec<TreeWireEvent> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                WireMessage::Event(event) => Some(event),
                WireMessage::Snapshot(_) => None,
            })
            .collect()
    }

    /// Clear collected messages.
    pub fn clear(&self) {
        self.with_messages(|messages| messages.clear());
    }

    fn with_messages(&self, f: impl FnOnce(&mut Vec<WireMessage>)) {
        let mut guard = self
            .messages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }
}

impl WireEmitter for CollectingEmitter {
    fn emit(&self, event: TreeWireEvent) {
        self.with_messages(|messages| messages.push(WireMessage::Event(event)));
    }

    fn emit_snapshot(&self, snapshot: TreeSnapshot) {
        self.with_messages(|messages| messages.push(WireMessage::Snapshot(snapshot)));
    }
}

/// Null emitter that discards all messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmitter;

impl WireEmitter for NullEmitter {
    fn emit(&self, _event: TreeWireEvent) {}
    fn emit_snapshot(&self, _snapshot: TreeSnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeId;

    fn selected(id: &str) -> TreeWireEvent {
        TreeWireEvent::NodesSelected {
            node_ids: vec![NodeId::new(id)],
        }
    }

    #[test]
    fn test_collecting_emitter() {
        let emitter = CollectingEmitter::new();
        emitter.emit_all(vec![selected("a"), TreeWireEvent::RequestFocus]);
        emitter.emit(selected("b"));

        let events = emitter.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], selected("b"));

        emitter.clear();
        assert!(emitter.messages().is_empty());
    }

    #[test]
    fn test_collecting_emitter_clones_share_storage() {
        let emitter = CollectingEmitter::new();
        let handle = emitter.clone();
        emitter.emit(TreeWireEvent::ScrollToSelection);
        assert_eq!(handle.events(), vec![TreeWireEvent::ScrollToSelection]);
    }

    #[test]
    fn test_null_emitter() {
        let emitter = NullEmitter;
        emitter.emit(TreeWireEvent::RequestFocus);
    }

    #[test]
    fn test_wire_message_envelope() {
        let json = WireMessage::Event(TreeWireEvent::RequestFocus)
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"Event","data":{"type":"requestFocus"}}"#);
        let back = WireMessage::from_json(&json).unwrap();
        assert_eq!(back.as_event(), Some(&TreeWireEvent::RequestFocus));
    }

    #[test]
    fn test_broadcast_emitter_creation() {
        let emitter = BroadcastEmitter::new(100);
        assert_eq!(emitter.subscriber_count(), 0);

        let _rx = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_emitter_delivers_in_order() {
        let emitter = BroadcastEmitter::new(8);
        let mut rx = emitter.subscribe();

        emitter.emit(selected("a"));
        emitter.emit(TreeWireEvent::RequestFocus);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, WireMessage::Event(selected("a")));
        assert_eq!(second, WireMessage::Event(TreeWireEvent::RequestFocus));
    }
}
