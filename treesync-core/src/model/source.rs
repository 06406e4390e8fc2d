//! The model-facing interface consumed by the adapter.

use tokio::sync::mpsc;

use super::types::{NodeKey, TreeEvent, TreeNode, TreeProperties};

/// Identifies one subscription to a model's notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a model subscription.
///
/// Notifications are queued synchronously by the model while it mutates; the
/// subscriber drains them when it is ready to process them.
#[derive(Debug)]
pub struct TreeSubscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<TreeEvent>,
}

impl TreeSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Take the next queued notification, if any.
    pub fn try_next(&mut self) -> Option<TreeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Take every queued notification.
    pub fn drain(&mut self) -> Vec<TreeEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
}

/// Subscriber list a model implementation can embed.
#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: u64,
    senders: Vec<(SubscriptionId, mpsc::UnboundedSender<TreeEvent>)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> TreeSubscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.push((id, sender));
        TreeSubscription { id, receiver }
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(sid, _)| *sid != id);
        self.senders.len() != before
    }

    /// Queue an event for every live subscriber.
    pub fn notify(&mut self, event: TreeEvent) {
        // Receivers dropped without unsubscribing are pruned here.
        self.senders
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// A tree model the adapter can synchronize.
///
/// The adapter reads node state through this trait and mutates the model only
/// through the `*_from_ui` facade methods. Implementations must notify
/// subscribers synchronously, before a facade call returns.
pub trait TreeModel {
    fn root_node(&self) -> NodeKey;

    fn is_root_node_visible(&self) -> bool;

    /// `None` once the node has been removed from the model.
    fn node(&self, key: NodeKey) -> Option<&TreeNode>;

    fn selected_nodes(&self) -> Vec<NodeKey>;

    fn properties(&self) -> &TreeProperties;

    fn subscribe(&mut self) -> TreeSubscription;

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    fn set_nodes_selected_from_ui(&mut self, nodes: &[NodeKey]);

    fn set_node_expanded_from_ui(&mut self, node: NodeKey, expanded: bool, lazy: bool);

    fn set_nodes_checked_from_ui(&mut self, nodes: &[NodeKey], checked: bool);

    fn fire_node_click_from_ui(&mut self, node: NodeKey);

    fn fire_node_action_from_ui(&mut self, node: NodeKey);

    fn child_nodes(&self, key: NodeKey) -> &[NodeKey] {
        self.node(key).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn parent_node(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key).and_then(|n| n.parent)
    }

    fn is_node_accepted(&self, key: NodeKey) -> bool {
        self.node(key).map(TreeNode::is_accepted).unwrap_or(false)
    }

    fn is_invisible_root(&self, key: NodeKey) -> bool {
        !self.is_root_node_visible() && key == self.root_node()
    }

    fn accepted_child_nodes(&self, key: NodeKey) -> Vec<NodeKey> {
        self.child_nodes(key)
            .iter()
            .copied()
            .filter(|child| self.is_node_accepted(*child))
            .collect()
    }

    /// Nodes shown at the top of the client tree, accepted or not.
    fn top_level_nodes(&self) -> Vec<NodeKey> {
        let root = self.root_node();
        if self.is_root_node_visible() {
            vec![root]
        } else {
            self.child_nodes(root).to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_notify_and_drain() {
        let mut subscribers = Subscribers::new();
        let mut sub = subscribers.subscribe();
        assert_eq!(subscribers.len(), 1);

        subscribers.notify(TreeEvent::RequestFocus);
        subscribers.notify(TreeEvent::ScrollToSelection);

        assert_eq!(
            sub.drain(),
            vec![TreeEvent::RequestFocus, TreeEvent::ScrollToSelection]
        );
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut subscribers = Subscribers::new();
        let mut sub = subscribers.subscribe();
        assert!(subscribers.unsubscribe(sub.id()));
        assert!(!subscribers.unsubscribe(sub.id()));

        subscribers.notify(TreeEvent::RequestFocus);
        assert!(sub.try_next().is_none());
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let mut subscribers = Subscribers::new();
        let sub = subscribers.subscribe();
        drop(sub);
        subscribers.notify(TreeEvent::RequestFocus);
        assert!(subscribers.is_empty());
    }
}
