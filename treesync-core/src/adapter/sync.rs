//! The sync adapter: per-cycle pipeline and UI event handling.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use crate::buffer::{BufferedEvent, EventBuffer, ParentFn, TreeEventType};
use crate::emitter::{NullEmitter, WireEmitter};
use crate::error::{Error, Result};
use crate::filter::{EchoFilter, FilterOutcome};
use crate::model::{NodeKey, TreeEvent, TreeModel, TreeSubscription};
use crate::registry::NodeIdRegistry;
use crate::serializer::WireSerializer;
use crate::wire::{TreeSnapshot, TreeWireEvent, UiEvent};

use super::config::SyncConfig;

// =============================================================================
// Public types
// =============================================================================

/// Lifecycle state of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Detached,
    Attached,
}

/// Notification for code observing the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// Accepted nodes just sent to the client.
    NodesInserted(Vec<NodeKey>),
    /// Nodes whose client ids were retired.
    NodesDeleted(Vec<NodeKey>),
}

/// Handle returned by [`SyncAdapter::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&AdapterEvent) + Send + Sync>;

/// What one cycle sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutput {
    /// Number of the cycle, starting at 1.
    pub sequence: u64,
    /// Emitted events, in order.
    pub events: Vec<TreeWireEvent>,
    /// Events removed entirely as echoes.
    pub suppressed: usize,
    /// Sub-events dropped because they violated buffer invariants.
    pub dropped: usize,
}

impl CycleOutput {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Keeps a client-side mirror of one tree model in sync.
///
/// The adapter is driven by its owner:
///
/// - [`attach`](Self::attach) once, then [`to_wire`](Self::to_wire) for the
///   initial snapshot,
/// - [`on_ui_event`](Self::on_ui_event) for every client request,
/// - [`end_of_cycle`](Self::end_of_cycle) when a request is done,
/// - [`detach`](Self::detach) when the session ends.
///
/// Model notifications arrive through the subscription taken at attach time
/// and are pulled in by [`pump`](Self::pump), which every entry point calls.
pub struct SyncAdapter {
    config: SyncConfig,
    state: AdapterState,
    subscription: Option<TreeSubscription>,
    registry: NodeIdRegistry,
    buffer: EventBuffer,
    filter: EchoFilter,
    emitter: Arc<dyn WireEmitter>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    sequence: u64,
}

impl SyncAdapter {
    pub fn new(config: SyncConfig) -> Self {
        let registry = NodeIdRegistry::new(config.id_style.clone());
        Self {
            config,
            state: AdapterState::Detached,
            subscription: None,
            registry,
            buffer: EventBuffer::new(),
            filter: EchoFilter::new(),
            emitter: Arc::new(NullEmitter),
            listeners: Vec::new(),
            next_listener: 0,
            sequence: 0,
        }
    }

    /// Send wire messages to `emitter` in addition to returning them.
    pub fn with_emitter(mut self, emitter: Arc<dyn WireEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.state == AdapterState::Attached
    }

    pub fn registry(&self) -> &NodeIdRegistry {
        &self.registry
    }

    /// Buffered events not yet processed.
    pub fn pending_events(&self) -> usize {
        self.buffer.len()
    }

    /// Echo conditions waiting for their model notification.
    pub fn pending_conditions(&self) -> usize {
        self.filter.len()
    }

    fn require_attached(&self) -> Result<()> {
        match self.state {
            AdapterState::Attached => Ok(()),
            AdapterState::Detached => Err(Error::NotAttached),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Subscribe to `model` and assign ids to every visible node.
    pub fn attach<M: TreeModel + ?Sized>(&mut self, model: &mut M) -> Result<()> {
        if self.is_attached() {
            return Err(Error::AlreadyAttached);
        }
        self.subscription = Some(model.subscribe());
        let root = model.root_node();
        self.registry
            .set_invisible_root((!model.is_root_node_visible()).then_some(root));

        let mut serializer = WireSerializer::new(&*model, &mut self.registry);
        for node in model.top_level_nodes() {
            serializer.node_to_wire(node);
        }
        self.state = AdapterState::Attached;
        info!("Attached to tree model, {} node(s) registered", self.registry.len());
        Ok(())
    }

    /// Unsubscribe and retire every id.
    ///
    /// A non-empty registry afterwards means insert/delete accounting went
    /// wrong somewhere; this is reported as a fatal [`Error::RegistryLeak`].
    pub fn detach<M: TreeModel + ?Sized>(&mut self, model: &mut M) -> Result<()> {
        self.require_attached()?;
        if let Some(subscription) = self.subscription.take() {
            model.unsubscribe(subscription.id());
        }
        if !self.buffer.is_empty() {
            debug!("Discarding {} buffered event(s) on detach", self.buffer.len());
        }
        self.buffer.clear();
        self.filter.clear();
        self.state = AdapterState::Detached;

        let disposed = self.registry.dispose_all();
        if !disposed.is_empty() {
            self.fire(AdapterEvent::NodesDeleted(disposed));
        }

        if !self.registry.is_empty() {
            let err = Error::registry_leak(self.registry.remaining_ids());
            warn!(error = %err, "Registry not empty after detach");
            return Err(err);
        }
        info!("Detached from tree model");
        Ok(())
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Serialize the full visible state, allocating missing ids.
    pub fn to_wire<M: TreeModel + ?Sized>(&mut self, model: &M) -> Result<TreeSnapshot> {
        self.require_attached()?;
        let snapshot = self.serializer(model).snapshot();
        self.emitter.emit_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    /// Start over: drop pending events and conditions, retire all ids and
    /// send a fresh snapshot.
    pub fn resync<M: TreeModel + ?Sized>(&mut self, model: &M) -> Result<TreeSnapshot> {
        self.require_attached()?;
        self.drain_subscription();
        self.buffer.clear();
        self.filter.clear();
        let disposed = self.registry.dispose_all();
        if !disposed.is_empty() {
            self.fire(AdapterEvent::NodesDeleted(disposed));
        }
        info!("Resynchronizing client");
        self.to_wire(model)
    }

    fn serializer<'a, M: TreeModel + ?Sized>(&'a mut self, model: &'a M) -> WireSerializer<'a, M> {
        let mut serializer = WireSerializer::new(model, &mut self.registry)
            .with_collapse_full_deletes(self.config.collapse_full_deletes);
        if let Some(auto_check) = self.config.auto_check_child_nodes {
            serializer = serializer.with_auto_check_child_nodes(auto_check);
        }
        serializer
    }

    // =========================================================================
    // Model events
    // =========================================================================

    fn drain_subscription(&mut self) -> Vec<TreeEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.drain(),
            None => Vec::new(),
        }
    }

    /// Feed every notification the model has queued into the buffer.
    pub fn pump<M: TreeModel + ?Sized>(&mut self, model: &M) -> usize {
        let events = self.drain_subscription();
        let count = events.len();
        for event in events {
            self.on_model_event(model, event);
        }
        count
    }

    /// Buffer one model notification.
    pub fn on_model_event<M: TreeModel + ?Sized>(&mut self, model: &M, event: TreeEvent) {
        if !self.is_attached() {
            warn!(event = event.name(), "Ignoring model event while detached");
            return;
        }
        trace!(event = event.name(), "Model event");
        let buffered = match event {
            TreeEvent::NodesInserted { parent, nodes } => BufferedEvent::NodesInserted { parent, nodes },
            TreeEvent::NodesUpdated { parent, nodes } => BufferedEvent::NodesUpdated { parent, nodes },
            TreeEvent::NodesDeleted { parent, nodes } => BufferedEvent::NodesDeleted { parent, nodes },
            TreeEvent::AllChildNodesDeleted { parent, children } => {
                BufferedEvent::AllChildNodesDeleted { parent, children }
            }
            TreeEvent::NodeExpanded {
                node,
                expanded,
                recursive,
            } => BufferedEvent::NodeExpanded {
                node,
                expanded,
                recursive,
            },
            TreeEvent::NodesSelected { nodes } => BufferedEvent::NodesSelected { nodes },
            TreeEvent::NodesChecked { nodes } => BufferedEvent::NodesChecked { nodes },
            TreeEvent::NodeChanged { node } => BufferedEvent::NodeChanged { node },
            TreeEvent::ChildNodeOrderChanged { parent, children } => {
                BufferedEvent::ChildNodeOrderChanged { parent, children }
            }
            TreeEvent::RequestFocus => BufferedEvent::RequestFocus,
            TreeEvent::ScrollToSelection => BufferedEvent::ScrollToSelection,
            TreeEvent::NodeFilterChanged => {
                for event in self.filter_changed_events(model) {
                    self.buffer.add(event);
                }
                return;
            }
            TreeEvent::NodeClick { .. } | TreeEvent::NodeAction { .. } => return,
        };
        self.buffer.add(buffered);
    }

    /// Translate a filter change into deletions of nodes the client knows but
    /// may no longer see, followed by insertions of nodes it has not seen yet.
    /// Both are grouped by parent.
    ///
    /// A node rejected only by a user filter still counts as visible: the
    /// client must know it to hide it locally.
    fn filter_changed_events<M: TreeModel + ?Sized>(&self, model: &M) -> Vec<BufferedEvent> {
        let mut deletes: Vec<(NodeKey, Vec<NodeKey>)> = Vec::new();
        let mut inserts: Vec<(NodeKey, Vec<NodeKey>)> = Vec::new();
        let mut stack = vec![model.root_node()];
        while let Some(node) = stack.pop() {
            let mut descend = true;
            if let Some(state) = model.node(node).filter(|_| !model.is_invisible_root(node)) {
                let known = self.registry.contains(node);
                let parent = state.parent.unwrap_or(node);
                match (model.is_node_accepted(node), known) {
                    (true, false) => {
                        group(&mut inserts, parent, node);
                        descend = false;
                    }
                    (false, true) => {
                        group(&mut deletes, parent, node);
                        descend = false;
                    }
                    (false, false) => descend = false,
                    (true, true) => {}
                }
            }
            if descend {
                stack.extend(model.child_nodes(node).iter().rev().copied());
            }
        }
        debug!(
            "Filter change: {} delete group(s), {} insert group(s)",
            deletes.len(),
            inserts.len()
        );
        let deletes = deletes
            .into_iter()
            .map(|(parent, nodes)| BufferedEvent::NodesDeleted { parent, nodes });
        let inserts = inserts
            .into_iter()
            .map(|(parent, nodes)| BufferedEvent::NodesInserted { parent, nodes });
        deletes.chain(inserts).collect()
    }

    // =========================================================================
    // Cycle processing
    // =========================================================================

    /// Coalesce, filter, serialize and emit everything buffered this cycle.
    ///
    /// Echo conditions are cleared afterwards whether or not they matched.
    #[instrument(skip(self, model), fields(sequence = self.sequence + 1))]
    pub fn end_of_cycle<M: TreeModel + ?Sized>(&mut self, model: &M) -> Result<CycleOutput> {
        self.require_attached()?;
        self.pump(model);
        self.sequence += 1;
        let mut output = CycleOutput {
            sequence: self.sequence,
            ..Default::default()
        };

        let registry = &self.registry;
        let lookup = ParentFn(|node: NodeKey| {
            registry.parent_of(node).or_else(|| model.parent_node(node))
        });
        let events = self.buffer.consume_and_coalesce(&lookup);

        let fresh_parents: HashSet<NodeKey> = events
            .iter()
            .filter_map(|event| match event {
                BufferedEvent::NodesInserted { parent, .. } => Some(*parent),
                _ => None,
            })
            .collect();
        let is_checked = |node: NodeKey| model.node(node).map_or(false, |state| state.checked);
        let mut disposed_this_cycle: HashSet<NodeKey> = HashSet::new();

        for event in events {
            let event = match self.check_disposed(event, &disposed_this_cycle, &mut output) {
                Some(event) => event,
                None => continue,
            };
            let event = match self.filter.filter(event, &is_checked, &fresh_parents) {
                FilterOutcome::Suppressed => {
                    output.suppressed += 1;
                    continue;
                }
                outcome => match outcome.into_event() {
                    Some(event) => event,
                    None => continue,
                },
            };

            let mut serializer = self.serializer(model);
            let wire = serializer.event_to_wire(&event);
            let inserted = serializer.take_accepted();

            self.emitter.emit_all(wire.clone());
            output.events.extend(wire);

            if !inserted.is_empty() {
                self.fire(AdapterEvent::NodesInserted(inserted));
            }

            // ids are retired only after the event referring to them is out
            let removed = match event {
                BufferedEvent::NodesDeleted { nodes, .. } => nodes,
                BufferedEvent::AllChildNodesDeleted { children, .. } => children,
                _ => continue,
            };
            let mut disposed = Vec::new();
            for node in removed {
                self.registry.unlink_from_parent(node);
                disposed.extend(self.registry.dispose(node, true));
            }
            if !disposed.is_empty() {
                disposed_this_cycle.extend(disposed.iter().copied());
                self.fire(AdapterEvent::NodesDeleted(disposed));
            }
        }

        self.filter.clear();
        debug!(
            "Cycle {} emitted {} event(s), {} suppressed, {} dropped",
            output.sequence,
            output.events.len(),
            output.suppressed,
            output.dropped
        );
        Ok(output)
    }

    /// An update for a node whose id was retired earlier in the same cycle
    /// means coalescing missed a delete/insert pair. Drop that part and go on.
    fn check_disposed(
        &self,
        event: BufferedEvent,
        disposed: &HashSet<NodeKey>,
        output: &mut CycleOutput,
    ) -> Option<BufferedEvent> {
        let (parent, nodes) = match event {
            BufferedEvent::NodesUpdated { parent, nodes } => (parent, nodes),
            other => return Some(other),
        };
        let (stale, live): (Vec<NodeKey>, Vec<NodeKey>) =
            nodes.into_iter().partition(|node| disposed.contains(node));
        if !stale.is_empty() {
            let err = Error::invariant(format!(
                "update references {} node(s) deleted earlier in the cycle",
                stale.len()
            ));
            warn!(error = %err, severity = ?err.severity(), ?stale, "Dropping sub-event");
            output.dropped += 1;
        }
        if live.is_empty() {
            return None;
        }
        Some(BufferedEvent::NodesUpdated {
            parent,
            nodes: live,
        })
    }

    // =========================================================================
    // UI events
    // =========================================================================

    /// Parse and apply an inbound JSON event.
    pub fn on_ui_event_json<M: TreeModel + ?Sized>(&mut self, model: &mut M, json: &str) -> Result<()> {
        let event = UiEvent::from_json(json).map_err(|err| {
            warn!(error = %err, "Rejected UI event");
            err
        })?;
        self.on_ui_event(model, event)
    }

    /// Apply a client event to the model.
    ///
    /// All referenced ids are resolved before anything is touched, so an
    /// unknown id rejects the whole event without side effects. The model's
    /// notifications are buffered before this returns.
    #[instrument(skip(self, model, event), fields(event_type = event.type_name()))]
    pub fn on_ui_event<M: TreeModel + ?Sized>(&mut self, model: &mut M, event: UiEvent) -> Result<()> {
        self.require_attached()?;
        self.resolve_all(&event).map_err(|err| {
            warn!(error = %err, "Rejected UI event");
            err
        })?;

        match event {
            UiEvent::NodeClicked { node_id } => {
                let node = self.registry.node_for(&node_id)?;
                model.fire_node_click_from_ui(node);
            }
            UiEvent::NodeAction { node_id } => {
                let node = self.registry.node_for(&node_id)?;
                model.fire_node_action_from_ui(node);
            }
            UiEvent::NodesSelected { node_ids } => {
                let nodes = self.resolve(&node_ids)?;
                self.filter
                    .add_condition(TreeEventType::NodesSelected, nodes.clone());
                model.set_nodes_selected_from_ui(&nodes);
            }
            UiEvent::NodeExpanded {
                node_id,
                expanded,
                expanded_lazy,
            } => {
                let node = self.registry.node_for(&node_id)?;
                let event_type = if expanded {
                    TreeEventType::NodeExpanded
                } else {
                    TreeEventType::NodeCollapsed
                };
                self.filter.add_condition(event_type, vec![node]);
                model.set_node_expanded_from_ui(node, expanded, expanded_lazy);
            }
            UiEvent::NodesChecked { nodes } => {
                let mut checked = Vec::new();
                let mut unchecked = Vec::new();
                for entry in &nodes {
                    let node = self.registry.node_for(&entry.node_id)?;
                    if entry.checked {
                        checked.push(node);
                    } else {
                        unchecked.push(node);
                    }
                }
                self.filter
                    .add_checked_condition(checked.clone(), unchecked.clone());
                if !checked.is_empty() {
                    model.set_nodes_checked_from_ui(&checked, true);
                }
                if !unchecked.is_empty() {
                    model.set_nodes_checked_from_ui(&unchecked, false);
                }
            }
        }

        let pumped = self.pump(&*model);
        trace!("Buffered {} model event(s) from UI event", pumped);
        Ok(())
    }

    fn resolve(&self, ids: &[String]) -> Result<Vec<NodeKey>> {
        ids.iter().map(|id| self.registry.node_for(id)).collect()
    }

    fn resolve_all(&self, event: &UiEvent) -> Result<Vec<NodeKey>> {
        event
            .node_ids()
            .into_iter()
            .map(|id| self.registry.node_for(id))
            .collect()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register an observer for inserted and retired nodes.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn fire(&self, event: AdapterEvent) {
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for SyncAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncAdapter")
            .field("state", &self.state)
            .field("registered", &self.registry.len())
            .field("pending_events", &self.buffer.len())
            .field("pending_conditions", &self.filter.len())
            .field("listeners", &self.listeners.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

fn group(groups: &mut Vec<(NodeKey, Vec<NodeKey>)>, parent: NodeKey, node: NodeKey) {
    match groups.iter_mut().find(|(p, _)| *p == parent) {
        Some((_, nodes)) => nodes.push(node),
        None => groups.push((parent, vec![node])),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::emitter::CollectingEmitter;
    use crate::model::{NewNode, Tree};
    use crate::registry::NodeId;
    use crate::wire::CheckedNode;

    fn adapter() -> SyncAdapter {
        SyncAdapter::new(SyncConfig::new().sequential_ids("n"))
    }

    /// root (invisible)
    /// +-A
    /// | +-A1
    /// +-B
    fn attached() -> (SyncAdapter, Tree, NodeKey, NodeKey) {
        let mut tree = Tree::new();
        let root = tree.root_node();
        let a = tree
            .add_child_node(root, NewNode::new("A").with_child(NewNode::new("A1")))
            .unwrap();
        let b = tree.add_child_node(root, NewNode::new("B")).unwrap();
        let mut adapter = adapter();
        adapter.attach(&mut tree).unwrap();
        (adapter, tree, a, b)
    }

    fn id(adapter: &SyncAdapter, node: NodeKey) -> String {
        adapter.registry().opt_id(node).unwrap().to_string()
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut tree = Tree::new();
        let mut adapter = adapter();
        assert!(matches!(adapter.end_of_cycle(&tree), Err(Error::NotAttached)));
        assert!(matches!(adapter.detach(&mut tree), Err(Error::NotAttached)));

        adapter.attach(&mut tree).unwrap();
        assert!(matches!(adapter.attach(&mut tree), Err(Error::AlreadyAttached)));
        assert_eq!(adapter.state(), AdapterState::Attached);

        adapter.detach(&mut tree).unwrap();
        assert_eq!(adapter.state(), AdapterState::Detached);
    }

    #[test]
    fn test_attach_registers_visible_nodes_without_emitting() {
        let emitter = CollectingEmitter::new();
        let mut tree = Tree::new();
        let root = tree.root_node();
        tree.add_child_node(root, NewNode::new("A")).unwrap();
        let mut adapter = adapter().with_emitter(Arc::new(emitter.clone()));

        adapter.attach(&mut tree).unwrap();

        assert_eq!(adapter.registry().len(), 1);
        assert!(emitter.messages().is_empty());
        assert!(adapter.end_of_cycle(&tree).unwrap().is_empty());
    }

    #[test]
    fn test_insert_reaches_client_once() {
        let (mut adapter, mut tree, a, _) = attached();
        let c = tree.add_child_node(a, NewNode::new("C")).unwrap();

        let output = adapter.end_of_cycle(&tree).unwrap();

        assert_eq!(output.sequence, 1);
        assert_eq!(output.events.len(), 1);
        match &output.events[0] {
            TreeWireEvent::NodesInserted {
                nodes,
                common_parent_node_id,
            } => {
                assert_eq!(nodes[0].id.as_str(), id(&adapter, c));
                assert_eq!(nodes[0].child_node_index, Some(1));
                assert_eq!(
                    common_parent_node_id.as_ref().map(NodeId::as_str),
                    Some(id(&adapter, a).as_str())
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(adapter.end_of_cycle(&tree).unwrap().is_empty());
    }

    #[test]
    fn test_delete_retires_ids_after_serializing() {
        let (mut adapter, mut tree, a, _) = attached();
        let a_id = id(&adapter, a);
        let a1 = tree.child_nodes(a)[0];
        let root = tree.root_node();

        tree.remove_child_nodes(root, &[a]).unwrap();
        let output = adapter.end_of_cycle(&tree).unwrap();

        assert_eq!(
            output.events,
            vec![TreeWireEvent::NodesDeleted {
                node_ids: vec![NodeId::new(a_id)],
                common_parent_node_id: None
            }]
        );
        assert!(!adapter.registry().contains(a));
        assert!(!adapter.registry().contains(a1));
        assert_eq!(adapter.registry().len(), 1);
    }

    #[test]
    fn test_unknown_id_rejects_without_mutation() {
        let (mut adapter, mut tree, a, _) = attached();
        let event = UiEvent::NodesSelected {
            node_ids: vec![id(&adapter, a), "ghost".to_string()],
        };

        let err = adapter.on_ui_event(&mut tree, event).unwrap_err();

        assert!(matches!(err, Error::UnknownNodeId { .. }));
        assert!(!err.is_fatal());
        assert!(tree.selected_nodes().is_empty());
        assert_eq!(adapter.pending_conditions(), 0);
        assert_eq!(adapter.pending_events(), 0);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let (mut adapter, mut tree, _, _) = attached();
        let err = adapter
            .on_ui_event_json(&mut tree, r#"{"type":"nodesSelected","data":{}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedUiEvent(_)));
    }

    #[test]
    fn test_selection_echo_is_suppressed() {
        let (mut adapter, mut tree, a, _) = attached();
        let event = UiEvent::NodesSelected {
            node_ids: vec![id(&adapter, a)],
        };

        adapter.on_ui_event(&mut tree, event).unwrap();
        assert_eq!(adapter.pending_events(), 1);
        let output = adapter.end_of_cycle(&tree).unwrap();

        assert!(output.events.is_empty());
        assert_eq!(output.suppressed, 1);
        assert_eq!(tree.selected_nodes(), vec![a]);
        assert_eq!(adapter.pending_conditions(), 0);
    }

    #[test]
    fn test_vetoed_check_is_sent_back() {
        let (mut adapter, mut tree, a, b) = attached();
        let event = UiEvent::NodesChecked {
            nodes: vec![
                CheckedNode {
                    node_id: id(&adapter, a),
                    checked: true,
                },
                CheckedNode {
                    node_id: id(&adapter, b),
                    checked: false,
                },
            ],
        };

        adapter.on_ui_event(&mut tree, event).unwrap();
        // something on the server unchecks A again within the same request
        tree.set_nodes_checked(&[a], false).unwrap();
        let output = adapter.end_of_cycle(&tree).unwrap();

        assert_eq!(output.events.len(), 1);
        let TreeWireEvent::NodesChecked { nodes } = &output.events[0] else {
            panic!("unexpected event {:?}", output.events[0]);
        };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id.as_str(), id(&adapter, a));
        assert!(!nodes[0].checked);
    }

    #[test]
    fn test_click_and_action_are_forwarded() {
        let (mut adapter, mut tree, a, b) = attached();
        adapter
            .on_ui_event(&mut tree, UiEvent::NodeClicked { node_id: id(&adapter, a) })
            .unwrap();
        adapter
            .on_ui_event(&mut tree, UiEvent::NodeAction { node_id: id(&adapter, b) })
            .unwrap();

        assert_eq!(tree.clicked_nodes(), &[a]);
        assert_eq!(tree.node_actions(), &[b]);
        assert!(adapter.end_of_cycle(&tree).unwrap().is_empty());
    }

    #[test]
    fn test_filter_change_becomes_delete_and_insert() {
        let mut tree = Tree::new();
        let root = tree.root_node();
        let a = tree.add_child_node(root, NewNode::new("A")).unwrap();
        let b = tree.add_child_node(root, NewNode::new("B")).unwrap();
        tree.set_filter(move |node| node.key != b, false);
        let mut adapter = adapter();
        adapter.attach(&mut tree).unwrap();
        assert!(!adapter.registry().contains(b));

        tree.set_filter(move |node| node.key != a, false);
        let output = adapter.end_of_cycle(&tree).unwrap();

        let types: Vec<&str> = output.events.iter().map(TreeWireEvent::type_name).collect();
        assert_eq!(types, vec!["nodesDeleted", "nodesInserted"]);
        assert!(adapter.registry().contains(b));
        assert!(!adapter.registry().contains(a));
    }

    #[test]
    fn test_user_filter_keeps_nodes_known() {
        let (mut adapter, mut tree, a, _) = attached();
        tree.set_filter(move |node| node.key != a, true);
        let output = adapter.end_of_cycle(&tree).unwrap();
        assert!(output.is_empty());
        assert!(adapter.registry().contains(a));
    }

    #[test]
    fn test_user_filter_reveals_node_hidden_by_model_filter() {
        let mut tree = Tree::new();
        let root = tree.root_node();
        let a = tree
            .add_child_node(root, NewNode::new("A").with_child(NewNode::new("A1")))
            .unwrap();
        let a1 = tree.child_nodes(a)[0];
        tree.set_filter(move |node| node.key != a, false);
        let mut adapter = adapter();
        adapter.attach(&mut tree).unwrap();
        assert!(adapter.registry().is_empty());

        tree.set_filter(move |node| node.key != a, true);
        let output = adapter.end_of_cycle(&tree).unwrap();

        assert_eq!(output.events.len(), 1);
        let TreeWireEvent::NodesInserted { nodes, .. } = &output.events[0] else {
            panic!("unexpected event {:?}", output.events[0]);
        };
        assert_eq!(nodes[0].id.as_str(), id(&adapter, a));
        assert_eq!(nodes[0].child_nodes[0].id.as_str(), id(&adapter, a1));

        let snapshot = adapter.to_wire(&tree).unwrap();
        assert_eq!(snapshot.nodes, nodes.clone());
    }

    #[test]
    fn test_lazy_expand_from_ui_reaches_model() {
        let (mut adapter, mut tree, a, _) = attached();
        let event = UiEvent::NodeExpanded {
            node_id: id(&adapter, a),
            expanded: true,
            expanded_lazy: true,
        };

        adapter.on_ui_event(&mut tree, event).unwrap();
        let output = adapter.end_of_cycle(&tree).unwrap();

        assert!(output.events.is_empty());
        assert_eq!(output.suppressed, 1);
        let state = tree.node(a).unwrap();
        assert!(state.expanded);
        assert!(state.expanded_lazy);
    }

    #[test]
    fn test_listeners_observe_inserts_and_deletes() {
        let (mut adapter, mut tree, a, _) = attached();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = adapter.add_listener(move |event| sink.lock().unwrap().push(event.clone()));

        let c = tree.add_child_node(a, NewNode::new("C")).unwrap();
        adapter.end_of_cycle(&tree).unwrap();
        tree.remove_child_nodes(a, &[c]).unwrap();
        adapter.end_of_cycle(&tree).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                AdapterEvent::NodesInserted(vec![c]),
                AdapterEvent::NodesDeleted(vec![c])
            ]
        );
        assert!(adapter.remove_listener(listener));
        assert!(!adapter.remove_listener(listener));
    }

    #[test]
    fn test_update_of_disposed_node_is_dropped() {
        let (adapter, _, a, b) = attached();
        let mut output = CycleOutput::default();
        let disposed = HashSet::from([a]);

        let kept = adapter.check_disposed(
            BufferedEvent::NodesUpdated {
                parent: NodeKey(0),
                nodes: vec![a, b],
            },
            &disposed,
            &mut output,
        );

        assert_eq!(
            kept,
            Some(BufferedEvent::NodesUpdated {
                parent: NodeKey(0),
                nodes: vec![b]
            })
        );
        assert_eq!(output.dropped, 1);
    }

    #[test]
    fn test_resync_reassigns_ids() {
        let (mut adapter, mut tree, a, _) = attached();
        let before = id(&adapter, a);
        tree.set_node_cell(a, crate::model::Cell::text("A'")).unwrap();

        let snapshot = adapter.resync(&tree).unwrap();

        assert_eq!(adapter.pending_events(), 0);
        assert_ne!(id(&adapter, a), before);
        assert_eq!(snapshot.all_node_ids().len(), 3);
        assert!(adapter.end_of_cycle(&tree).unwrap().is_empty());
    }

    #[test]
    fn test_detach_reports_leaked_ids() {
        let (mut adapter, mut tree, a, _) = attached();
        // break the recorded hierarchy: A1 becomes unreachable
        adapter.registry.dispose(a, false);

        let err = adapter.detach(&mut tree).unwrap_err();

        assert!(err.is_fatal());
        match err {
            Error::RegistryLeak { remaining, .. } => assert_eq!(remaining, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_events_after_detach_are_ignored() {
        let (mut adapter, mut tree, a, _) = attached();
        adapter.detach(&mut tree).unwrap();
        adapter.on_model_event(&tree, TreeEvent::NodeChanged { node: a });
        assert_eq!(adapter.pending_events(), 0);
    }
}
