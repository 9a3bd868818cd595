use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::{
    is_reserved, node_list, Contact, InsertOutcome, NodeId, NodeInfo, OverlayError, PeerAddr,
    Result, RoutingTable, TopicId, FIND_PEERS,
};
use crate::ports::MethodHandler;
use crate::service::{Node, WeakNode};

/// Where a topic table is in its discovery of members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Unbootstrapped,
    Bootstrapping,
    Bootstrapped,
}

/// Routing table of the peers sharing one topic.
///
/// Keyed by the topic id, so the members kept when buckets fill up are the
/// ones closest to the topic. The owning node is never a member of its own
/// table.
pub struct TopicTable {
    name: String,
    id: TopicId,
    node: WeakNode,
    table: Mutex<RoutingTable>,
    methods: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
    bootstrapped: AtomicBool,
    bootstrapping: AtomicBool,
}

impl TopicTable {
    /// Create a table for `name`. Register it with [`Node::add_table`].
    pub fn new(node: &Node, name: &str) -> Arc<Self> {
        Arc::new(Self::build(node, name))
    }

    pub(crate) fn build(node: &Node, name: &str) -> Self {
        let id = NodeId::digest(name);
        Self {
            name: name.to_string(),
            id,
            node: node.downgrade(),
            table: Mutex::new(RoutingTable::new(id, node.id(), node.config().k)),
            methods: RwLock::new(HashMap::new()),
            bootstrapped: AtomicBool::new(false),
            bootstrapping: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    pub(crate) fn node(&self) -> Option<Node> {
        self.node.upgrade()
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        if self.bootstrapping.load(Ordering::SeqCst) {
            BootstrapState::Bootstrapping
        } else if self.bootstrapped.load(Ordering::SeqCst) {
            BootstrapState::Bootstrapped
        } else {
            BootstrapState::Unbootstrapped
        }
    }

    // =========================================================================
    // Members
    // =========================================================================

    /// Add a member. A full bucket drops the newcomer.
    pub fn add_node(&self, contact: Contact) -> bool {
        matches!(
            self.table.lock().add(contact),
            InsertOutcome::Inserted | InsertOutcome::Refreshed
        )
    }

    pub fn remove_node(&self, id: &NodeId) -> Option<Contact> {
        self.table.lock().remove(id)
    }

    /// Every member, least recently seen first.
    pub fn members(&self) -> Vec<Contact> {
        self.table.lock().contacts()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.table.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Find the other members of the topic.
    ///
    /// Runs a `_find_peers` lookup for the topic id and merges the `peers`
    /// of every responder that holds the topic. Returns at once when the
    /// table already has members or another bootstrap is running.
    pub async fn bootstrap(&self) {
        if self.bootstrapped.load(Ordering::SeqCst) && self.len() >= 1 {
            return;
        }
        if self
            .bootstrapping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let Some(node) = self.node() else {
            self.bootstrapping.store(false, Ordering::SeqCst);
            return;
        };
        self.bootstrapped.store(true, Ordering::SeqCst);

        let mut merged: HashSet<PeerAddr> = HashSet::new();
        let visit = |body: &Value, responder: &NodeInfo| {
            if body.get("nodes").is_none() {
                return true;
            }
            if !merged.insert(responder.addr()) {
                return true;
            }
            for peer in node_list(body, "peers") {
                self.add_node(Contact::from_info(&peer));
            }
            true
        };

        let responded = node
            .closest(FIND_PEERS, json!({ "target": self.id }), visit)
            .await;

        self.bootstrapping.store(false, Ordering::SeqCst);
        debug!(topic = %self.name, responded, members = self.len(), "topic bootstrap finished");
    }

    // =========================================================================
    // Methods
    // =========================================================================

    /// Register a handler for `method`.
    ///
    /// Names starting with `_` belong to the discovery protocol and are
    /// refused with [`OverlayError::ReservedMethod`].
    pub fn add_method(&self, method: &str, handler: Arc<dyn MethodHandler>) -> Result<()> {
        if is_reserved(method) {
            return Err(OverlayError::ReservedMethod(method.to_string()));
        }
        self.insert_method(method, handler);
        Ok(())
    }

    pub(crate) fn insert_method(&self, method: &str, handler: Arc<dyn MethodHandler>) {
        self.methods.write().insert(method.to_string(), handler);
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.read().contains_key(method)
    }

    /// Invoke the handler registered for `method`.
    pub async fn dispatch(&self, method: &str, data: Value, sender: NodeInfo) -> Result<Value> {
        let handler = self
            .methods
            .read()
            .get(method)
            .cloned()
            .ok_or_else(|| OverlayError::MethodNotFound(method.to_string()))?;
        handler.call(data, sender).await
    }
}

impl std::fmt::Debug for TopicTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicTable")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("members", &self.len())
            .finish()
    }
}
