use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::events::{OverlayEvent, EVENT_CHANNEL_CAPACITY};
use crate::domain::{
    Contact, InsertOutcome, NodeId, NodeInfo, OverlayConfig, OverlayError, PeerAddr, Request,
    Response, Result, RoutingTable, RoutingTableStats, TopicId,
};
use crate::ports::{QueryHandler, Transport};
use crate::topic::{Role, Subscription, TopicTable};

/// A participant of the overlay.
///
/// Cheap to clone; every clone drives the same node. Background tasks hold a
/// [`WeakNode`] so dropping the last `Node` lets them wind down.
///
/// # Example
///
/// ```rust,ignore
/// let network = MemoryNetwork::new();
/// let node = Node::builder(network.transport(PeerAddr::new("10.0.0.1", 8080)))
///     .bootstrap(vec![PeerAddr::new("10.0.0.2", 8080)])
///     .build();
/// node.listen().await?;
/// node.wait_ready().await;
/// ```
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

/// Non-owning handle to a [`Node`].
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

pub(crate) struct NodeInner {
    /// Our own node ID (immutable after creation)
    pub(crate) id: NodeId,
    pub(crate) config: OverlayConfig,
    pub(crate) transport: Arc<dyn Transport>,
    /// Peers queried when a lookup has nothing better
    pub(crate) bootstrap: Vec<PeerAddr>,
    /// Main routing table, keyed by our id
    pub(crate) table: Mutex<RoutingTable>,
    /// Topic tables by topic id
    pub(crate) tables: RwLock<HashMap<TopicId, Arc<TopicTable>>>,
    pub(crate) events: broadcast::Sender<OverlayEvent>,
    pub(crate) ready: watch::Sender<bool>,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) destroyed: AtomicBool,
}

/// Builder for [`Node`].
pub struct NodeBuilder {
    transport: Arc<dyn Transport>,
    config: OverlayConfig,
    bootstrap: Vec<PeerAddr>,
}

impl NodeBuilder {
    pub fn config(mut self, config: OverlayConfig) -> Self {
        self.config = config;
        self
    }

    /// Peers to fall back on when the tables cannot supply candidates.
    pub fn bootstrap(mut self, peers: Vec<PeerAddr>) -> Self {
        self.bootstrap = peers;
        self
    }

    /// Create the node. Nothing is bound until [`Node::listen`].
    pub fn build(self) -> Node {
        let id = self.transport.local_info().id;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (ready, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);

        Node {
            inner: Arc::new(NodeInner {
                id,
                table: Mutex::new(RoutingTable::new(id, id, self.config.k)),
                config: self.config,
                transport: self.transport,
                bootstrap: self.bootstrap,
                tables: RwLock::new(HashMap::new()),
                events,
                ready,
                shutdown,
                destroyed: AtomicBool::new(false),
            }),
        }
    }
}

impl Node {
    /// Start building a node on top of `transport`.
    ///
    /// The node takes its identity from the transport.
    pub fn builder(transport: Arc<dyn Transport>) -> NodeBuilder {
        NodeBuilder {
            transport,
            config: OverlayConfig::default(),
            bootstrap: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.inner.config
    }

    /// Identity advertised to peers.
    pub fn local_info(&self) -> NodeInfo {
        self.inner.transport.local_info()
    }

    pub fn bootstrap_peers(&self) -> &[PeerAddr] {
        &self.inner.bootstrap
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Receive lifecycle and discovery events from now on.
    pub fn events(&self) -> broadcast::Receiver<OverlayEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: OverlayEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Wait until initial population has finished.
    pub async fn wait_ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        // Sender lives as long as self.
        let _ = ready.wait_for(|r| *r).await;
    }

    /// Bind the transport and start joining the overlay.
    ///
    /// Returns as soon as the transport listens. Population of the main
    /// table runs in the background; [`wait_ready`](Self::wait_ready) or an
    /// [`OverlayEvent::Ready`] signals its end.
    pub async fn listen(&self) -> Result<PeerAddr> {
        if self.is_destroyed() {
            return Err(OverlayError::Destroyed);
        }
        let handler: Arc<dyn QueryHandler> = Arc::new(self.downgrade());
        let addr = self.inner.transport.bind(handler).await?;
        info!(id = %self.id().short(), %addr, "listening");
        self.emit(OverlayEvent::Listening(addr.clone()));

        let node = self.clone();
        tokio::spawn(async move { node.join().await });
        Ok(addr)
    }

    // =========================================================================
    // Main routing table
    // =========================================================================

    /// Record a contact.
    ///
    /// Our own id is ignored and a known id is refreshed. A new contact
    /// either takes a free slot (and is announced as
    /// [`OverlayEvent::Node`]) or waits behind its full bucket while the
    /// bucket is probed.
    pub fn add_node(&self, contact: Contact) {
        if contact.id == self.inner.id || self.is_destroyed() {
            return;
        }

        let (outcome, worklist) = {
            let mut table = self.inner.table.lock();
            let outcome = table.add(contact.clone());
            let worklist = match outcome {
                InsertOutcome::BucketFull { .. } => table.begin_challenge(contact.clone()),
                _ => None,
            };
            (outcome, worklist)
        };

        match outcome {
            InsertOutcome::Inserted => {
                debug!(
                    id = %self.id().short(),
                    found = %contact.id.short(),
                    addr = %contact.addr,
                    "found node"
                );
                let stored = self.get_node(&contact.id).unwrap_or(contact);
                self.emit(OverlayEvent::Node(stored));
            }
            InsertOutcome::BucketFull { bucket } => {
                if let Some(worklist) = worklist {
                    let weak = self.downgrade();
                    tokio::spawn(async move {
                        if let Some(node) = weak.upgrade() {
                            node.settle_challenge(bucket, worklist).await;
                        }
                    });
                }
            }
            InsertOutcome::Refreshed | InsertOutcome::Ignored => {}
        }
    }

    pub fn remove_node(&self, id: &NodeId) -> Option<Contact> {
        self.inner.table.lock().remove(id)
    }

    pub fn get_node(&self, id: &NodeId) -> Option<Contact> {
        self.inner.table.lock().get(id).cloned()
    }

    /// Up to `count` known contacts closest to `target`.
    pub fn closest_nodes(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        self.inner.table.lock().closest(target, count)
    }

    /// Every known contact, least recently seen first.
    pub fn contacts(&self) -> Vec<Contact> {
        self.inner.table.lock().contacts()
    }

    pub fn stats(&self) -> RoutingTableStats {
        self.inner.table.lock().stats()
    }

    pub(crate) fn mark_changed(&self) {
        self.inner.table.lock().mark_changed();
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Send one query to `peer`.
    ///
    /// Fails with [`OverlayError::TransportTimeout`] after the configured
    /// request timeout. A responder is recorded in the main table.
    pub async fn query(&self, method: &str, data: Value, peer: &PeerAddr) -> Result<Response> {
        if self.is_destroyed() {
            return Err(OverlayError::Destroyed);
        }
        let request = Request::new(self.inner.id, method, data);
        let send = self.inner.transport.send(request, peer);
        let response = tokio::time::timeout(self.inner.config.request_timeout(), send)
            .await
            .map_err(|_| OverlayError::TransportTimeout)??;

        self.add_node(Contact::from_info(&response.responder));
        Ok(response)
    }

    // =========================================================================
    // Topic registry
    // =========================================================================

    /// Register a topic table.
    ///
    /// Fails with [`OverlayError::DuplicateTableRegistration`] if one is
    /// already registered for the same topic; the first stays in place.
    pub fn add_table(&self, table: Arc<TopicTable>) -> Result<()> {
        let mut tables = self.inner.tables.write();
        let id = table.id();
        if tables.contains_key(&id) {
            return Err(OverlayError::DuplicateTableRegistration(id));
        }
        info!(topic = %table.name(), id = %id.short(), "table registered");
        tables.insert(id, table);
        Ok(())
    }

    pub fn remove_table(&self, topic: &TopicId) -> Option<Arc<TopicTable>> {
        self.inner.tables.write().remove(topic)
    }

    pub fn table(&self, topic: &TopicId) -> Option<Arc<TopicTable>> {
        self.inner.tables.read().get(topic).cloned()
    }

    /// Create a subscription for `name` and register its table.
    pub fn subscription(&self, name: &str, role: Role) -> Result<Arc<Subscription>> {
        let subscription = Subscription::new(self, name, role);
        self.add_table(subscription.table().clone())?;
        Ok(subscription)
    }

    /// Shut the node down.
    ///
    /// Stops the liveness sweep, closes the transport and forgets every
    /// table. Lookups in progress stop at their next iteration. Idempotent.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.send_replace(true);
        self.inner.transport.shutdown().await;
        self.inner.tables.write().clear();
        self.inner.table.lock().clear();
        info!(id = %self.id().short(), "destroyed");
    }
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl std::fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakNode")
    }
}
