//! Publish/subscribe over a topic table.
//!
//! A publish reaches the publisher's own listeners first, then every member
//! of the topic table in parallel. A broker re-distributes what it receives
//! to its own members, so events cross more than one hop; a leaf only
//! delivers locally. Event ids keep a cycle of brokers from looping an
//! event forever.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::seen::SeenEventCache;
use super::table::{BootstrapState, TopicTable};
use crate::domain::{Contact, NodeInfo, OverlayError, Result, TopicId};
use crate::ports::MethodHandler;
use crate::service::Node;

/// Delivers an event to the members of a topic.
pub const PUBLISH: &str = "publish";
/// Announces a new member.
pub const SUBSCRIBE: &str = "subscribe";
/// Announces a leaving member.
pub const UNSUBSCRIBE: &str = "unsubscribe";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a member treats inbound events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Re-distributes inbound events to its own members.
    Broker,
    /// Delivers inbound events locally only.
    #[default]
    Leaf,
}

/// Handle returned by [`Subscription::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Local listener callback: event data and, for remote events, the sender.
pub type Listener = Arc<dyn Fn(&Value, Option<&NodeInfo>) + Send + Sync>;

/// Observable activity of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// An event was delivered to the local listeners.
    Event { data: Value, from: Option<NodeInfo> },
    /// The last local listener left.
    Remove,
    /// A member could not be reached.
    Warning(String),
}

/// Body of a `publish` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PublishMessage {
    target: TopicId,
    topic: String,
    event: Uuid,
    #[serde(default)]
    data: Value,
}

/// A topic table with local listeners and the publish protocol.
pub struct Subscription {
    table: Arc<TopicTable>,
    role: Role,
    listeners: RwLock<BTreeMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
    seen: SeenEventCache,
    events: broadcast::Sender<SubscriptionEvent>,
}

impl Subscription {
    /// Create a subscription to `name` with its `publish`, `subscribe` and
    /// `unsubscribe` handlers installed.
    ///
    /// The table still has to be registered with the node;
    /// [`Node::subscription`] does both.
    pub fn new(node: &Node, name: &str, role: Role) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let seen_cache_size = node.config().seen_cache_size;

        Arc::new_cyclic(|weak: &Weak<Subscription>| {
            let table = TopicTable::new(node, name);
            for kind in [MethodKind::Publish, MethodKind::Subscribe, MethodKind::Unsubscribe] {
                table.insert_method(
                    kind.name(),
                    Arc::new(SubscriptionMethod {
                        kind,
                        topic: table.id(),
                        subscription: weak.clone(),
                    }),
                );
            }

            Subscription {
                table,
                role,
                listeners: RwLock::new(BTreeMap::new()),
                next_listener: AtomicU64::new(0),
                seen: SeenEventCache::new(seen_cache_size),
                events,
            }
        })
    }

    pub fn table(&self) -> &Arc<TopicTable> {
        &self.table
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        self.table.bootstrap_state()
    }

    /// Whether at least one local listener is attached.
    pub fn is_active(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Receive delivered events, removal and warnings from now on.
    pub fn events(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SubscriptionEvent) {
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Local listeners
    // =========================================================================

    /// Attach a local listener.
    ///
    /// The first listener bootstraps the topic table and announces this node
    /// to every member.
    pub async fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value, Option<&NodeInfo>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let first = {
            let mut listeners = self.listeners.write();
            listeners.insert(id, Arc::new(listener));
            listeners.len() == 1
        };

        if first {
            self.table.bootstrap().await;
            self.notify(SUBSCRIBE);
        }
        id
    }

    /// Detach a listener. Returns `false` for an unknown id.
    ///
    /// When the last one leaves, [`SubscriptionEvent::Remove`] is emitted and
    /// every member is told this node left.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let (removed, now_empty) = {
            let mut listeners = self.listeners.write();
            let removed = listeners.remove(&id).is_some();
            (removed, listeners.is_empty())
        };

        if removed && now_empty {
            self.emit(SubscriptionEvent::Remove);
            self.notify(UNSUBSCRIBE);
        }
        removed
    }

    fn deliver(&self, data: &Value, from: Option<&NodeInfo>) {
        // Snapshot so listeners run without the lock.
        let listeners: Vec<Listener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(data, from);
        }
        self.emit(SubscriptionEvent::Event {
            data: data.clone(),
            from: from.cloned(),
        });
    }

    // =========================================================================
    // Dissemination
    // =========================================================================

    /// Publish `data` to the topic.
    ///
    /// Local listeners get it before this returns; remote delivery is fire
    /// and forget.
    pub async fn publish(&self, data: Value) -> usize {
        self.table.bootstrap().await;

        let event = Uuid::new_v4();
        self.seen.mark_seen(event);
        self.deliver(&data, None);
        self.distribute(event, data, None)
    }

    /// Send an event to every member except `exclude`.
    ///
    /// Returns how many deliveries were started. A member that fails is
    /// removed from the table and reported as a warning.
    fn distribute(&self, event: Uuid, data: Value, exclude: Option<&NodeInfo>) -> usize {
        let Some(node) = self.table.node() else {
            return 0;
        };
        let message = PublishMessage {
            target: self.table.id(),
            topic: self.table.name().to_string(),
            event,
            data,
        };
        let body = match serde_json::to_value(&message) {
            Ok(body) => body,
            Err(err) => {
                warn!(topic = %self.name(), error = %err, "cannot encode event");
                return 0;
            }
        };

        let mut started = 0;
        for member in self.table.members() {
            if member.id == node.id() || exclude.is_some_and(|ex| ex.id == member.id) {
                continue;
            }
            started += 1;
            self.spawn_send(&node, PUBLISH, body.clone(), member, true);
        }
        started
    }

    /// Tell every member about a local state change.
    fn notify(&self, action: &'static str) {
        let Some(node) = self.table.node() else {
            return;
        };
        let body = json!({
            "id": node.id(),
            "target": self.table.id(),
            "topic": self.table.name(),
        });
        for member in self.table.members() {
            self.spawn_send(&node, action, body.clone(), member, false);
        }
    }

    fn spawn_send(&self, node: &Node, method: &'static str, body: Value, member: Contact, evict: bool) {
        let node = node.clone();
        let table = Arc::clone(&self.table);
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Err(err) = node.query(method, body, &member.addr).await {
                let message = format!("{method} to {} failed: {err}", member.addr);
                warn!(topic = %table.name(), peer = %member.id.short(), error = %err, "{method} failed");
                if evict {
                    table.remove_node(&member.id);
                }
                let _ = events.send(SubscriptionEvent::Warning(message));
            }
        });
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    fn on_publish(&self, data: Value, sender: NodeInfo) -> Result<Value> {
        let message: PublishMessage = serde_json::from_value(data)?;
        if !self.seen.mark_seen(message.event) {
            debug!(topic = %self.name(), event = %message.event, "duplicate event dropped");
            return Ok(json!({}));
        }

        if self.role == Role::Broker {
            self.distribute(message.event, message.data.clone(), Some(&sender));
        }
        self.deliver(&message.data, Some(&sender));
        Ok(json!({}))
    }

    fn on_subscribe(&self, sender: NodeInfo) -> Result<Value> {
        self.table.add_node(Contact::from_info(&sender));
        Ok(json!({}))
    }

    fn on_unsubscribe(&self, sender: NodeInfo) -> Result<Value> {
        self.table.remove_node(&sender.id);
        Ok(json!({}))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("table", &self.table)
            .field("role", &self.role)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum MethodKind {
    Publish,
    Subscribe,
    Unsubscribe,
}

impl MethodKind {
    fn name(self) -> &'static str {
        match self {
            Self::Publish => PUBLISH,
            Self::Subscribe => SUBSCRIBE,
            Self::Unsubscribe => UNSUBSCRIBE,
        }
    }
}

/// Table handler forwarding to its subscription.
///
/// Once the subscription is dropped the topic is reported as missing, so a
/// publisher evicts this node from its table.
struct SubscriptionMethod {
    kind: MethodKind,
    topic: TopicId,
    subscription: Weak<Subscription>,
}

#[async_trait]
impl MethodHandler for SubscriptionMethod {
    async fn call(&self, data: Value, sender: NodeInfo) -> Result<Value> {
        let Some(subscription) = self.subscription.upgrade() else {
            return Err(OverlayError::TableNotFound(self.topic.to_hex()));
        };
        match self.kind {
            MethodKind::Publish => subscription.on_publish(data, sender),
            MethodKind::Subscribe => subscription.on_subscribe(sender),
            MethodKind::Unsubscribe => subscription.on_unsubscribe(sender),
        }
    }
}
