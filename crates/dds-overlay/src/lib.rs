//! # DDS Overlay
//!
//! A Kademlia-style peer-to-peer overlay with topic-scoped routing tables
//! and publish/subscribe dissemination.
//!
//! Every node keeps a main routing table of the peers it knows, keyed by its
//! own id. Named topics get a table of their own, keyed by the digest of the
//! topic name and filled with the peers that registered the same topic.
//! Iterative lookups over the reserved `_find_node` and `_find_peers`
//! methods populate both; every other method is routed to the topic table
//! named by the request target.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** ids, XOR distance, the bounded routing table, wire messages
//! - **Ports Layer:** the transport and handler traits
//! - **Service Layer:** the node (lookups, discovery handlers, liveness)
//! - **Topic Layer:** topic tables and subscriptions
//! - **Adapters Layer:** in-memory and TCP transports, settings loading
//!
//! ## Example
//!
//! ```rust,no_run
//! use dds_overlay::{MemoryNetwork, Node, PeerAddr, Role};
//! use serde_json::json;
//!
//! # async fn run() -> dds_overlay::Result<()> {
//! let network = MemoryNetwork::new();
//! let seed = Node::builder(network.transport(PeerAddr::new("seed", 1))).build();
//! seed.listen().await?;
//!
//! let node = Node::builder(network.transport(PeerAddr::new("peer", 1)))
//!     .bootstrap(vec![PeerAddr::new("seed", 1)])
//!     .build();
//! node.listen().await?;
//! node.wait_ready().await;
//!
//! let prices = node.subscription("prices", Role::Leaf)?;
//! prices.subscribe(|data, _from| println!("{data}")).await;
//! prices.publish(json!({ "eur": 1.08 })).await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod topic;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use domain::{
    bucket_index, find_k_closest, sort_by_distance, xor_distance, Contact, Distance,
    InsertOutcome, NodeId, NodeInfo, OverlayConfig, OverlayError, PeerAddr, Request, Response,
    Result, RoutingTable, RoutingTableStats, TopicId, FIND_NODE, FIND_PEERS, PING,
};

pub use ports::{FnHandler, MethodHandler, QueryHandler, Transport};

pub use service::{Node, NodeBuilder, OverlayEvent, WeakNode};

pub use topic::{
    BootstrapState, ListenerId, Role, Subscription, SubscriptionEvent, TopicTable,
};

pub use adapters::{MemoryNetwork, MemoryTransport, SentRequest};

#[cfg(feature = "network")]
pub use adapters::{ConfigError, NodeSettings, TcpTransport, TopicSettings};
