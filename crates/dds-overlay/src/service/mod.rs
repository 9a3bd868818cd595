//! # Overlay Node
//!
//! The node owns its identity, its main routing table, the transport and the
//! registry of topic tables. It answers the reserved discovery methods,
//! routes every other method to the topic table named by the request
//! target, and drives iterative lookups.
//!
//! Locks are `parking_lot` and are only held inside synchronous sections,
//! never across an `.await`.

// Semantic submodules
mod core;
mod events;
mod handlers;
mod lookup;
mod maintenance;

// Re-export public API
pub use self::core::{Node, NodeBuilder, WeakNode};
pub use events::OverlayEvent;
