//! Lifecycle and discovery events of a node.

use crate::domain::{Contact, PeerAddr};

/// Capacity of the node's broadcast channel. Slow receivers see `Lagged`.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something observable happened on the node.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    /// The transport is bound.
    Listening(PeerAddr),
    /// Initial population finished; the node has `discovered` contacts.
    Ready { discovered: usize },
    /// A previously unknown contact entered the main table.
    Node(Contact),
    /// Non-fatal trouble, e.g. no bootstrap peer answered.
    Warning(String),
}
