//! Routing table over the XOR metric.
//!
//! One bucket per common-prefix length with the table's reference id. Each
//! bucket holds at most k contacts, least recently seen first. A full
//! bucket never evicts on its own: the owner probes the bucket and settles
//! the parked candidate through [`RoutingTable::resolve_challenge`].

// Semantic submodules
mod bucket;
mod pending;
mod table;

// Re-export public API
pub use bucket::KBucket;
pub use pending::PendingInsertion;
pub use table::{InsertOutcome, RoutingTable, NUM_BUCKETS};
