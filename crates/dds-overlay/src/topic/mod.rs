//! # Topics
//!
//! A topic table is a routing table keyed by the digest of a topic name and
//! filled with the peers that registered the same topic. A subscription
//! adds local listeners and the publish/subscribe protocol on top.

mod seen;
mod subscription;
mod table;

pub use seen::SeenEventCache;
pub use subscription::{ListenerId, Role, Subscription, SubscriptionEvent, PUBLISH, SUBSCRIBE, UNSUBSCRIBE};
pub use table::{BootstrapState, TopicTable};

#[cfg(test)]
mod tests;
