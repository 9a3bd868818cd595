//! Candidates parked behind a full bucket.

use tokio::time::Instant;

use crate::domain::Contact;

/// A contact waiting for a slot in a full bucket.
///
/// At most one per bucket. A newer candidate for the same bucket replaces
/// the parked one while the probe is still running.
#[derive(Debug, Clone)]
pub struct PendingInsertion {
    /// The contact that wants the slot.
    pub candidate: Contact,
    /// When the bucket's probe started.
    pub challenge_started: Instant,
}

impl PendingInsertion {
    pub fn new(candidate: Contact, now: Instant) -> Self {
        Self {
            candidate,
            challenge_started: now,
        }
    }
}
