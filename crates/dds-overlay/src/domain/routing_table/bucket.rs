//! K-bucket implementation.

use tokio::time::Instant;

use super::pending::PendingInsertion;
use crate::domain::{Contact, NodeId};

/// A k-bucket storing up to k contacts sharing a prefix length
///
/// Contacts are kept least recently seen first, so the head of the vector
/// is the first eviction candidate and a refreshed contact moves to the
/// tail.
#[derive(Debug, Clone, Default)]
pub struct KBucket {
    /// Contacts in this bucket, oldest first
    pub(crate) contacts: Vec<Contact>,
    /// Contact waiting to join this bucket, pending the probe result
    pub(crate) pending_insertion: Option<PendingInsertion>,
}

impl KBucket {
    /// Create a new empty k-bucket
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self, k: usize) -> bool {
        self.contacts.len() >= k
    }

    /// Least recently seen contact.
    pub fn oldest(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Check if a probe is already running for this bucket
    pub fn has_pending_challenge(&self) -> bool {
        self.pending_insertion.is_some()
    }

    /// Append at the most recently seen end (assumes not full)
    pub(crate) fn push(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    pub(crate) fn remove(&mut self, id: &NodeId) -> Option<Contact> {
        let pos = self.position(id)?;
        Some(self.contacts.remove(pos))
    }

    /// Mark a contact as just seen and move it to the tail.
    ///
    /// The address is replaced as well, since a peer may come back on a new
    /// port.
    pub(crate) fn refresh(&mut self, contact: &Contact, now: Instant) -> bool {
        let Some(pos) = self.position(&contact.id) else {
            return false;
        };
        let mut existing = self.contacts.remove(pos);
        existing.last_seen = now;
        existing.addr = contact.addr.clone();
        self.contacts.push(existing);
        true
    }

    pub(crate) fn get(&self, id: &NodeId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    pub(crate) fn contains(&self, id: &NodeId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.contacts.iter().position(|c| &c.id == id)
    }
}
