//! Main RoutingTable implementation.

use tokio::time::Instant;

use crate::domain::{
    bucket_index, find_k_closest, Contact, NodeId, RoutingTableStats, ID_BITS,
};

use super::bucket::KBucket;
use super::pending::PendingInsertion;

/// One bucket per common-prefix length, plus one for an exact match of the
/// reference id (ephemeral lookup tables are keyed by the target, which may
/// be a live node).
pub const NUM_BUCKETS: usize = ID_BITS + 1;

/// Result of [`RoutingTable::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The contact was new and took a free slot.
    Inserted,
    /// The contact was already known; it is now the most recently seen.
    Refreshed,
    /// The contact is the table's excluded id and was not stored.
    Ignored,
    /// The bucket is at capacity. Nothing was stored.
    BucketFull { bucket: usize },
}

/// A bounded routing table keyed by a reference id
///
/// The table never stores its excluded id. For a node's main table the
/// reference and the excluded id are both the node's own id; topic and
/// lookup tables are keyed by a topic or target and still exclude the
/// owning node.
#[derive(Debug)]
pub struct RoutingTable {
    /// Id the bucket layout is relative to
    reference: NodeId,
    /// Id that can never be stored (the owning node)
    excluded: NodeId,
    /// Bucket capacity
    k: usize,
    buckets: Vec<KBucket>,
    /// Next insertion sequence number
    next_seq: u64,
    /// Last add, refresh or removal
    last_change: Instant,
}

impl RoutingTable {
    /// Create a new routing table
    ///
    /// # Arguments
    /// * `reference` - Id the buckets are laid out against
    /// * `excluded` - Id that is silently refused by [`add`](Self::add)
    /// * `k` - Bucket capacity
    pub fn new(reference: NodeId, excluded: NodeId, k: usize) -> Self {
        Self {
            reference,
            excluded,
            k: k.max(1),
            buckets: (0..NUM_BUCKETS).map(|_| KBucket::new()).collect(),
            next_seq: 0,
            last_change: Instant::now(),
        }
    }

    pub fn reference(&self) -> &NodeId {
        &self.reference
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Total contacts across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(KBucket::is_empty)
    }

    /// Last time the table's contents changed or were confirmed.
    pub fn last_change(&self) -> Instant {
        self.last_change
    }

    /// Record that the table was confirmed fresh (e.g. a probe succeeded).
    pub fn mark_changed(&mut self) {
        let now = Instant::now();
        if now > self.last_change {
            self.last_change = now;
        }
    }

    /// Insert or refresh a contact.
    ///
    /// A known id is refreshed in place and moved to the most recently seen
    /// end of its bucket. A full bucket is reported and left unchanged; the
    /// owner decides whether to start a probe with
    /// [`begin_challenge`](Self::begin_challenge).
    pub fn add(&mut self, mut contact: Contact) -> InsertOutcome {
        if contact.id == self.excluded {
            return InsertOutcome::Ignored;
        }

        let idx = bucket_index(&self.reference, &contact.id);
        let now = Instant::now();
        let k = self.k;
        let Some(bucket) = self.buckets.get_mut(idx) else {
            return InsertOutcome::Ignored;
        };

        if bucket.refresh(&contact, now) {
            self.mark_changed();
            return InsertOutcome::Refreshed;
        }

        if bucket.is_full(k) {
            return InsertOutcome::BucketFull { bucket: idx };
        }

        contact.seq = self.next_seq;
        contact.last_seen = now;
        self.next_seq += 1;
        bucket.push(contact);
        self.mark_changed();
        InsertOutcome::Inserted
    }

    /// Park `candidate` behind its full bucket.
    ///
    /// Returns the bucket's contacts, least recently seen first, when a new
    /// probe must be started. Returns `None` when a probe is already running
    /// for that bucket; the candidate then replaces the parked one.
    pub fn begin_challenge(&mut self, candidate: Contact) -> Option<Vec<Contact>> {
        if candidate.id == self.excluded {
            return None;
        }
        let idx = bucket_index(&self.reference, &candidate.id);
        let bucket = self.buckets.get_mut(idx)?;
        let now = Instant::now();

        if let Some(pending) = bucket.pending_insertion.as_mut() {
            pending.candidate = candidate;
            return None;
        }

        bucket.pending_insertion = Some(PendingInsertion::new(candidate, now));
        Some(bucket.contacts.clone())
    }

    /// Settle the probe of bucket `bucket`.
    ///
    /// With `dead` set, that contact is removed and the parked candidate takes
    /// its slot. Without it every probed contact answered and the candidate is
    /// dropped, unless a slot freed up in the meantime. Returns the contact
    /// that was inserted, if any.
    pub fn resolve_challenge(&mut self, bucket: usize, dead: Option<&NodeId>) -> Option<Contact> {
        let pending = self.buckets.get_mut(bucket)?.pending_insertion.take()?;

        if let Some(dead) = dead {
            if let Some(b) = self.buckets.get_mut(bucket) {
                b.remove(dead);
            }
        }

        let candidate = pending.candidate;
        match self.add(candidate.clone()) {
            InsertOutcome::Inserted => self.get(&candidate.id).cloned(),
            _ => None,
        }
    }

    /// Candidate parked behind `bucket`, if a probe is running.
    pub fn pending(&self, bucket: usize) -> Option<&PendingInsertion> {
        self.buckets.get(bucket)?.pending_insertion.as_ref()
    }

    /// Remove a contact. No-op for unknown ids.
    pub fn remove(&mut self, id: &NodeId) -> Option<Contact> {
        let idx = bucket_index(&self.reference, id);
        let removed = self.buckets.get_mut(idx)?.remove(id);
        if removed.is_some() {
            self.mark_changed();
        }
        removed
    }

    pub fn get(&self, id: &NodeId) -> Option<&Contact> {
        self.buckets
            .get(bucket_index(&self.reference, id))?
            .get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Mark a known contact as just seen.
    pub fn touch(&mut self, id: &NodeId) -> bool {
        let Some(contact) = self.get(id).cloned() else {
            return false;
        };
        matches!(self.add(contact), InsertOutcome::Refreshed)
    }

    /// Up to `count` contacts by ascending XOR distance to `target`.
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        let all: Vec<Contact> = self
            .buckets
            .iter()
            .flat_map(|b| b.contacts().iter().cloned())
            .collect();
        find_k_closest(&all, target, count)
    }

    /// Every contact, least recently seen first.
    pub fn contacts(&self) -> Vec<Contact> {
        let mut all: Vec<Contact> = self
            .buckets
            .iter()
            .flat_map(|b| b.contacts().iter().cloned())
            .collect();
        all.sort_by(|a, b| a.last_seen.cmp(&b.last_seen).then(a.seq.cmp(&b.seq)));
        all
    }

    /// Drop every contact and parked candidate.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = KBucket::new();
        }
        self.mark_changed();
    }

    pub fn get_bucket(&self, index: usize) -> Option<&KBucket> {
        self.buckets.get(index)
    }

    /// Get routing table statistics
    pub fn stats(&self) -> RoutingTableStats {
        let now = Instant::now();
        RoutingTableStats {
            total_contacts: self.len(),
            buckets_used: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            pending_insertions: self
                .buckets
                .iter()
                .filter(|b| b.has_pending_challenge())
                .count(),
            oldest_contact_age: self
                .buckets
                .iter()
                .flat_map(|b| b.contacts().iter())
                .map(|c| now.saturating_duration_since(c.last_seen))
                .max(),
            oldest_challenge_age: self
                .buckets
                .iter()
                .filter_map(|b| b.pending_insertion.as_ref())
                .map(|p| now.saturating_duration_since(p.challenge_started))
                .max(),
        }
    }
}
