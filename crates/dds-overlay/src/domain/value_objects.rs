//! Value objects for the overlay: distances, tunables and table statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entities::ID_LENGTH;

/// XOR distance between two identifiers.
///
/// Ordered as a big-endian unsigned integer, so the derived byte-wise
/// ordering is the metric's ordering. Zero means identical ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(pub [u8; ID_LENGTH]);

impl Distance {
    /// Distance of an id to itself.
    pub const ZERO: Distance = Distance([0u8; ID_LENGTH]);

    /// Number of leading zero bits (the common prefix length of the two ids).
    pub fn leading_zeros(&self) -> usize {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }
        ID_LENGTH * 8
    }

    /// Whether the two ids were identical.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

/// Tunables of a node.
///
/// Every field has a default, so a partial `[overlay]` table in a settings
/// file deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Bucket size, and the count of contacts returned by `_find_node`.
    pub k: usize,
    /// In-flight request limit for foreground lookups.
    pub concurrency: usize,
    /// In-flight request limit for background lookups.
    /// Defaults to a quarter of `concurrency`, at least one.
    pub background_concurrency: Option<usize>,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Age of the last table change after which the sweep probes every contact.
    pub bucket_outdated_ms: u64,
    /// Base period of the liveness sweep (jittered by half in both directions).
    pub sweep_interval_ms: u64,
    /// Contacts seen within this window are assumed alive by eviction probes.
    pub recently_seen_ms: u64,
    /// Number of publish event ids remembered per subscription.
    pub seen_cache_size: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            k: 20,
            concurrency: 16,
            background_concurrency: None,
            request_timeout_ms: 2_000,
            bucket_outdated_ms: 30_000,
            sweep_interval_ms: 60_000,
            recently_seen_ms: 10_000,
            seen_cache_size: 1024,
        }
    }
}

impl OverlayConfig {
    /// Create a config suitable for testing (smaller values)
    pub fn for_testing() -> Self {
        Self {
            k: 4,
            concurrency: 4,
            background_concurrency: Some(2),
            request_timeout_ms: 200,
            bucket_outdated_ms: 1_000,
            sweep_interval_ms: 2_000,
            recently_seen_ms: 0,
            seen_cache_size: 64,
        }
    }

    /// Effective background limit.
    pub fn background_concurrency(&self) -> usize {
        self.background_concurrency
            .unwrap_or(self.concurrency / 4)
            .max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bucket_outdated(&self) -> Duration {
        Duration::from_millis(self.bucket_outdated_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn recently_seen(&self) -> Duration {
        Duration::from_millis(self.recently_seen_ms)
    }
}

/// Snapshot of a routing table's occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTableStats {
    /// Total contacts held.
    pub total_contacts: usize,
    /// Buckets holding at least one contact.
    pub buckets_used: usize,
    /// Contacts parked behind a full bucket.
    pub pending_insertions: usize,
    /// Age of the least recently seen contact.
    pub oldest_contact_age: Option<Duration>,
    /// How long the longest-running eviction probe has been going.
    pub oldest_challenge_age: Option<Duration>,
}
