//! Liveness: startup population, eviction probes and the periodic sweep.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tracing::{debug, info, warn};

use super::core::Node;
use super::events::OverlayEvent;
use crate::domain::{Contact, NodeInfo, OverlayError, Result, FIND_NODE, PING};

impl Node {
    /// Runs once after the transport is bound.
    pub(crate) async fn join(&self) {
        let target = self.id();
        self.populate(FIND_NODE, json!({ "target": target })).await;
        if self.is_destroyed() {
            return;
        }

        self.mark_changed();
        self.start_sweep();

        let discovered = self.inner.table.lock().len();
        if discovered == 0 && !self.inner.bootstrap.is_empty() {
            let message = "no bootstrap peer answered, node is isolated".to_string();
            warn!(id = %self.id().short(), "{message}");
            self.emit(OverlayEvent::Warning(message));
        }

        info!(id = %self.id().short(), discovered, "ready");
        self.inner.ready.send_replace(true);
        self.emit(OverlayEvent::Ready { discovered });
    }

    /// Probe `contact` with `_ping`.
    ///
    /// An answer from a different id counts as a failure.
    pub async fn ping(&self, contact: &Contact) -> Result<NodeInfo> {
        let response = self.query(PING, json!({}), &contact.addr).await?;
        if response.responder.id != contact.id {
            return Err(OverlayError::UnexpectedNodeIdentity {
                expected: contact.id,
                actual: response.responder.id,
            });
        }
        self.mark_changed();
        Ok(response.responder)
    }

    /// Probe `contacts` in order and return the first one that fails.
    ///
    /// Unless `force` is set, contacts seen within the recently-seen window
    /// are taken as alive without a probe.
    pub(crate) async fn check_nodes(&self, contacts: Vec<Contact>, force: bool) -> Option<Contact> {
        let recently_seen = self.inner.config.recently_seen();
        let mut worklist: VecDeque<Contact> = contacts.into();

        while let Some(contact) = worklist.pop_front() {
            if self.is_destroyed() {
                return None;
            }
            if !force && contact.last_seen.elapsed() < recently_seen {
                continue;
            }
            if let Err(err) = self.ping(&contact).await {
                debug!(id = %self.id().short(), peer = %contact.id.short(), error = %err, "probe failed");
                return Some(contact);
            }
        }
        None
    }

    /// Probe a full bucket and settle the parked candidate.
    pub(crate) async fn settle_challenge(&self, bucket: usize, worklist: Vec<Contact>) {
        let dead = self.check_nodes(worklist, false).await;
        let inserted = self
            .inner
            .table
            .lock()
            .resolve_challenge(bucket, dead.as_ref().map(|c| &c.id));

        if let Some(contact) = inserted {
            debug!(
                id = %self.id().short(),
                evicted = ?dead.map(|c| c.id.short()),
                inserted = %contact.id.short(),
                "bucket slot reassigned"
            );
            self.emit(OverlayEvent::Node(contact));
        }
    }

    /// Probe every contact, least recently seen first, and drop the ones
    /// that do not answer.
    ///
    /// Returns how many were removed.
    pub async fn refresh_liveness(&self) -> usize {
        let mut removed = 0;
        for contact in self.contacts() {
            if self.is_destroyed() {
                break;
            }
            if let Err(err) = self.ping(&contact).await {
                debug!(id = %self.id().short(), peer = %contact.id.short(), error = %err, "removing unresponsive contact");
                if self.remove_node(&contact.id).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Spawn the periodic sweep.
    ///
    /// Every jittered interval, if the main table has not changed for longer
    /// than the outdated threshold, every contact is probed.
    pub(crate) fn start_sweep(&self) {
        let weak = self.downgrade();
        let interval = self.inner.config.sweep_interval();
        let mut shutdown = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(jittered(interval)) => {}
                    _ = shutdown.changed() => break,
                }

                let Some(node) = weak.upgrade() else { break };
                if node.is_destroyed() {
                    break;
                }

                let idle = node.inner.table.lock().last_change().elapsed();
                if idle < node.inner.config.bucket_outdated() {
                    continue;
                }

                let removed = node.refresh_liveness().await;
                if removed > 0 {
                    info!(id = %node.id().short(), removed, "liveness sweep");
                }
            }
        });
    }
}

/// Uniform in `[interval / 2, 3 * interval / 2]`.
fn jittered(interval: Duration) -> Duration {
    let ms = interval.as_millis() as u64;
    let half = ms / 2;
    Duration::from_millis(rand::thread_rng().gen_range(half..=half + ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_range() {
        let interval = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = jittered(interval);
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(1500));
        }
    }
}
