//! Iterative lookup.
//!
//! A traversal keeps an ephemeral routing table keyed by the target, queries
//! the closest unqueried candidates under a concurrency limit and merges
//! every `nodes` array it receives, until no candidate is left or the
//! visitor asks to stop.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tracing::debug;

use super::core::Node;
use crate::domain::{
    node_list, target_of, Contact, NodeId, NodeInfo, PeerAddr, Response, Result, RoutingTable,
};

/// Callback invoked with every reply body and its responder.
/// Returning `false` stops the traversal from issuing new queries.
type Visit<'a> = dyn FnMut(&Value, &NodeInfo) -> bool + Send + 'a;

impl Node {
    /// Foreground lookup for `data.target`.
    ///
    /// Every reply is passed to `visit`. Resolves with the number of peers
    /// that answered; per-peer failures never fail the lookup.
    pub async fn closest<F>(&self, method: &str, data: Value, mut visit: F) -> usize
    where
        F: FnMut(&Value, &NodeInfo) -> bool + Send,
    {
        let visit: &mut Visit<'_> = &mut visit;
        self.traverse(method, data, false, Some(visit)).await
    }

    /// Background lookup, used to fill the main table.
    ///
    /// Same as [`closest`](Self::closest) without a visitor and under the
    /// smaller background concurrency limit.
    pub async fn populate(&self, method: &str, data: Value) -> usize {
        self.traverse(method, data, true, None).await
    }

    async fn traverse(
        &self,
        method: &str,
        data: Value,
        background: bool,
        mut visit: Option<&mut Visit<'_>>,
    ) -> usize {
        let target = lookup_target(method, &data);
        let config = &self.inner.config;
        let limit = if background {
            config.background_concurrency()
        } else {
            config.concurrency
        };

        let mut table = RoutingTable::new(target, self.id(), config.k);
        let mut queried: HashSet<PeerAddr> = HashSet::new();
        let mut pending = FuturesUnordered::new();
        let mut bootstrapped = false;
        let mut stop = false;
        let mut count = 0usize;

        loop {
            if self.is_destroyed() {
                break;
            }

            if !stop {
                let (bootstrap, candidates) = self.candidates(&table, &target, &mut bootstrapped);

                // Bootstrap peers are all asked at once, whatever the load.
                for addr in bootstrap {
                    if queried.insert(addr.clone()) {
                        pending.push(self.query_at(method, &data, addr));
                    }
                }

                // Queued futures only reach the transport counter once polled,
                // so the traversal's own queue counts against the limit too.
                for addr in candidates {
                    let load = pending.len().max(self.inner.transport.inflight());
                    if !pending.is_empty() && load >= limit {
                        break;
                    }
                    if queried.insert(addr.clone()) {
                        pending.push(self.query_at(method, &data, addr));
                    }
                }
            }

            let Some((addr, result)) = pending.next().await else {
                break;
            };

            match result {
                Ok(response) => {
                    queried.insert(response.responder.addr());
                    count += 1;

                    table.add(Contact::from_info(&response.responder));
                    for info in node_list(&response.body, "nodes") {
                        table.add(Contact::from_info(&info));
                    }

                    if let Some(visit) = visit.as_mut() {
                        if !visit(&response.body, &response.responder) {
                            stop = true;
                        }
                    }
                }
                Err(err) => {
                    debug!(id = %self.id().short(), %addr, %method, error = %err, "lookup query failed");
                }
            }
        }

        debug!(
            id = %self.id().short(),
            target = %target.short(),
            %method,
            responded = count,
            "lookup finished"
        );
        count
    }

    /// Next addresses to try, closest first.
    ///
    /// Falls back from the traversal's own table to the main table, and
    /// finally (once per traversal) to the bootstrap peers, whenever the
    /// better source yields nothing or fewer entries than there are
    /// bootstrap peers.
    fn candidates(
        &self,
        table: &RoutingTable,
        target: &NodeId,
        bootstrapped: &mut bool,
    ) -> (Vec<PeerAddr>, Vec<PeerAddr>) {
        let k = self.inner.config.k;
        let wanted = self.inner.bootstrap.len();
        let too_few = |found: &[Contact]| found.is_empty() || found.len() < wanted;

        let mut closest = table.closest(target, k);
        let mut bootstrap = Vec::new();
        if too_few(&closest) {
            closest = self.closest_nodes(target, k);
            if too_few(&closest) && !*bootstrapped {
                *bootstrapped = true;
                bootstrap = self.inner.bootstrap.clone();
            }
        }

        (bootstrap, closest.into_iter().map(|c| c.addr).collect())
    }

    fn query_at(
        &self,
        method: &str,
        data: &Value,
        addr: PeerAddr,
    ) -> impl Future<Output = (PeerAddr, Result<Response>)> + Send + 'static {
        let node = self.clone();
        let method = method.to_string();
        let data = data.clone();
        async move {
            let result = node.query(&method, data, &addr).await;
            (addr, result)
        }
    }
}

/// `data.target` when it is a valid id, else the digest of the method name.
fn lookup_target(method: &str, data: &Value) -> NodeId {
    match target_of(data).map(NodeId::from_hex) {
        Some(Ok(target)) => target,
        Some(Err(err)) => {
            debug!(%method, error = %err, "malformed lookup target, using method digest");
            NodeId::digest(method)
        }
        None => NodeId::digest(method),
    }
}
