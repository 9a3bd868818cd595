//! Shared fixtures for the multi-node tests.

#![allow(dead_code)]

use std::time::Duration;

use dds_overlay::{
    MemoryNetwork, Node, OverlayConfig, PeerAddr, Subscription, SubscriptionEvent,
};
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn addr(host: &str) -> PeerAddr {
    PeerAddr::new(host, 4000)
}

/// Build, bind and wait for a node to finish joining.
pub async fn start_node(network: &MemoryNetwork, host: &str, bootstrap: Vec<PeerAddr>) -> Node {
    let node = Node::builder(network.transport(addr(host)))
        .config(OverlayConfig::for_testing())
        .bootstrap(bootstrap)
        .build();
    node.listen().await.expect("listen");
    node.wait_ready().await;
    node
}

/// Poll `done` until it holds, failing the test after [`WAIT`].
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Next delivered event on a subscription, skipping other activity.
pub async fn next_delivery(
    events: &mut broadcast::Receiver<SubscriptionEvent>,
) -> SubscriptionEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event @ SubscriptionEvent::Event { .. }) => return event,
                Ok(_) => continue,
                Err(err) => panic!("event channel failed: {err}"),
            }
        }
    })
    .await
    .expect("no event delivered in time")
}

/// Drain whatever is buffered and count the warnings.
pub fn drain_warnings(events: &mut broadcast::Receiver<SubscriptionEvent>) -> usize {
    let mut warnings = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SubscriptionEvent::Warning(_)) {
            warnings += 1;
        }
    }
    warnings
}

pub fn member_ids(subscription: &Subscription) -> Vec<dds_overlay::NodeId> {
    subscription.table().members().iter().map(|c| c.id).collect()
}
