//! Tests for topic tables and subscriptions.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use super::*;
use crate::adapters::MemoryNetwork;
use crate::domain::{Contact, NodeId, NodeInfo, OverlayConfig, OverlayError, PeerAddr, ID_LENGTH};
use crate::ports::FnHandler;
use crate::service::Node;

fn addr(host: &str) -> PeerAddr {
    PeerAddr::new(host, 4000)
}

fn build(network: &MemoryNetwork, host: &str) -> Node {
    Node::builder(network.transport(addr(host)))
        .config(OverlayConfig::for_testing())
        .build()
}

/// Ids in bucket 0 of a table keyed by `reference`.
fn far_id(reference: &NodeId, i: u8) -> NodeId {
    let mut bytes = [0u8; ID_LENGTH];
    bytes.copy_from_slice(reference.as_bytes());
    bytes[0] ^= 0x80;
    bytes[ID_LENGTH - 1] = i;
    NodeId::new(bytes)
}

fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value, Option<&NodeInfo>) + Send + Sync) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    (received, move |data: &Value, _from: Option<&NodeInfo>| {
        sink.lock().push(data.clone())
    })
}

fn publish_body(subscription: &Subscription, event: Uuid, data: Value) -> Value {
    json!({
        "target": subscription.table().id(),
        "topic": subscription.name(),
        "event": event,
        "data": data,
    })
}

// =============================================================================
// Topic Table
// =============================================================================

#[tokio::test]
async fn test_table_id_is_name_digest() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let table = TopicTable::new(&node, "test");

    assert_eq!(table.id(), NodeId::digest("test"));
    assert_eq!(table.name(), "test");
    assert_eq!(table.bootstrap_state(), BootstrapState::Unbootstrapped);
}

#[tokio::test]
async fn test_owner_is_never_a_member() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let table = TopicTable::new(&node, "test");

    assert!(!table.add_node(Contact::new(node.id(), addr("a"))));
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_full_bucket_drops_newcomer() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let table = TopicTable::new(&node, "test");
    let k = node.config().k;

    for i in 0..k as u8 {
        assert!(table.add_node(Contact::new(far_id(&table.id(), i), addr("m"))));
    }
    let late = far_id(&table.id(), 200);
    assert!(!table.add_node(Contact::new(late, addr("late"))));

    assert_eq!(table.len(), k);
    assert!(!table.contains(&late));
    // No probe is sent for topic tables.
    assert!(network.sent_requests().is_empty());
}

#[tokio::test]
async fn test_reserved_method_names_are_refused() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let table = TopicTable::new(&node, "test");

    let err = table
        .add_method("_find_node", Arc::new(FnHandler::new(|data, _| Ok(data))))
        .unwrap_err();
    assert_eq!(err, OverlayError::ReservedMethod("_find_node".into()));
    assert!(!table.has_method("_find_node"));
}

#[tokio::test]
async fn test_dispatch_routes_to_method() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let table = TopicTable::new(&node, "test");
    table
        .add_method(
            "double",
            Arc::new(FnHandler::new(|data: Value, _| {
                Ok(json!(data.as_i64().unwrap_or_default() * 2))
            })),
        )
        .unwrap();
    let from = NodeInfo::new(NodeId::random(), &addr("b"));

    assert_eq!(table.dispatch("double", json!(21), from.clone()).await, Ok(json!(42)));
    assert_eq!(
        table.dispatch("triple", json!(1), from).await,
        Err(OverlayError::MethodNotFound("triple".into()))
    );
}

#[tokio::test]
async fn test_bootstrap_without_peers_marks_bootstrapped() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let table = TopicTable::new(&node, "test");

    table.bootstrap().await;

    assert_eq!(table.bootstrap_state(), BootstrapState::Bootstrapped);
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_bootstrap_finds_topic_holder() {
    let network = MemoryNetwork::new();
    let a = build(&network, "a");
    a.listen().await.unwrap();
    a.wait_ready().await;
    a.add_table(TopicTable::new(&a, "test")).unwrap();

    let b = Node::builder(network.transport(addr("b")))
        .config(OverlayConfig::for_testing())
        .bootstrap(vec![addr("a")])
        .build();
    b.listen().await.unwrap();
    b.wait_ready().await;
    let table = TopicTable::new(&b, "test");
    b.add_table(table.clone()).unwrap();

    table.bootstrap().await;

    assert!(table.contains(&a.id()));
    assert!(!table.contains(&b.id()));
}

#[tokio::test]
async fn test_bootstrap_is_skipped_once_populated() {
    let network = MemoryNetwork::new();
    let b = build(&network, "b");
    b.listen().await.unwrap();
    let a = Node::builder(network.transport(addr("a")))
        .config(OverlayConfig::for_testing())
        .bootstrap(vec![addr("b")])
        .build();
    let table = TopicTable::new(&a, "test");
    a.add_table(table.clone()).unwrap();

    table.bootstrap().await;
    assert_eq!(network.requests_to(&addr("b"), crate::domain::FIND_PEERS), 1);

    table.add_node(Contact::new(NodeId::random(), addr("m")));
    network.clear_log();
    table.bootstrap().await;
    assert!(network.sent_requests().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bootstraps_run_one_lookup() {
    let network = MemoryNetwork::new();
    network.set_latency(std::time::Duration::from_millis(50));
    let b = build(&network, "b");
    b.listen().await.unwrap();
    b.add_table(TopicTable::new(&b, "test")).unwrap();

    let a = Node::builder(network.transport(addr("a")))
        .config(OverlayConfig::for_testing())
        .bootstrap(vec![addr("b")])
        .build();
    let table = TopicTable::new(&a, "test");
    a.add_table(table.clone()).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let table = table.clone();
            tokio::spawn(async move { table.bootstrap().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(network.requests_to(&addr("b"), crate::domain::FIND_PEERS), 1);
    assert!(table.contains(&b.id()));
    assert_eq!(table.bootstrap_state(), BootstrapState::Bootstrapped);
}

// =============================================================================
// Subscription
// =============================================================================

#[tokio::test]
async fn test_subscription_installs_protocol_methods() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();

    for method in [PUBLISH, SUBSCRIBE, UNSUBSCRIBE] {
        assert!(subscription.table().has_method(method), "{method}");
    }
    assert!(node.table(&NodeId::digest("test")).is_some());
    assert!(node.subscription("test", Role::Broker).is_err());
}

#[tokio::test]
async fn test_listener_lifecycle() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();
    let mut events = subscription.events();

    let first = subscription.subscribe(|_, _| {}).await;
    let second = subscription.subscribe(|_, _| {}).await;
    assert_eq!(subscription.listener_count(), 2);
    assert_eq!(subscription.bootstrap_state(), BootstrapState::Bootstrapped);

    assert!(subscription.unsubscribe(first));
    assert!(!subscription.unsubscribe(first));
    assert!(subscription.is_active());
    assert!(events.try_recv().is_err());

    assert!(subscription.unsubscribe(second));
    assert!(!subscription.is_active());
    assert_eq!(events.try_recv().unwrap(), SubscriptionEvent::Remove);
}

#[tokio::test]
async fn test_publish_reaches_local_listeners_first() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();
    let (received, listener) = recorder();
    subscription.subscribe(listener).await;

    let started = subscription.publish(json!({"test": true})).await;

    assert_eq!(started, 0);
    assert_eq!(*received.lock(), vec![json!({"test": true})]);
}

#[tokio::test]
async fn test_inbound_publish_is_delivered_once() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();
    let (received, listener) = recorder();
    subscription.subscribe(listener).await;
    let from = NodeInfo::new(NodeId::random(), &addr("b"));

    let event = Uuid::new_v4();
    let body = publish_body(&subscription, event, json!(1));
    for _ in 0..2 {
        let reply = subscription
            .table()
            .dispatch(PUBLISH, body.clone(), from.clone())
            .await
            .unwrap();
        assert_eq!(reply, json!({}));
    }

    assert_eq!(*received.lock(), vec![json!(1)]);
}

#[tokio::test]
async fn test_malformed_publish_is_an_error() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();
    let from = NodeInfo::new(NodeId::random(), &addr("b"));

    let err = subscription
        .table()
        .dispatch(PUBLISH, json!({"data": 1}), from)
        .await
        .unwrap_err();
    assert!(matches!(err, OverlayError::Codec(_)));
}

#[tokio::test]
async fn test_dropped_subscription_reports_missing_topic() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();
    let table = subscription.table().clone();
    let body = publish_body(&subscription, Uuid::new_v4(), json!(1));
    drop(subscription);

    let from = NodeInfo::new(NodeId::random(), &addr("b"));
    for method in [PUBLISH, SUBSCRIBE, UNSUBSCRIBE] {
        assert_eq!(
            table.dispatch(method, body.clone(), from.clone()).await,
            Err(OverlayError::TableNotFound(table.id().to_hex())),
            "{method}"
        );
    }
}

#[tokio::test]
async fn test_publisher_evicts_member_whose_subscription_was_dropped() {
    let network = MemoryNetwork::new();
    let b = build(&network, "b");
    b.listen().await.unwrap();
    drop(b.subscription("test", Role::Leaf).unwrap());

    let a = build(&network, "a");
    let subscription = a.subscription("test", Role::Leaf).unwrap();
    subscription.table().add_node(Contact::new(b.id(), addr("b")));
    let mut events = subscription.events();

    assert_eq!(subscription.publish(json!(1)).await, 1);

    // The local delivery comes first, then the failed remote one.
    let warning = tokio::time::timeout(std::time::Duration::from_secs(1), async {
        loop {
            if let SubscriptionEvent::Warning(message) = events.recv().await.unwrap() {
                break message;
            }
        }
    })
    .await
    .unwrap();
    assert!(warning.contains("publish"), "{warning}");
    assert!(!subscription.table().contains(&b.id()));
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_track_sender() {
    let network = MemoryNetwork::new();
    let node = build(&network, "a");
    let subscription = node.subscription("test", Role::Leaf).unwrap();
    let table = subscription.table().clone();
    let from = NodeInfo::new(NodeId::random(), &addr("b"));
    let body = json!({ "id": from.id, "target": table.id(), "topic": "test" });

    table.dispatch(SUBSCRIBE, body.clone(), from.clone()).await.unwrap();
    assert!(table.contains(&from.id));

    table.dispatch(UNSUBSCRIBE, body, from.clone()).await.unwrap();
    assert!(!table.contains(&from.id));
}

#[tokio::test]
async fn test_role_serde_is_lowercase() {
    assert_eq!(serde_json::to_value(Role::Broker).unwrap(), json!("broker"));
    assert_eq!(serde_json::from_value::<Role>(json!("leaf")).unwrap(), Role::Leaf);
    assert_eq!(Role::default(), Role::Leaf);
}
