//! Topic table convergence.

mod common;

use common::{addr, start_node, wait_until};
use dds_overlay::{BootstrapState, MemoryNetwork, NodeId, TopicTable};

#[tokio::test]
async fn test_two_nodes_converge_on_a_topic() {
    let network = MemoryNetwork::new();
    let a = start_node(&network, "a", vec![]).await;
    let b = start_node(&network, "b", vec![addr("a")]).await;

    let table_a = TopicTable::new(&a, "test");
    let table_b = TopicTable::new(&b, "test");
    a.add_table(table_a.clone()).unwrap();
    b.add_table(table_b.clone()).unwrap();

    table_a.bootstrap().await;
    table_b.bootstrap().await;

    assert!(table_a.contains(&b.id()));
    assert!(table_b.contains(&a.id()));
    assert_eq!(table_a.bootstrap_state(), BootstrapState::Bootstrapped);
    assert_eq!(table_b.bootstrap_state(), BootstrapState::Bootstrapped);
}

#[tokio::test]
async fn test_topic_members_are_found_past_non_members() {
    let network = MemoryNetwork::new();
    let seed = start_node(&network, "seed", vec![]).await;
    let holder = start_node(&network, "holder", vec![addr("seed")]).await;
    let joiner = start_node(&network, "joiner", vec![addr("seed")]).await;

    holder.add_table(TopicTable::new(&holder, "weather")).unwrap();
    let table = TopicTable::new(&joiner, "weather");
    joiner.add_table(table.clone()).unwrap();

    table.bootstrap().await;

    assert!(table.contains(&holder.id()));
    // The seed only referred us on.
    assert!(!table.contains(&seed.id()));
}

#[tokio::test]
async fn test_unrelated_topics_stay_apart() {
    let network = MemoryNetwork::new();
    let a = start_node(&network, "a", vec![]).await;
    let b = start_node(&network, "b", vec![addr("a")]).await;

    a.add_table(TopicTable::new(&a, "red")).unwrap();
    let blue = TopicTable::new(&b, "blue");
    b.add_table(blue.clone()).unwrap();

    blue.bootstrap().await;

    assert!(blue.is_empty());
    assert!(a.table(&NodeId::digest("blue")).is_none());
}

#[tokio::test]
async fn test_subscriptions_announce_themselves() {
    let network = MemoryNetwork::new();
    let a = start_node(&network, "a", vec![]).await;
    let b = start_node(&network, "b", vec![addr("a")]).await;
    let c = start_node(&network, "c", vec![addr("a")]).await;

    let sub_a = a.subscription("test", Default::default()).unwrap();
    let sub_b = b.subscription("test", Default::default()).unwrap();
    let sub_c = c.subscription("test", Default::default()).unwrap();

    sub_a.subscribe(|_, _| {}).await;
    sub_b.subscribe(|_, _| {}).await;
    sub_c.subscribe(|_, _| {}).await;

    // Membership spreads through lookups and `subscribe` announcements.
    wait_until(|| sub_a.table().contains(&b.id()) && sub_a.table().contains(&c.id())).await;
    wait_until(|| sub_b.table().contains(&a.id()) && sub_b.table().contains(&c.id())).await;
    assert!(sub_c.table().contains(&a.id()));
    assert!(sub_c.table().contains(&b.id()));
}
