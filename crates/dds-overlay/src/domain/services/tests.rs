//! Tests for domain services: XOR metric and ordering.

use super::*;
use crate::domain::{Contact, Distance, NodeId, PeerAddr, ID_BITS, ID_LENGTH};

fn make_node_id(first_byte: u8) -> NodeId {
    let mut bytes = [0u8; ID_LENGTH];
    bytes[0] = first_byte;
    NodeId::new(bytes)
}

fn make_contact(first_byte: u8, seq: u64) -> Contact {
    let mut contact = Contact::new(
        make_node_id(first_byte),
        PeerAddr::new("127.0.0.1", 8000 + first_byte as u16),
    );
    contact.seq = seq;
    contact
}

// =============================================================================
// XOR distance
// =============================================================================

#[test]
fn test_xor_distance_is_symmetric() {
    let a = make_node_id(0b1010_0000);
    let b = make_node_id(0b0101_0000);

    assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
}

#[test]
fn test_xor_distance_to_self_is_zero() {
    let a = NodeId::random();
    assert_eq!(xor_distance(&a, &a), Distance::ZERO);
}

#[test]
fn test_xor_distance_triangle_property() {
    let a = NodeId::random();
    let b = NodeId::random();
    let c = NodeId::random();

    let ab = xor_distance(&a, &b);
    let bc = xor_distance(&b, &c);
    let mut combined = [0u8; ID_LENGTH];
    for i in 0..ID_LENGTH {
        combined[i] = ab.0[i] ^ bc.0[i];
    }
    assert_eq!(xor_distance(&a, &c), Distance(combined));
}

#[test]
fn test_bucket_index_is_common_prefix_length() {
    let local = NodeId::new([0u8; ID_LENGTH]);

    assert_eq!(bucket_index(&local, &make_node_id(0b1000_0000)), 0);
    assert_eq!(bucket_index(&local, &make_node_id(0b0000_0001)), 7);

    let mut tail = [0u8; ID_LENGTH];
    tail[ID_LENGTH - 1] = 1;
    assert_eq!(bucket_index(&local, &NodeId::new(tail)), ID_BITS - 1);

    assert_eq!(bucket_index(&local, &local), ID_BITS);
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_find_k_closest_orders_by_ascending_distance() {
    let target = make_node_id(0);
    let contacts = vec![
        make_contact(0b1000_0000, 0),
        make_contact(0b0000_0001, 1),
        make_contact(0b0001_0000, 2),
    ];

    let closest = find_k_closest(&contacts, &target, 2);

    assert_eq!(closest.len(), 2);
    assert_eq!(closest[0].id, make_node_id(0b0000_0001));
    assert_eq!(closest[1].id, make_node_id(0b0001_0000));
}

#[test]
fn test_sort_is_stable_on_equal_distance() {
    let target = make_node_id(0);
    let mut contacts = vec![make_contact(5, 9), make_contact(5, 2), make_contact(5, 4)];

    sort_by_distance(&mut contacts, &target);

    let seqs: Vec<u64> = contacts.iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![2, 4, 9]);
}

#[test]
fn test_find_k_closest_with_fewer_candidates() {
    let target = make_node_id(0);
    let contacts = vec![make_contact(1, 0)];
    assert_eq!(find_k_closest(&contacts, &target, 10).len(), 1);
    assert!(find_k_closest(&[], &target, 10).is_empty());
}
