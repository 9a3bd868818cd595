//! Contact ordering by distance.

use std::cmp::Ordering;

use super::distance::xor_distance;
use crate::domain::{Contact, NodeId};

fn by_distance(target: &NodeId) -> impl Fn(&Contact, &Contact) -> Ordering + '_ {
    move |a, b| {
        xor_distance(&a.id, target)
            .cmp(&xor_distance(&b.id, target))
            .then(a.seq.cmp(&b.seq))
    }
}

/// Sort contacts by ascending XOR distance to `target`.
///
/// Equal distances (only possible for duplicate ids) keep insertion order.
pub fn sort_by_distance(contacts: &mut [Contact], target: &NodeId) {
    contacts.sort_by(by_distance(target));
}

/// Find the `count` closest contacts to a target from a list
///
/// # Arguments
/// * `contacts` - Candidates, in any order
/// * `target` - Identifier to measure distance from
/// * `count` - Maximum number of contacts to return
pub fn find_k_closest(contacts: &[Contact], target: &NodeId, count: usize) -> Vec<Contact> {
    let mut sorted = contacts.to_vec();
    sort_by_distance(&mut sorted, target);
    sorted.truncate(count);
    sorted
}
