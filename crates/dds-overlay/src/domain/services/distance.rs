//! Kademlia distance calculations.

use crate::domain::{Distance, NodeId, ID_LENGTH};

/// XOR distance between two identifiers.
///
/// Symmetric, zero only for identical ids, and satisfies the XOR triangle
/// property: `d(a, c) == d(a, b) ^ d(b, c)`.
pub fn xor_distance(a: &NodeId, b: &NodeId) -> Distance {
    let mut out = [0u8; ID_LENGTH];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a.0[i] ^ b.0[i];
    }
    Distance(out)
}

/// Bucket holding `id` in a table keyed by `reference`.
///
/// The index is the length of the common bit prefix, so bucket 0 holds the
/// farthest half of the space and bucket `ID_BITS` can only hold
/// `reference` itself.
#[inline]
pub fn bucket_index(reference: &NodeId, id: &NodeId) -> usize {
    for i in 0..ID_LENGTH {
        let xor = reference.0[i] ^ id.0[i];
        if xor != 0 {
            return i * 8 + xor.leading_zeros() as usize;
        }
    }
    ID_LENGTH * 8
}
