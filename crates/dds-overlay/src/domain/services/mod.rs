//! Domain services: pure functions over the XOR metric.
//!
//! Everything here is deterministic and free of I/O.

mod distance;
mod sorting;

pub use distance::{bucket_index, xor_distance};
pub use sorting::{find_k_closest, sort_by_distance};

#[cfg(test)]
mod tests;
