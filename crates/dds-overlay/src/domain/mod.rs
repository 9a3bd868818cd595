//! Domain Layer - Pure overlay logic with no I/O
//!
//! This module contains:
//! - Node identifiers, addresses and contacts
//! - XOR distance and ordering
//! - The bounded routing table and its eviction bookkeeping
//! - Wire message types of the discovery protocol

pub mod entities;
pub mod errors;
pub mod messages;
pub mod routing_table;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use messages::*;
pub use routing_table::*;
pub use services::*;
pub use value_objects::*;
