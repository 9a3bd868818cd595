//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! - **Driving Ports (Inbound):** how inbound queries reach the overlay and
//!   its topic tables
//! - **Driven Ports (Outbound):** the transport the overlay sends through

pub mod inbound;
pub mod outbound;

pub use inbound::{FnHandler, MethodHandler, QueryHandler};
pub use outbound::{InflightGuard, Transport};
