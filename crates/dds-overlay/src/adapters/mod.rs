//! # Adapters
//!
//! Concrete transports and settings loading.
//!
//! ## Adapters Provided
//!
//! - `MemoryNetwork` / `MemoryTransport` - In-process network with fault
//!   injection, for tests and simulations
//! - `TcpTransport` - Length-prefixed JSON over TCP (requires "network" feature)
//! - `NodeSettings` - TOML settings file (requires "network" feature)

// Semantic submodules
/// In-process transport
pub mod memory;

/// Settings file loading
#[cfg(feature = "network")]
pub mod config;
/// TCP transport
#[cfg(feature = "network")]
pub mod tcp;

// Re-export public API
pub use memory::{MemoryNetwork, MemoryTransport, SentRequest};

#[cfg(feature = "network")]
pub use config::{ConfigError, NodeSettings, TopicSettings};

#[cfg(feature = "network")]
pub use tcp::TcpTransport;
