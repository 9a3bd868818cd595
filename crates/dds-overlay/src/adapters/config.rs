use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{NodeId, OverlayConfig, PeerAddr};
use crate::topic::Role;

// ============================================================================
// NodeSettings - settings file of a standalone node
// ============================================================================

/// Settings of one node, loaded from a TOML file.
///
/// # File Format
///
/// ```toml
/// host = "0.0.0.0"
/// port = 4000
/// bootstrap = ["10.0.0.1:4000", "10.0.0.2:4000"]
///
/// [overlay]
/// k = 20
/// concurrency = 16
/// request_timeout_ms = 2000
///
/// [[topics]]
/// name = "prices"
/// role = "broker"
/// ```
///
/// Every key is optional. `id` pins the node id (hex); without it a random
/// one is generated at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub host: String,
    pub port: u16,
    pub id: Option<NodeId>,
    pub bootstrap: Vec<String>,
    pub topics: Vec<TopicSettings>,
    pub overlay: OverlayConfig,
}

/// A topic the node subscribes to at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSettings {
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            id: None,
            bootstrap: Vec::new(),
            topics: Vec::new(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl NodeSettings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Bootstrap entries as addresses. One bad entry fails the whole list.
    pub fn bootstrap_peers(&self) -> Result<Vec<PeerAddr>, ConfigError> {
        self.bootstrap
            .iter()
            .map(|entry| {
                entry
                    .parse()
                    .map_err(|_| ConfigError::InvalidBootstrap(entry.clone()))
            })
            .collect()
    }

    /// Address to listen on.
    pub fn listen_addr(&self) -> PeerAddr {
        PeerAddr::new(self.host.clone(), self.port)
    }

    /// Configured id, or a fresh random one.
    pub fn node_id(&self) -> NodeId {
        self.id.unwrap_or_else(NodeId::random)
    }
}

/// Errors that can occur during settings loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read {path}: {error}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Error message from the I/O operation.
        error: String,
    },
    /// TOML parsing error.
    #[error("failed to parse settings: {0}")]
    Parse(String),
    /// A bootstrap entry is not `host:port`.
    #[error("invalid bootstrap address: {0}")]
    InvalidBootstrap(String),
}
