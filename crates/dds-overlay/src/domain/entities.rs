//! Core domain entities for the overlay.
//!
//! Identifiers, peer addresses and the contacts held by routing tables.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::errors::OverlayError;

/// Length of a [`NodeId`] in bytes.
pub const ID_LENGTH: usize = 20;

/// Length of a [`NodeId`] in bits (one bucket per prefix length).
pub const ID_BITS: usize = ID_LENGTH * 8;

/// 160-bit identifier of a peer (or a topic) in the XOR metric space.
///
/// Identifiers are never ordered lexically; proximity is always measured with
/// [`xor_distance`](crate::domain::xor_distance) against some target. On the
/// wire an id is a lowercase hex string, which round-trips the exact bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; ID_LENGTH]);

impl NodeId {
    /// Create a NodeId from raw bytes.
    pub fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate a random identifier for a fresh node.
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Derive an identifier from arbitrary bytes.
    ///
    /// SHA-256 truncated to [`ID_LENGTH`] bytes. Used for topic ids and for
    /// lookup targets that are named by a method rather than an id.
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        let hash = Sha256::digest(data.as_ref());
        let mut bytes = [0u8; ID_LENGTH];
        bytes.copy_from_slice(&hash[..ID_LENGTH]);
        Self(bytes)
    }

    /// Parse a hex encoded identifier.
    ///
    /// Fails with [`OverlayError::InvalidTarget`] on non-hex input or a wrong
    /// length.
    pub fn from_hex(s: &str) -> Result<Self, OverlayError> {
        let raw = hex::decode(s).map_err(|_| OverlayError::InvalidTarget(s.to_string()))?;
        let bytes: [u8; ID_LENGTH] = raw
            .try_into()
            .map_err(|_| OverlayError::InvalidTarget(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First six hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(6);
        s
    }

    /// Get the underlying bytes for XOR distance calculation.
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl FromStr for NodeId {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a topic: the digest of its human readable name.
pub type TopicId = NodeId;

/// Network address of a peer (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    /// Hostname or IP literal.
    pub host: String,
    /// Port number.
    pub port: u16,
}

impl PeerAddr {
    /// Create a new peer address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| OverlayError::InvalidAddress(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| OverlayError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(OverlayError::InvalidAddress(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

/// Wire form of a peer reference: the entries of `nodes` / `peers` arrays and
/// the identity a transport attaches to every request and response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Peer identifier.
    pub id: NodeId,
    /// Advertised host.
    pub host: String,
    /// Advertised port.
    pub port: u16,
}

impl NodeInfo {
    /// Build from an id and an address.
    pub fn new(id: NodeId, addr: &PeerAddr) -> Self {
        Self {
            id,
            host: addr.host.clone(),
            port: addr.port,
        }
    }

    /// The advertised address.
    pub fn addr(&self) -> PeerAddr {
        PeerAddr::new(self.host.clone(), self.port)
    }
}

/// A peer reference held by a routing table.
///
/// Distance is never cached here; it depends on the target of whoever is
/// asking and is always derived live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Peer identifier.
    pub id: NodeId,
    /// Where to reach the peer.
    pub addr: PeerAddr,
    /// Last successful contact.
    pub last_seen: Instant,
    /// Insertion order, assigned by the owning table. Stable tie-breaker.
    pub(crate) seq: u64,
}

impl Contact {
    /// Create a contact seen just now.
    pub fn new(id: NodeId, addr: PeerAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            seq: 0,
        }
    }

    /// Create a contact from its wire form.
    pub fn from_info(info: &NodeInfo) -> Self {
        Self::new(info.id, info.addr())
    }

    /// Wire form of this contact.
    pub fn info(&self) -> NodeInfo {
        NodeInfo::new(self.id, &self.addr)
    }
}
