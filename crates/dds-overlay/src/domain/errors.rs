//! Domain errors for the overlay.

use thiserror::Error;

use super::entities::NodeId;

/// Errors raised by the overlay, its topic tables and its transports.
///
/// Most of these never reach a caller: lookups swallow per-peer failures and
/// subscription fan-out turns them into warnings. The one error surfaced at
/// a call site in normal operation is [`OverlayError::DuplicateTableRegistration`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    /// The peer did not answer within the request timeout.
    #[error("request timed out")]
    TransportTimeout,

    /// The peer could not be reached at all.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// A ping was answered by a different node than the one probed.
    #[error("unexpected node identity: expected {expected}, got {actual}")]
    UnexpectedNodeIdentity { expected: NodeId, actual: NodeId },

    /// A lookup target is not a well-formed identifier.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// An address string is not `host:port`.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The topic table has no handler for the method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// No topic table is registered for the request target.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A topic table is already registered for this id.
    #[error("a table for topic {0} is already registered")]
    DuplicateTableRegistration(NodeId),

    /// Method names starting with `_` belong to the discovery protocol.
    #[error("method name is reserved: {0}")]
    ReservedMethod(String),

    /// The remote handler returned an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Socket level failure.
    #[error("io error: {0}")]
    Io(String),

    /// The node has been destroyed.
    #[error("node destroyed")]
    Destroyed,
}

impl OverlayError {
    /// Whether the error means the peer should be treated as dead.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout
                | Self::Unreachable(_)
                | Self::UnexpectedNodeIdentity { .. }
                | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Convenience alias for overlay results.
pub type Result<T> = std::result::Result<T, OverlayError>;
