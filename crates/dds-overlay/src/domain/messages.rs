//! Wire messages of the discovery protocol.
//!
//! Requests carry the sender id, a method name and a free-form JSON body.
//! The reserved methods below are answered by the node itself; every other
//! method is routed to the topic table named by `data.target`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entities::{NodeId, NodeInfo};

/// Liveness probe.
pub const PING: &str = "_ping";
/// Closest-node query.
pub const FIND_NODE: &str = "_find_node";
/// Topic member query.
pub const FIND_PEERS: &str = "_find_peers";

/// Whether a method name belongs to the discovery protocol.
pub fn is_reserved(method: &str) -> bool {
    method.starts_with('_')
}

/// An outbound query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Identifier of the querying node.
    pub sender_id: NodeId,
    /// Method name.
    pub method: String,
    /// Method arguments.
    #[serde(default)]
    pub data: Value,
}

impl Request {
    pub fn new(sender_id: NodeId, method: impl Into<String>, data: Value) -> Self {
        Self {
            sender_id,
            method: method.into(),
            data,
        }
    }

    /// The `target` field of the body, if present.
    pub fn target(&self) -> Option<&str> {
        target_of(&self.data)
    }
}

/// A reply together with the identity the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Reply body.
    pub body: Value,
    /// Who answered.
    pub responder: NodeInfo,
}

/// Read `data.target` as a string.
pub fn target_of(data: &Value) -> Option<&str> {
    data.get("target").and_then(Value::as_str)
}

/// Reply to `_find_node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindNodeResponse {
    pub target: NodeId,
    pub nodes: Vec<NodeInfo>,
}

/// Reply to `_find_peers`.
///
/// Exactly one of `nodes` and `peers` is populated: `peers` when the
/// responder holds the topic, `nodes` when it only refers the querier on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindPeersResponse {
    pub target: NodeId,
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub peers: Vec<NodeInfo>,
}

/// Reply to `_ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub pong: bool,
}

/// Extract a `nodes` or `peers` style array from a reply body.
///
/// Malformed entries are skipped rather than failing the whole reply.
pub fn node_list(body: &Value, field: &str) -> Vec<NodeInfo> {
    body.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PeerAddr;
    use serde_json::json;

    #[test]
    fn test_reserved_methods() {
        assert!(is_reserved(PING));
        assert!(is_reserved(FIND_NODE));
        assert!(is_reserved(FIND_PEERS));
        assert!(!is_reserved("publish"));
    }

    #[test]
    fn test_request_wire_form() {
        let id = NodeId::new([1u8; 20]);
        let req = Request::new(id, FIND_NODE, json!({"target": id}));
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["sender_id"], json!(id.to_hex()));
        assert_eq!(req.target(), Some(id.to_hex().as_str()));
    }

    #[test]
    fn test_node_list_skips_malformed_entries() {
        let good = NodeInfo::new(NodeId::new([2u8; 20]), &PeerAddr::new("h", 1));
        let body = json!({
            "nodes": [good, {"id": "nothex", "host": "h", "port": 2}, 42],
        });
        assert_eq!(node_list(&body, "nodes"), vec![good]);
        assert!(node_list(&body, "peers").is_empty());
    }
}
