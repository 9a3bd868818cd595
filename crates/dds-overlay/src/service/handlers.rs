//! Inbound query dispatch.
//!
//! Reserved methods are answered here. Everything else goes to the topic
//! table registered under `data.target`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::core::{Node, WeakNode};
use crate::domain::{
    node_list, target_of, Contact, FindNodeResponse, FindPeersResponse, NodeId, NodeInfo,
    OverlayError, Pong, Request, Result, FIND_NODE, FIND_PEERS, PING,
};
use crate::ports::QueryHandler;

impl Node {
    fn on_ping(&self) -> Result<Value> {
        Ok(serde_json::to_value(Pong { pong: true })?)
    }

    /// `_find_node`: merge any contacts the querier shared, then answer
    /// with our k closest to the target plus ourselves.
    fn on_find_node(&self, data: &Value) -> Result<Value> {
        for info in node_list(data, "nodes") {
            self.add_node(Contact::from_info(&info));
        }

        let Some(target) = parse_target(data) else {
            return Ok(json!({}));
        };

        let mut nodes: Vec<NodeInfo> = self
            .closest_nodes(&target, self.inner.config.k)
            .iter()
            .map(Contact::info)
            .collect();
        nodes.push(self.local_info());

        Ok(serde_json::to_value(FindNodeResponse { target, nodes })?)
    }

    /// `_find_peers`: topic members when we hold the topic, a referral to
    /// closer nodes otherwise.
    fn on_find_peers(&self, data: &Value) -> Result<Value> {
        let Some(target) = parse_target(data) else {
            return Ok(json!({}));
        };

        let response = match self.table(&target) {
            Some(table) => {
                let mut peers: Vec<NodeInfo> = table.members().iter().map(Contact::info).collect();
                peers.push(self.local_info());
                FindPeersResponse {
                    target,
                    nodes: Vec::new(),
                    peers,
                }
            }
            None => FindPeersResponse {
                target,
                nodes: self
                    .closest_nodes(&target, self.inner.config.k)
                    .iter()
                    .map(Contact::info)
                    .collect(),
                peers: Vec::new(),
            },
        };

        Ok(serde_json::to_value(response)?)
    }

    async fn on_command(&self, request: Request, sender: NodeInfo) -> Result<Value> {
        let raw = request.target().unwrap_or_default().to_string();
        let table = NodeId::from_hex(&raw)
            .ok()
            .and_then(|target| self.table(&target))
            .ok_or(OverlayError::TableNotFound(raw))?;

        table.dispatch(&request.method, request.data, sender).await
    }
}

/// Parse `data.target`, logging and discarding malformed values.
fn parse_target(data: &Value) -> Option<NodeId> {
    let raw = target_of(data).unwrap_or_default();
    match NodeId::from_hex(raw) {
        Ok(target) => Some(target),
        Err(err) => {
            debug!(error = %err, "ignoring discovery query");
            None
        }
    }
}

#[async_trait]
impl QueryHandler for Node {
    async fn on_query(&self, request: Request, sender: NodeInfo) -> Result<Value> {
        if self.is_destroyed() {
            return Err(OverlayError::Destroyed);
        }

        self.add_node(Contact::new(request.sender_id, sender.addr()));
        debug!(
            id = %self.id().short(),
            from = %sender.id.short(),
            method = %request.method,
            "query"
        );

        match request.method.as_str() {
            PING => self.on_ping(),
            FIND_NODE => self.on_find_node(&request.data),
            FIND_PEERS => self.on_find_peers(&request.data),
            _ => self.on_command(request, sender).await,
        }
    }
}

#[async_trait]
impl QueryHandler for WeakNode {
    async fn on_query(&self, request: Request, sender: NodeInfo) -> Result<Value> {
        match self.upgrade() {
            Some(node) => node.on_query(request, sender).await,
            None => Err(OverlayError::Destroyed),
        }
    }
}
