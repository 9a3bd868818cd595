//! # Driving Ports (Inbound API)
//!
//! A transport hands every decoded request to a [`QueryHandler`]; the node
//! answers reserved methods itself and forwards the rest to a topic table's
//! [`MethodHandler`].

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{NodeInfo, Request, Result};

/// Receiver of inbound queries.
///
/// Implemented by the node. The transport supplies `sender` from what it
/// observed on the wire (id from the request, address from the connection
/// or the envelope).
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Answer one query.
    ///
    /// # Returns
    ///
    /// The reply body, or an error the transport reports back to the caller.
    async fn on_query(&self, request: Request, sender: NodeInfo) -> Result<Value>;
}

/// Handler for one named method of a topic table.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, data: Value, sender: NodeInfo) -> Result<Value>;
}

/// Adapts a plain closure into a [`MethodHandler`].
///
/// ```rust,ignore
/// table.add_method("echo", Arc::new(FnHandler::new(|data, _sender| Ok(data))))?;
/// ```
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Value, NodeInfo) -> Result<Value> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[async_trait]
impl<F> MethodHandler for FnHandler<F>
where
    F: Fn(Value, NodeInfo) -> Result<Value> + Send + Sync,
{
    async fn call(&self, data: Value, sender: NodeInfo) -> Result<Value> {
        (self.func)(data, sender)
    }
}
