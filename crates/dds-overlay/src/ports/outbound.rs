//! # Driven Ports (Outbound SPI)
//!
//! The overlay needs exactly one thing from its host: a request/response
//! channel to other peers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::inbound::QueryHandler;
use crate::domain::{NodeInfo, PeerAddr, Request, Response, Result};

/// Abstract interface for network I/O.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: lookups, fan-out tasks and the
/// liveness sweep send concurrently through the same transport.
///
/// Timeouts are applied by the caller; `send` may wait indefinitely.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start accepting queries and deliver them to `handler`.
    ///
    /// Returns once listening, with the address actually bound.
    async fn bind(&self, handler: Arc<dyn QueryHandler>) -> Result<PeerAddr>;

    /// Send one request and wait for the reply.
    ///
    /// # Returns
    ///
    /// The reply body together with the identity the responder reported.
    async fn send(&self, request: Request, peer: &PeerAddr) -> Result<Response>;

    /// Requests currently awaiting a reply, across all callers.
    fn inflight(&self) -> usize;

    /// Identity advertised to peers.
    fn local_info(&self) -> NodeInfo;

    /// Stop accepting queries. Idempotent.
    async fn shutdown(&self);
}

/// Counts one in-flight request for as long as it is alive.
///
/// Transports hold one across each `send`, so the count stays right when the
/// caller drops the future on timeout.
#[derive(Debug)]
pub struct InflightGuard {
    counter: Arc<AtomicUsize>,
}

impl InflightGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
