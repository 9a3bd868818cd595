//! In-process network.
//!
//! Every [`MemoryTransport`] registers its handler in a shared
//! [`MemoryNetwork`] under its address; `send` looks the address up and calls
//! the handler directly. Addresses can be made unreachable (fail at once) or
//! unresponsive (never answer, so the caller's timeout fires), and every
//! request is logged for assertions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::domain::{NodeId, NodeInfo, OverlayError, PeerAddr, Request, Response, Result};
use crate::ports::{InflightGuard, QueryHandler, Transport};

/// One logged request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub from: PeerAddr,
    pub to: PeerAddr,
    pub method: String,
}

#[derive(Clone)]
struct Endpoint {
    handler: Arc<dyn QueryHandler>,
    info: NodeInfo,
}

#[derive(Default)]
struct NetworkInner {
    endpoints: RwLock<HashMap<PeerAddr, Endpoint>>,
    unreachable: RwLock<HashSet<PeerAddr>>,
    unresponsive: RwLock<HashSet<PeerAddr>>,
    latency: RwLock<Duration>,
    log: Mutex<Vec<SentRequest>>,
}

/// Registry connecting in-process transports.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport at `addr` with a fresh random id.
    pub fn transport(&self, addr: PeerAddr) -> Arc<MemoryTransport> {
        self.transport_with_id(NodeId::random(), addr)
    }

    pub fn transport_with_id(&self, id: NodeId, addr: PeerAddr) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            network: self.clone(),
            info: NodeInfo::new(id, &addr),
            inflight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Make requests to `addr` fail immediately.
    pub fn set_unreachable(&self, addr: &PeerAddr, unreachable: bool) {
        let mut set = self.inner.unreachable.write();
        if unreachable {
            set.insert(addr.clone());
        } else {
            set.remove(addr);
        }
    }

    /// Make requests to `addr` hang until the caller gives up.
    pub fn set_unresponsive(&self, addr: &PeerAddr, unresponsive: bool) {
        let mut set = self.inner.unresponsive.write();
        if unresponsive {
            set.insert(addr.clone());
        } else {
            set.remove(addr);
        }
    }

    /// Delay applied to every request.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.write() = latency;
    }

    pub fn is_bound(&self, addr: &PeerAddr) -> bool {
        self.inner.endpoints.read().contains_key(addr)
    }

    /// Every request sent so far, in order.
    pub fn sent_requests(&self) -> Vec<SentRequest> {
        self.inner.log.lock().clone()
    }

    /// How many `method` requests went to `addr`.
    pub fn requests_to(&self, addr: &PeerAddr, method: &str) -> usize {
        self.inner
            .log
            .lock()
            .iter()
            .filter(|r| &r.to == addr && r.method == method)
            .count()
    }

    pub fn clear_log(&self) {
        self.inner.log.lock().clear();
    }
}

/// Transport endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    info: NodeInfo,
    inflight: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn addr(&self) -> PeerAddr {
        self.info.addr()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind(&self, handler: Arc<dyn QueryHandler>) -> Result<PeerAddr> {
        let addr = self.addr();
        let mut endpoints = self.network.inner.endpoints.write();
        if endpoints.contains_key(&addr) {
            return Err(OverlayError::Io(format!("address in use: {addr}")));
        }
        endpoints.insert(
            addr.clone(),
            Endpoint {
                handler,
                info: self.info.clone(),
            },
        );
        Ok(addr)
    }

    async fn send(&self, request: Request, peer: &PeerAddr) -> Result<Response> {
        let _guard = InflightGuard::new(self.inflight.clone());
        let net = &self.network.inner;

        net.log.lock().push(SentRequest {
            from: self.addr(),
            to: peer.clone(),
            method: request.method.clone(),
        });

        let latency = *net.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let unreachable = net.unreachable.read().contains(peer);
        if unreachable {
            return Err(OverlayError::Unreachable(peer.to_string()));
        }
        let unresponsive = net.unresponsive.read().contains(peer);
        if unresponsive {
            std::future::pending::<()>().await;
        }

        let endpoint = net
            .endpoints
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| OverlayError::Unreachable(peer.to_string()))?;

        let body = endpoint
            .handler
            .on_query(request, self.info.clone())
            .await
            .map_err(|err| OverlayError::Remote(err.to_string()))?;

        Ok(Response {
            body,
            responder: endpoint.info,
        })
    }

    fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    fn local_info(&self) -> NodeInfo {
        self.info.clone()
    }

    async fn shutdown(&self) {
        let addr = self.addr();
        let mut endpoints = self.network.inner.endpoints.write();
        if endpoints
            .get(&addr)
            .is_some_and(|e| e.info.id == self.info.id)
        {
            endpoints.remove(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait]
    impl QueryHandler for Echo {
        async fn on_query(&self, request: Request, _sender: NodeInfo) -> Result<Value> {
            Ok(json!({ "method": request.method }))
        }
    }

    fn addr(port: u16) -> PeerAddr {
        PeerAddr::new("mem", port)
    }

    #[tokio::test]
    async fn test_send_reaches_bound_handler() {
        let network = MemoryNetwork::new();
        let a = network.transport(addr(1));
        let b = network.transport(addr(2));
        b.bind(Arc::new(Echo)).await.unwrap();

        let request = Request::new(a.local_info().id, "hello", Value::Null);
        let response = a.send(request, &addr(2)).await.unwrap();

        assert_eq!(response.body, json!({"method": "hello"}));
        assert_eq!(response.responder, b.local_info());
        assert_eq!(network.requests_to(&addr(2), "hello"), 1);
        assert_eq!(a.inflight(), 0);
    }

    #[tokio::test]
    async fn test_unbound_and_unreachable_fail() {
        let network = MemoryNetwork::new();
        let a = network.transport(addr(1));
        let b = network.transport(addr(2));
        b.bind(Arc::new(Echo)).await.unwrap();
        let id = a.local_info().id;

        let err = a
            .send(Request::new(id, "x", Value::Null), &addr(3))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());

        network.set_unreachable(&addr(2), true);
        let err = a
            .send(Request::new(id, "x", Value::Null), &addr(2))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_shutdown_unbinds() {
        let network = MemoryNetwork::new();
        let b = network.transport(addr(2));
        b.bind(Arc::new(Echo)).await.unwrap();
        assert!(network.is_bound(&addr(2)));

        b.shutdown().await;
        assert!(!network.is_bound(&addr(2)));
    }

    #[tokio::test]
    async fn test_double_bind_is_rejected() {
        let network = MemoryNetwork::new();
        network
            .transport(addr(2))
            .bind(Arc::new(Echo))
            .await
            .unwrap();
        assert!(network.transport(addr(2)).bind(Arc::new(Echo)).await.is_err());
    }
}
