//! TCP transport.
//!
//! # Wire Protocol
//!
//! One request per connection. Each direction carries a single frame:
//! - Bytes 0-3: payload length, big-endian u32 (at most [`MAX_FRAME_LEN`])
//! - Payload: JSON `{"message": .., "error": .., "rinfo": {id, host, port}}`
//!
//! The request frame's `message` is a [`Request`]; the reply frame's is the
//! reply body, or `error` is set when the handler failed. `rinfo` always
//! describes the node that wrote the frame.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{NodeId, NodeInfo, OverlayError, PeerAddr, Request, Response, Result};
use crate::ports::{InflightGuard, QueryHandler, Transport};

/// Largest accepted frame payload (1 MiB).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    message: Option<T>,
    error: Option<String>,
    rinfo: NodeInfo,
}

/// Transport over plain TCP sockets.
pub struct TcpTransport {
    info: RwLock<NodeInfo>,
    inflight: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
}

impl TcpTransport {
    /// Transport that will listen on `addr` and advertise `id`.
    ///
    /// Port 0 picks a free port at bind time; the advertised port follows.
    pub fn new(id: NodeId, addr: PeerAddr) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            info: RwLock::new(NodeInfo::new(id, &addr)),
            inflight: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn bind(&self, handler: Arc<dyn QueryHandler>) -> Result<PeerAddr> {
        let configured = self.local_info();
        let listener = TcpListener::bind((configured.host.as_str(), configured.port)).await?;
        let port = listener.local_addr()?.port();

        let info = {
            let mut info = self.info.write();
            info.port = port;
            info.clone()
        };

        let mut shutdown = self.shutdown.subscribe();
        let local = info.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            let handler = handler.clone();
                            let local = local.clone();
                            tokio::spawn(async move {
                                if let Err(err) = serve(stream, handler, local).await {
                                    debug!(%remote, error = %err, "connection failed");
                                }
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });

        Ok(info.addr())
    }

    async fn send(&self, request: Request, peer: &PeerAddr) -> Result<Response> {
        let _guard = InflightGuard::new(self.inflight.clone());

        let mut stream = TcpStream::connect((peer.host.as_str(), peer.port))
            .await
            .map_err(|err| OverlayError::Unreachable(format!("{peer}: {err}")))?;

        let envelope = Envelope {
            message: Some(request),
            error: None,
            rinfo: self.local_info(),
        };
        write_frame(&mut stream, &envelope).await?;

        let reply: Envelope<Value> = read_frame(&mut stream).await?;
        if let Some(error) = reply.error {
            return Err(OverlayError::Remote(error));
        }
        Ok(Response {
            body: reply.message.unwrap_or(Value::Null),
            responder: reply.rinfo,
        })
    }

    fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    fn local_info(&self) -> NodeInfo {
        self.info.read().clone()
    }

    async fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Answer one inbound request.
async fn serve(mut stream: TcpStream, handler: Arc<dyn QueryHandler>, local: NodeInfo) -> Result<()> {
    let envelope: Envelope<Request> = read_frame(&mut stream).await?;
    let request = envelope
        .message
        .ok_or_else(|| OverlayError::Codec("request frame without message".into()))?;

    let reply = match handler.on_query(request, envelope.rinfo).await {
        Ok(body) => Envelope {
            message: Some(body),
            error: None,
            rinfo: local,
        },
        Err(err) => Envelope {
            message: None,
            error: Some(err.to_string()),
            rinfo: local,
        },
    };
    write_frame(&mut stream, &reply).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn write_frame<T: Serialize>(stream: &mut TcpStream, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(OverlayError::Codec(format!(
            "frame of {} bytes exceeds limit",
            payload.len()
        )));
    }
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame<T: DeserializeOwned>(stream: &mut TcpStream) -> Result<T> {
    let len = stream.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(OverlayError::Codec(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}
