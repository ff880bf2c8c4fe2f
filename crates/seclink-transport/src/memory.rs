//! In-process message-passing substrate.
//!
//! `MemoryHub` is a registry of endpoints inside one process, standing in for
//! the cross-process substrate of the original system. A responder binds an
//! endpoint and accepts connections; each connection gives the caller a unary
//! data channel (`call`), a one-way control lane (`send_one_way`), a liveness
//! watch (`closed`), and a push lane for responder-initiated notifications.
//!
//! Delivery is in order per connection, and calls are answered one at a time
//! by the accepting side, so single-flight per connection holds as long as
//! the responder loop handles inbound messages sequentially.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::traits::{ConnectError, EndpointId, Transport, TransportError, MAX_FRAME_SIZE};

const CALL_QUEUE_DEPTH: usize = 8;
const PUSH_QUEUE_DEPTH: usize = 16;
const ACCEPT_QUEUE_DEPTH: usize = 8;

/// One inbound message on the responder side of a connection.
pub enum Inbound {
    /// Unary data-channel call; `reply` must be completed to answer it.
    Call {
        body: Bytes,
        reply: oneshot::Sender<Bytes>,
    },
    /// One-way control message. `reply_to` is the push lane back to the
    /// caller that sent it.
    OneWay { body: Bytes, reply_to: PushHandle },
}

/// Best-effort push lane from responder to one caller. Sends never block;
/// delivery fails once the caller is gone.
#[derive(Clone)]
pub struct PushHandle {
    tx: mpsc::Sender<Bytes>,
}

impl PushHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    pub fn send(&self, body: Bytes) -> Result<(), TransportError> {
        match self.tx.try_send(body) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Disconnected),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TransportError::Backpressure),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Caller side of an established connection.
pub struct Connection {
    calls: mpsc::Sender<Inbound>,
    push_tx: mpsc::Sender<Bytes>,
    push_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
}

impl Connection {
    /// Unary request/response call, bounded by [`MAX_FRAME_SIZE`].
    pub async fn call(&self, body: Bytes) -> Result<Bytes, TransportError> {
        if body.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: body.len(),
                limit: MAX_FRAME_SIZE,
            });
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.calls
            .send(Inbound::Call {
                body,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::Disconnected)?;
        reply_rx.await.map_err(|_| TransportError::Disconnected)
    }

    /// One-way control message carrying this connection's push lane as the
    /// reply destination.
    pub fn send_one_way(&self, body: Bytes) -> Result<(), TransportError> {
        if body.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: body.len(),
                limit: MAX_FRAME_SIZE,
            });
        }
        let reply_to = PushHandle {
            tx: self.push_tx.clone(),
        };
        match self.calls.try_send(Inbound::OneWay { body, reply_to }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Disconnected),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TransportError::Backpressure),
        }
    }

    /// Resolves when the responder side of this connection goes away.
    pub async fn closed(&self) {
        self.calls.closed().await
    }

    pub fn is_connected(&self) -> bool {
        !self.calls.is_closed()
    }

    /// Take the receiving end of the push lane. Yields `Some` exactly once.
    pub fn take_push_stream(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.push_rx.lock().take()
    }
}

/// Responder side of an established connection.
pub struct ServerConn {
    inbound: mpsc::Receiver<Inbound>,
}

impl ServerConn {
    /// Next inbound message, `None` when the caller hung up.
    pub async fn next(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

/// Accept side of a bound endpoint. Dropping it unbinds the endpoint: new
/// connects fail and the endpoint reads as unavailable.
pub struct Listener {
    accept_rx: mpsc::Receiver<ServerConn>,
}

impl Listener {
    pub async fn accept(&mut self) -> Option<ServerConn> {
        self.accept_rx.recv().await
    }
}

/// In-process endpoint registry.
#[derive(Default)]
pub struct MemoryHub {
    endpoints: Mutex<HashMap<EndpointId, mpsc::Sender<ServerConn>>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind an endpoint, replacing any previous binding with the same id.
    pub fn bind_endpoint(&self, endpoint: &EndpointId) -> Listener {
        let (accept_tx, accept_rx) = mpsc::channel(ACCEPT_QUEUE_DEPTH);
        self.endpoints.lock().insert(endpoint.clone(), accept_tx);
        Listener { accept_rx }
    }
}

#[async_trait]
impl Transport for MemoryHub {
    async fn connect(&self, endpoint: &EndpointId) -> Result<Connection, ConnectError> {
        let accept_tx = self
            .endpoints
            .lock()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| ConnectError::EndpointNotFound(endpoint.0.clone()))?;

        let (call_tx, call_rx) = mpsc::channel(CALL_QUEUE_DEPTH);
        let (push_tx, push_rx) = mpsc::channel(PUSH_QUEUE_DEPTH);

        accept_tx
            .send(ServerConn { inbound: call_rx })
            .await
            .map_err(|_| ConnectError::EndpointNotFound(endpoint.0.clone()))?;

        Ok(Connection {
            calls: call_tx,
            push_tx,
            push_rx: Mutex::new(Some(push_rx)),
        })
    }

    fn is_endpoint_available(&self, endpoint: &EndpointId) -> bool {
        self.endpoints
            .lock()
            .get(endpoint)
            .map(|accept_tx| !accept_tx.is_closed())
            .unwrap_or(false)
    }
}
