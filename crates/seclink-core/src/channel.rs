//! Caller-side secure channel: connection lifecycle and the request cycle.
//!
//! State machine:
//!
//! ```text
//! Disconnected --bind()--> Connecting --connected--> Connected
//! Connected --liveness lost--> Disconnected --(after delay)--> Connecting
//! bind() with responder absent --> Failed (terminal until explicit re-bind)
//! ```
//!
//! The state is owned exclusively by the channel and mutated under one lock,
//! because liveness callbacks race explicit bind/unbind commands from the
//! shell. Observers get a `watch` stream of states and an `mpsc` stream of
//! push notifications.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use seclink_crypto::{open, seal, KeyPair};
use seclink_transport::{Connection, EndpointId, Transport, TransportError, MAX_FRAME_SIZE};

use crate::errors::ChannelError;
use crate::wire::{self, ControlMsg, EncryptedEnvelope, PushNotification, Request, Response};

/// Delay before the single automatic re-bind attempt after a liveness loss.
/// A fixed delay, not an exponential backoff.
pub const DEFAULT_REBIND_DELAY: Duration = Duration::from_secs(2);

const PUSH_STREAM_DEPTH: usize = 32;

/// Connection lifecycle states observable by the presentation shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Responder absent at bind time. Terminal until an explicit re-bind.
    Failed,
}

/// Caller side of the secure channel. Cheap to clone; all clones share one
/// underlying channel.
#[derive(Clone)]
pub struct SecureChannel {
    core: Arc<ChannelCore>,
}

struct ChannelCore {
    transport: Arc<dyn Transport>,
    endpoint: EndpointId,
    keys: KeyPair,
    rebind_delay: Duration,
    state_tx: watch::Sender<ConnectionState>,
    push_tx: mpsc::Sender<PushNotification>,
    push_rx: Mutex<Option<mpsc::Receiver<PushNotification>>>,
    inner: Mutex<Inner>,
}

/// Mutable link state. `epoch` increments on every unbind and on every new
/// link, so stale liveness callbacks and cancelled binds can be detected.
struct Inner {
    conn: Option<Arc<Connection>>,
    epoch: u64,
    watcher: Option<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,
    rebind: Option<JoinHandle<()>>,
}

impl Inner {
    fn abort_tasks(&mut self) {
        for task in [
            self.watcher.take(),
            self.forwarder.take(),
            self.rebind.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

impl SecureChannel {
    /// Create a channel to `endpoint`. Generates this party's key pair; the
    /// pair lives exactly as long as the channel and is never rotated.
    pub fn new(transport: Arc<dyn Transport>, endpoint: EndpointId) -> Result<Self, ChannelError> {
        Self::with_rebind_delay(transport, endpoint, DEFAULT_REBIND_DELAY)
    }

    /// Same as [`SecureChannel::new`] with a custom auto-rebind delay.
    pub fn with_rebind_delay(
        transport: Arc<dyn Transport>,
        endpoint: EndpointId,
        rebind_delay: Duration,
    ) -> Result<Self, ChannelError> {
        let keys = KeyPair::generate()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (push_tx, push_rx) = mpsc::channel(PUSH_STREAM_DEPTH);
        Ok(Self {
            core: Arc::new(ChannelCore {
                transport,
                endpoint,
                keys,
                rebind_delay,
                state_tx,
                push_tx,
                push_rx: Mutex::new(Some(push_rx)),
                inner: Mutex::new(Inner {
                    conn: None,
                    epoch: 0,
                    watcher: None,
                    forwarder: None,
                    rebind: None,
                }),
            }),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    /// Observable stream of connection states.
    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.core.state_tx.subscribe()
    }

    /// Take the push notification stream. Yields `Some` exactly once.
    pub fn push_stream(&self) -> Option<mpsc::Receiver<PushNotification>> {
        self.core.push_rx.lock().take()
    }

    /// Establish the channel. If the responder endpoint is absent this fails
    /// with `ResponderNotInstalled` and moves to `Failed` without attempting
    /// a connection; there is no automatic retry out of `Failed`.
    pub async fn bind(&self) -> Result<(), ChannelError> {
        ChannelCore::bind(self.core.clone()).await
    }

    /// Release the transport regardless of current state. Idempotent.
    /// Cancels any pending auto-rebind timer; pending requests abort with
    /// `NotConnected`.
    pub fn unbind(&self) {
        {
            let mut inner = self.core.inner.lock();
            inner.epoch += 1;
            inner.abort_tasks();
            inner.conn = None;
            // State publishes stay inside the critical section that mutates
            // the link, so a racing bind cannot observe one without the
            // other.
            self.core.set_state(ConnectionState::Disconnected);
        }
        info!(endpoint = %self.core.endpoint, "channel unbound");
    }

    /// Submit a payload and await the processed result.
    ///
    /// Fetches the responder's current public key, seals the payload to it,
    /// admission-checks the envelope against the transport frame ceiling,
    /// sends it together with this party's public key in one call, and opens
    /// the returned envelope.
    pub async fn send_request(&self, payload: impl AsRef<[u8]>) -> Result<String, ChannelError> {
        let conn = {
            let inner = self.core.inner.lock();
            match (&inner.conn, self.core.state()) {
                (Some(conn), ConnectionState::Connected) => conn.clone(),
                _ => return Err(ChannelError::NotConnected),
            }
        };

        let responder_key = match self.call(&conn, &Request::GetPublicKey).await? {
            Response::PublicKey(key) => key,
            Response::Error(wire_error) => return Err(ChannelError::Rejected(wire_error)),
            Response::Processed(_) => return Err(ChannelError::ResponseDecode),
        };

        let sealed = seal(payload.as_ref(), &responder_key)?;
        let envelope = EncryptedEnvelope {
            sealed,
            sender_public_key: Some(self.core.keys.public_key_bytes().to_vec()),
        };
        let body = wire::encode(&Request::Process(envelope)).map_err(|_| ChannelError::Encode)?;

        // Admission check: the substrate faults on oversized frames, so the
        // envelope never leaves this process if it exceeds the ceiling.
        if body.len() > MAX_FRAME_SIZE {
            return Err(ChannelError::PayloadTooLarge {
                size: body.len(),
                limit: MAX_FRAME_SIZE,
            });
        }

        let response = self.call_raw(&conn, Bytes::from(body)).await?;
        match response {
            Response::Processed(envelope) => {
                let plaintext = open(&envelope.sealed, &self.core.keys)?;
                String::from_utf8(plaintext).map_err(|_| ChannelError::ResponseDecode)
            }
            Response::Error(wire_error) => Err(ChannelError::Rejected(wire_error)),
            Response::PublicKey(_) => Err(ChannelError::ResponseDecode),
        }
    }

    async fn call(&self, conn: &Connection, request: &Request) -> Result<Response, ChannelError> {
        let body = wire::encode(request).map_err(|_| ChannelError::Encode)?;
        self.call_raw(conn, Bytes::from(body)).await
    }

    /// One data-channel call, racing against channel teardown so that
    /// unbind/liveness loss aborts pending requests with `NotConnected`.
    async fn call_raw(&self, conn: &Connection, body: Bytes) -> Result<Response, ChannelError> {
        let mut state_rx = self.core.state_tx.subscribe();
        let reply = tokio::select! {
            result = conn.call(body) => result.map_err(|error| match error {
                TransportError::Disconnected => ChannelError::NotConnected,
                other => ChannelError::Transport(other),
            })?,
            _ = async {
                loop {
                    if *state_rx.borrow_and_update() != ConnectionState::Connected {
                        break;
                    }
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => return Err(ChannelError::NotConnected),
        };
        wire::decode::<Response>(&reply).map_err(|_| ChannelError::ResponseDecode)
    }
}

impl ChannelCore {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "connection state changed");
        }
    }

    async fn bind(core: Arc<Self>) -> Result<(), ChannelError> {
        if core.state() == ConnectionState::Connected {
            return Ok(());
        }
        let start_epoch = core.inner.lock().epoch;

        if !core.transport.is_endpoint_available(&core.endpoint) {
            core.set_state(ConnectionState::Failed);
            return Err(ChannelError::ResponderNotInstalled);
        }

        core.set_state(ConnectionState::Connecting);
        let conn = match core.transport.connect(&core.endpoint).await {
            Ok(conn) => Arc::new(conn),
            Err(_) => {
                // Endpoint vanished between the availability check and the
                // connect; same terminal outcome.
                core.set_state(ConnectionState::Failed);
                return Err(ChannelError::ResponderNotInstalled);
            }
        };

        // Register this connection's push lane as our push destination.
        // Best effort: a responder that drops it only costs us pushes.
        let register =
            wire::encode(&ControlMsg::RegisterPushDestination).map_err(|_| ChannelError::Encode)?;
        if let Err(error) = conn.send_one_way(Bytes::from(register)) {
            warn!(%error, "push destination registration failed");
        }

        let forwarder = conn.take_push_stream().map(|mut pushes| {
            let push_tx = core.push_tx.clone();
            tokio::spawn(async move {
                while let Some(bytes) = pushes.recv().await {
                    match wire::decode::<PushNotification>(&bytes) {
                        Ok(note) => {
                            if push_tx.send(note).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => debug!("dropping undecodable push notification"),
                    }
                }
            })
        });

        {
            let mut inner = core.inner.lock();
            if inner.epoch != start_epoch {
                // Unbound or superseded while connecting; do not resurrect
                // the link.
                if let Some(task) = forwarder {
                    task.abort();
                }
                if inner.conn.is_none() {
                    core.set_state(ConnectionState::Disconnected);
                }
                return Err(ChannelError::NotConnected);
            }
            inner.epoch += 1;
            let epoch = inner.epoch;
            inner.abort_tasks();
            inner.conn = Some(conn.clone());
            inner.forwarder = forwarder;
            let watcher_core = core.clone();
            inner.watcher = Some(tokio::spawn(async move {
                conn.closed().await;
                ChannelCore::on_liveness_lost(&watcher_core, epoch);
            }));
            // Published under the lock that installed the link: `Connected`
            // is never observable while `conn` is absent.
            core.set_state(ConnectionState::Connected);
        }

        info!(endpoint = %core.endpoint, "channel connected");
        Ok(())
    }

    /// Liveness watch callback: the responder went away underneath us.
    /// Drops the dead link and schedules one re-bind after the fixed delay.
    fn on_liveness_lost(core: &Arc<Self>, epoch: u64) {
        let mut inner = core.inner.lock();
        if inner.epoch != epoch {
            // A newer link or an unbind already superseded this watch.
            return;
        }
        inner.conn = None;
        inner.watcher = None;
        if let Some(task) = inner.forwarder.take() {
            task.abort();
        }
        warn!(endpoint = %core.endpoint, "responder link lost, scheduling re-bind");

        let rebind_core = core.clone();
        let delay = core.rebind_delay;
        inner.rebind = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            rebind_core.inner.lock().rebind = None;
            if let Err(error) = ChannelCore::bind(rebind_core.clone()).await {
                warn!(%error, "automatic re-bind failed");
            }
        }));
        core.set_state(ConnectionState::Disconnected);
    }
}
