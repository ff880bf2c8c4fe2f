//! Responder side: accepts connections, serves the key/ciphertext exchange,
//! and runs the pluggable processing function.
//!
//! The responder generates a fresh key pair per activation; nothing is
//! persisted across restarts, so a reconnecting caller always re-fetches the
//! public key. Each connection is served by its own task that handles
//! inbound messages strictly one at a time (single-flight per connection);
//! concurrent connections are independent.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use seclink_crypto::{open, seal, KeyPair};
use seclink_transport::{Inbound, Listener, PushHandle, ServerConn, MAX_FRAME_SIZE};

use crate::errors::{ChannelError, WireError};
use crate::notifier::Notifier;
use crate::wire::{self, ControlMsg, EncryptedEnvelope, Request, Response};

/// Processing function applied to each decrypted request. Opaque to the
/// channel core: it produces response bytes from request bytes.
pub trait RequestProcessor: Send + Sync {
    fn process(&self, request: &[u8]) -> Vec<u8>;
}

/// Identity processor: echoes the request unchanged.
pub struct EchoProcessor;

impl RequestProcessor for EchoProcessor {
    fn process(&self, request: &[u8]) -> Vec<u8> {
        request.to_vec()
    }
}

/// Prefixes a marker and echoes the request, mirroring the reference
/// responder's behavior.
pub struct MarkedEchoProcessor {
    marker: String,
}

impl MarkedEchoProcessor {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl RequestProcessor for MarkedEchoProcessor {
    fn process(&self, request: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.marker.len() + request.len());
        out.extend_from_slice(self.marker.as_bytes());
        out.extend_from_slice(request);
        out
    }
}

/// Responder side of the secure channel.
pub struct SecureResponder {
    keys: KeyPair,
    processor: Arc<dyn RequestProcessor>,
    notifier: Arc<Notifier>,
}

impl SecureResponder {
    /// Activate a responder: generates its key pair for this process
    /// lifetime.
    pub fn new(processor: Arc<dyn RequestProcessor>) -> Result<Arc<Self>, ChannelError> {
        Ok(Arc::new(Self {
            keys: KeyPair::generate()?,
            processor,
            notifier: Arc::new(Notifier::new()),
        }))
    }

    /// The notifier delivering status pushes to the registered caller.
    pub fn notifier(&self) -> Arc<Notifier> {
        self.notifier.clone()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.keys.public_key_bytes()
    }

    /// Accept loop. Runs until the task driving it is dropped; connection
    /// tasks live in a `JoinSet` so they die with the serve loop.
    pub async fn serve(self: Arc<Self>, mut listener: Listener) {
        let mut connections = JoinSet::new();
        info!("responder serving");
        while let Some(conn) = listener.accept().await {
            debug!("connection accepted");
            connections.spawn(self.clone().serve_conn(conn));
        }
    }

    /// Handle one connection's inbound messages sequentially. No request on
    /// this connection is processed while a prior one is still executing.
    async fn serve_conn(self: Arc<Self>, mut conn: ServerConn) {
        while let Some(inbound) = conn.next().await {
            match inbound {
                Inbound::Call { body, reply } => {
                    let response = self.handle_call(&body);
                    match wire::encode(&response) {
                        Ok(bytes) => {
                            let _ = reply.send(Bytes::from(bytes));
                        }
                        // Dropping the reply fails the call on the caller
                        // side without taking this connection down.
                        Err(error) => warn!(%error, "response encoding failed"),
                    }
                }
                Inbound::OneWay { body, reply_to } => self.handle_control(&body, reply_to),
            }
        }
        debug!("connection closed");
    }

    pub(crate) fn handle_call(&self, body: &[u8]) -> Response {
        let request = match wire::decode::<Request>(body) {
            Ok(request) => request,
            Err(_) => return Response::Error(WireError::InvalidRequest),
        };
        match request {
            Request::GetPublicKey => Response::PublicKey(self.keys.public_key_bytes().to_vec()),
            Request::Process(envelope) => self.process(envelope),
        }
    }

    /// One request/response exchange. Every failure is isolated to this one
    /// call; the serve loop and the connection stay up.
    fn process(&self, envelope: EncryptedEnvelope) -> Response {
        // Admission check before any decryption work.
        if envelope.sealed.ciphertext.len() > MAX_FRAME_SIZE {
            warn!(
                size = envelope.sealed.ciphertext.len(),
                limit = MAX_FRAME_SIZE,
                "rejecting oversized request"
            );
            self.notifier
                .push("request rejected: payload exceeds frame size limit");
            return Response::Error(WireError::PayloadTooLarge);
        }

        let Some(caller_key) = envelope.sender_public_key else {
            return Response::Error(WireError::MissingSenderKey);
        };

        let plaintext = match open(&envelope.sealed, &self.keys) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                warn!(%error, "request decryption failed");
                return Response::Error(WireError::DecryptFailed);
            }
        };

        let processed = self.processor.process(&plaintext);
        self.notifier.push("encrypting response");

        match seal(&processed, &caller_key) {
            Ok(sealed) => Response::Processed(EncryptedEnvelope {
                sealed,
                sender_public_key: None,
            }),
            Err(error) => {
                warn!(%error, "response sealing failed");
                Response::Error(WireError::Internal)
            }
        }
    }

    fn handle_control(&self, body: &[u8], reply_to: PushHandle) {
        match wire::decode::<ControlMsg>(body) {
            Ok(ControlMsg::RegisterPushDestination) => {
                debug!("push destination registered");
                self.notifier.register_destination(reply_to);
            }
            Err(_) => debug!("ignoring undecodable control message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seclink_crypto::SealedBox;
    use seclink_transport::testing::push_pair;
    use crate::wire::PushNotification;

    fn oversized_envelope() -> EncryptedEnvelope {
        EncryptedEnvelope {
            sealed: SealedBox {
                ephemeral_pub: vec![0; 32],
                nonce: vec![0; 24],
                ciphertext: vec![0; MAX_FRAME_SIZE + 1],
            },
            sender_public_key: Some(vec![0; 32]),
        }
    }

    #[tokio::test]
    async fn oversized_request_rejected_before_decrypting() {
        let responder = SecureResponder::new(Arc::new(EchoProcessor)).unwrap();
        let response = responder.process(oversized_envelope());
        assert!(matches!(
            response,
            Response::Error(WireError::PayloadTooLarge)
        ));
    }

    #[tokio::test]
    async fn oversized_request_emits_rejection_push() {
        let responder = SecureResponder::new(Arc::new(EchoProcessor)).unwrap();
        let (handle, mut rx) = push_pair(4);
        responder.notifier().register_destination(handle);

        let _ = responder.process(oversized_envelope());

        let bytes = rx.recv().await.expect("rejection push");
        let note: PushNotification = wire::decode(&bytes).unwrap();
        assert!(note.text.contains("rejected"));
    }

    #[tokio::test]
    async fn garbage_envelope_fails_without_crashing() {
        let responder = SecureResponder::new(Arc::new(EchoProcessor)).unwrap();
        let envelope = EncryptedEnvelope {
            sealed: SealedBox {
                ephemeral_pub: vec![1; 32],
                nonce: vec![2; 24],
                ciphertext: vec![3; 64],
            },
            sender_public_key: Some(vec![4; 32]),
        };
        assert!(matches!(
            responder.process(envelope),
            Response::Error(WireError::DecryptFailed)
        ));

        // The responder still answers afterwards.
        let key = responder.handle_call(&wire::encode(&Request::GetPublicKey).unwrap());
        assert!(matches!(key, Response::PublicKey(_)));
    }

    #[tokio::test]
    async fn missing_sender_key_rejected() {
        let responder = SecureResponder::new(Arc::new(EchoProcessor)).unwrap();
        let sealed = seal(b"hi", &responder.public_key_bytes()).unwrap();
        let envelope = EncryptedEnvelope {
            sealed,
            sender_public_key: None,
        };
        assert!(matches!(
            responder.process(envelope),
            Response::Error(WireError::MissingSenderKey)
        ));
    }

    #[tokio::test]
    async fn undecodable_call_body_is_an_invalid_request() {
        let responder = SecureResponder::new(Arc::new(EchoProcessor)).unwrap();
        assert!(matches!(
            responder.handle_call(&[0xde, 0xad, 0xbe, 0xef]),
            Response::Error(WireError::InvalidRequest)
        ));
    }

    #[test]
    fn marked_echo_prefixes_marker() {
        let processor = MarkedEchoProcessor::new("#processed:");
        assert_eq!(processor.process(b"data"), b"#processed:data".to_vec());
    }
}
