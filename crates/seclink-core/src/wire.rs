//! Wire messages exchanged over the transport.
//!
//! The encrypted envelope is the only serialized structure the protocol has.
//! The caller's public key rides along on the request leg only, so the
//! responder can seal its reply without any prior key exchange.

use serde::{Deserialize, Serialize};

use seclink_crypto::SealedBox;

use crate::errors::WireError;

/// One sealed message plus, on the request leg, the sender's public key.
/// Never persisted; consumed exactly once by the counterpart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub sealed: SealedBox,
    /// Present only on the first leg of an exchange.
    pub sender_public_key: Option<Vec<u8>>,
}

/// Data-channel call bodies, caller to responder.
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    GetPublicKey,
    Process(EncryptedEnvelope),
}

/// Data-channel reply bodies, responder to caller.
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    PublicKey(Vec<u8>),
    Processed(EncryptedEnvelope),
    Error(WireError),
}

/// Control-lane one-way bodies, caller to responder.
#[derive(Debug, Serialize, Deserialize)]
pub enum ControlMsg {
    /// Register the sending connection's push lane as the caller's push
    /// destination. Last registration wins.
    RegisterPushDestination,
}

/// Fire-and-forget status event pushed from responder to caller. No
/// acknowledgement, no ordering against request traffic, dropped when no
/// caller is connected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub text: String,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
