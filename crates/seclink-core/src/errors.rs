//! Error taxonomy for the secure channel.
//!
//! `ChannelError` is what the caller-side surface reports to the presentation
//! shell, always as a value, never as a panic. `WireError` is the wire-safe
//! subset the responder sends back for failed calls; it never exposes
//! responder internals.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use seclink_crypto::CryptoError;
use seclink_transport::TransportError;

/// Caller-side channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Crypto failure on this side: key generation at construction, sealing
    /// a request, or opening a response.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The channel is not in the Connected state. Pending operations also
    /// abort with this when the channel is unbound.
    #[error("not connected")]
    NotConnected,

    /// Rejected pre-flight; nothing was sent over the transport.
    #[error("payload too large: {size} bytes (max: {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The responder endpoint is not present. Terminal until an explicit
    /// re-bind; no automatic retry.
    #[error("responder not installed")]
    ResponderNotInstalled,

    /// A reply arrived but could not be decoded, or decrypted plaintext was
    /// not valid UTF-8.
    #[error("response decode error")]
    ResponseDecode,

    /// A request or control message could not be encoded.
    #[error("message encoding failed")]
    Encode,

    /// Underlying transport failure other than disconnection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The responder answered the call with a wire-level error.
    #[error("rejected by responder: {0}")]
    Rejected(WireError),
}

/// Wire-safe errors a responder reports for one failed call. The call fails;
/// the connection and the responder stay up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum WireError {
    #[error("invalid request")]
    InvalidRequest,

    #[error("payload exceeds frame size limit")]
    PayloadTooLarge,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("missing sender public key")]
    MissingSenderKey,

    #[error("internal error")]
    Internal,
}
