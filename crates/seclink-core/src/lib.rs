#![forbid(unsafe_code)]

//! seclink core - secure request/response channel between two processes that
//! do not share a trust boundary.
//!
//! This crate implements:
//! - The caller-side channel state machine (bind, reconnect, unbind)
//! - The two-message key/ciphertext exchange over an abstract transport
//! - Payload-size admission control against the transport frame ceiling
//! - The responder serve loop with a pluggable processing function
//! - Best-effort push notifications from responder to caller

pub mod channel;
pub mod errors;
pub mod harness;
pub mod notifier;
pub mod responder;
pub mod wire;

pub use channel::{ConnectionState, SecureChannel, DEFAULT_REBIND_DELAY};
pub use errors::{ChannelError, WireError};
pub use notifier::Notifier;
pub use responder::{EchoProcessor, MarkedEchoProcessor, RequestProcessor, SecureResponder};
pub use wire::PushNotification;
