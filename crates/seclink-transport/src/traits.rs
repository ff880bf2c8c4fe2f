//! Transport contract consumed by the secure channel core.

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Connection;

/// Hard per-call frame size ceiling enforced by the substrate (512 KiB).
///
/// Calls above this bound are rejected before delivery; callers are expected
/// to admission-check against it before sealing a payload.
pub const MAX_FRAME_SIZE: usize = 512 * 1024;

/// Identifies a responder endpoint on the substrate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection establishment error.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),
}

/// Errors from an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("frame too large: {size} bytes (max: {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("transport disconnected")]
    Disconnected,

    #[error("transport backpressure: send queue full")]
    Backpressure,
}

/// Caller-side transport factory: connect to an endpoint and query its
/// availability. Supplied by the platform integration layer; the core only
/// consumes this contract.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the control and data channels to `endpoint`.
    async fn connect(&self, endpoint: &EndpointId) -> Result<Connection, ConnectError>;

    /// Discovery query, checked once at bind time.
    fn is_endpoint_available(&self, endpoint: &EndpointId) -> bool;
}
