//! Test harness: spins up a responder on an in-process hub and tears it down
//! on demand, so integration tests can exercise connection-loss paths.

use std::sync::Arc;

use tokio::task::JoinHandle;

use seclink_transport::{EndpointId, MemoryHub};

use crate::errors::ChannelError;
use crate::responder::{RequestProcessor, SecureResponder};

/// A running responder. Dropping the handle (or calling [`shutdown`]) aborts
/// the serve loop and every connection task, which fires the liveness watch
/// of any bound caller.
///
/// [`shutdown`]: ResponderHandle::shutdown
pub struct ResponderHandle {
    pub responder: Arc<SecureResponder>,
    task: JoinHandle<()>,
}

impl ResponderHandle {
    /// Simulate a responder crash.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ResponderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Activate a responder on `endpoint` and start serving.
pub fn spawn_responder(
    hub: &MemoryHub,
    endpoint: &EndpointId,
    processor: Arc<dyn RequestProcessor>,
) -> Result<ResponderHandle, ChannelError> {
    let responder = SecureResponder::new(processor)?;
    let listener = hub.bind_endpoint(endpoint);
    let task = tokio::spawn(responder.clone().serve(listener));
    Ok(ResponderHandle { responder, task })
}
