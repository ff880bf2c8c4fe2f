//! Testing utilities for code that consumes the transport contract.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::memory::PushHandle;

/// Detached push lane: a handle plus the receiver a caller would own.
/// Lets responder-side code be exercised without a full connection.
pub fn push_pair(depth: usize) -> (PushHandle, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(depth);
    (PushHandle::from_sender(tx), rx)
}
