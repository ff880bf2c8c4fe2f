//! Best-effort push notifications from responder to caller.

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use seclink_transport::PushHandle;

use crate::wire::{self, PushNotification};

/// One-way push mechanism, independent of the request/response cycle.
/// Holds at most one destination; the last registration wins.
#[derive(Default)]
pub struct Notifier {
    destination: Mutex<Option<PushHandle>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where to deliver pushes for the registered caller.
    pub fn register_destination(&self, handle: PushHandle) {
        *self.destination.lock() = Some(handle);
    }

    /// Deliver a status event to the registered caller, if any. Failures are
    /// reported in the log and swallowed; this never raises to the caller of
    /// the processing path and never blocks.
    pub fn push(&self, text: &str) {
        let destination = self.destination.lock().clone();
        let Some(destination) = destination else {
            debug!("push dropped: no destination registered");
            return;
        };
        let note = PushNotification {
            text: text.to_owned(),
        };
        match wire::encode(&note) {
            Ok(bytes) => {
                if let Err(error) = destination.send(Bytes::from(bytes)) {
                    warn!(%error, "push delivery failed");
                }
            }
            Err(error) => warn!(%error, "push encoding failed"),
        }
    }
}
