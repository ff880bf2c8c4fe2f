#![forbid(unsafe_code)]

//! Transport layer for seclink: the contract consumed by the secure channel
//! core, plus the in-process message-passing substrate that implements it.

pub mod memory;
pub mod testing;
pub mod traits;

pub use memory::{Connection, Inbound, Listener, MemoryHub, PushHandle, ServerConn};
pub use traits::{ConnectError, EndpointId, Transport, TransportError, MAX_FRAME_SIZE};
