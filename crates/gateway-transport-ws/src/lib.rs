//! Concrete WebSocket binding for the parcel collection server (C5, §4.5).
//!
//! Everything protocol-shaped — the handshake verification, the collection
//! tracker — lives in `gateway-switch`; this crate only owns the transport
//! glue: accepting connections, reading the streaming-mode header, framing
//! [`wire::ParcelDelivery`] and the handshake messages onto WebSocket
//! frames, and mapping session outcomes to close codes.

pub mod listener;
pub mod session;
pub mod wire;

pub use listener::CollectionServer;
pub use session::{SessionDeps, STREAMING_MODE_CLOSE_UPON_COMPLETION, STREAMING_MODE_HEADER};
