//! Protocol orchestration for the private gateway sync core.
//!
//! Transport- and storage-agnostic: everything here depends only on
//! `gateway-core`'s traits plus `tokio` for async plumbing. The concrete
//! WebSocket binding for the parcel collection server (C5) lives in
//! `gateway-transport-ws`, which wires [`handshake`] and [`tracker`] onto a
//! real connection.

pub mod courier;
pub mod error;
pub mod handshake;
pub mod registrar;
pub mod stage;
pub mod tracker;

pub use error::{GatewayError, HandshakeError, Result};
pub use tracker::CollectionTracker;
