//! Domain model, storage/crypto contracts and shared error types for the
//! private gateway sync core.
//!
//! This crate is deliberately inert: it defines what a parcel, a cargo, a
//! CCA and a certificate *are*, and the traits ([`store::ParcelStore`],
//! [`store::KeyStore`], [`store::ConfigStore`], [`crypto::NodeCryptoBackend`])
//! that the protocol logic in `gateway-switch` and the transport glue in
//! `gateway-transport-ws` depend on. No protocol state machine lives here.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod model;
pub mod store;

pub use error::{GatewayError, MalformedMessageError, Result};
