use thiserror::Error;

pub use gateway_core::error::{GatewayError, Result};

/// Failure modes specific to the handshake (§4.4), kept distinct from
/// [`GatewayError`] for logging granularity. All three collapse to the same
/// `CANNOT_ACCEPT` close code at the transport layer.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("malformed handshake response frame: {0}")]
    MalformedResponse(String),
    #[error("handshake response carried zero signatures")]
    NoSignatures,
    #[error("invalid nonce signature: {0}")]
    InvalidSignature(String),
}

impl HandshakeError {
    /// The human-readable reason passed to the WebSocket close frame.
    pub fn close_reason(&self) -> String {
        self.to_string()
    }
}
