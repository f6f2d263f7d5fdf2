use thiserror::Error;

/// Stable error taxonomy shared by the collection server, the registrar and
/// the courier sync driver.
///
/// Per-item failures while unpacking a cargo's message set are deliberately
/// *not* represented here: they are logged and the offending item is
/// dropped, they never escape as a [`GatewayError`] (see
/// [`MalformedMessageError`] for that narrower, non-terminal case).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No `public_gateway_address` is stored in the config store, but the
    /// operation in progress requires one.
    #[error("private gateway is not registered with a public gateway")]
    UnregisteredGateway,

    /// The courier could not be reached: default-gateway discovery failed,
    /// the courier port was unreachable, or the courier sync subprocess
    /// exited with a code other than 1.
    #[error("could not reach the courier: {0}")]
    DisconnectedFromCourier(String),

    /// The two-round public-gateway registration handshake failed. No
    /// partial state was persisted.
    #[error("gateway registration failed: {0}")]
    Registration(String),

    /// A courier sync run failed in a way that should be surfaced to the
    /// UI as a terminal status.
    #[error("courier sync failed: {0}")]
    CourierSync(String),

    /// A [`crate::store::ParcelStore`], [`crate::store::KeyStore`] or
    /// [`crate::store::ConfigStore`] call failed. The store implementation
    /// is an external collaborator; this variant only carries its message
    /// forward.
    #[error("store error: {0}")]
    Store(String),

    /// A [`crate::crypto::NodeCryptoBackend`] call failed — signing,
    /// verification, encryption or decryption. The crypto backend is an
    /// external collaborator; this variant only carries its message
    /// forward.
    #[error("crypto error: {0}")]
    Crypto(String),
}

/// A single malformed item encountered while unpacking a cargo message set.
///
/// This never terminates a session or a sync: callers log it at `info` or
/// `debug` level and move on to the next item.
#[derive(Debug, Error)]
#[error("malformed message ({context}): {detail}")]
pub struct MalformedMessageError {
    pub context: &'static str,
    pub detail: String,
}

impl MalformedMessageError {
    pub fn new(context: &'static str, detail: impl Into<String>) -> Self {
        Self {
            context,
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = GatewayError> = core::result::Result<T, E>;
