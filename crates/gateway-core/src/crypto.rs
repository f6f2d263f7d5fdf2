//! Cryptographic contract consumed by the sync protocols.
//!
//! Signing, certificate issuance, chain validation and enveloped-data
//! encryption are themselves out of scope (§1) — this module only names
//! the operations the handshake, registrar and courier sync driver need
//! from whatever crypto backend is wired in.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Cargo, CargoMessageSet, Certificate, DetachedSignature, NodeAddress, PrivateKeyHandle};

/// The crypto backend's view of "our identity": a private key handle plus
/// the certificate that vouches for its public half.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: PrivateKeyHandle,
    pub certificate: Certificate,
}

#[async_trait]
pub trait NodeCryptoBackend: Send + Sync {
    /// Produce a detached signature over `payload` using `signer`.
    async fn sign_detached(&self, payload: &[u8], signer: &KeyPair) -> Result<DetachedSignature>;

    /// Verify `signature` is a detached signature over `payload`, chaining
    /// the signer's certificate to one of `trust_anchors`. On success,
    /// returns the signer certificate's private address.
    async fn verify_detached(
        &self,
        payload: &[u8],
        signature: &DetachedSignature,
        trust_anchors: &[Certificate],
    ) -> Result<crate::model::PrivateAddress>;

    /// Issue a new certificate for `subject_public_key` signed by `issuer`,
    /// valid until `valid_until`.
    async fn issue_certificate(
        &self,
        subject_public_key: &[u8],
        issuer: &KeyPair,
        valid_until: time::OffsetDateTime,
    ) -> Result<Certificate>;

    /// Sessionless enveloped-data encryption of `plaintext` to `recipient`.
    async fn encrypt_to(&self, plaintext: &[u8], recipient: &Certificate) -> Result<Vec<u8>>;

    /// Decrypt an enveloped-data payload addressed to `recipient_key`.
    async fn decrypt(&self, ciphertext: &[u8], recipient_key: &PrivateKeyHandle) -> Result<Vec<u8>>;

    /// Sign and encrypt a cargo message set into a [`Cargo`] addressed to
    /// `recipient_certificate`, carrying `recipient_address` as routing
    /// metadata.
    #[allow(clippy::too_many_arguments)]
    async fn pack_cargo(
        &self,
        message_set: &CargoMessageSet,
        signer: &KeyPair,
        recipient_address: NodeAddress,
        recipient_certificate: &Certificate,
        creation_date: time::OffsetDateTime,
        ttl: time::Duration,
    ) -> Result<Cargo>;

    /// Verify `cargo` chains to one of `trust_anchors`, then decrypt and
    /// deserialize its payload as a [`CargoMessageSet`].
    async fn unpack_cargo(
        &self,
        cargo: &Cargo,
        trust_anchors: &[Certificate],
        recipient_key: &PrivateKeyHandle,
    ) -> Result<CargoMessageSet>;
}

#[cfg(feature = "testutil")]
pub mod testutil;
