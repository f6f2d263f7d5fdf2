use std::time::SystemTime;

use crate::model::address::PrivateAddress;

/// An X.509-like certificate.
///
/// The actual signing, chain validation and serialization algebra lives in
/// the cryptographic primitives this crate treats as an external
/// collaborator (see §1 of the design notes); this type only carries the
/// handful of fields the sync protocols need to reason about identity and
/// validity.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Certificate {
    /// DER (or equivalent) encoding, opaque to everything but the crypto
    /// backend.
    pub serialized: Vec<u8>,
    pub subject_private_address: PrivateAddress,
    pub issuer_private_address: PrivateAddress,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: time::OffsetDateTime,
}

impl Certificate {
    pub fn is_valid_at(&self, instant: SystemTime) -> bool {
        let instant = time::OffsetDateTime::from(instant);
        instant >= self.valid_from && instant <= self.valid_until
    }

    /// A certificate is self-issued iff its issuer and subject private
    /// addresses coincide, i.e. the certificate is a root of its own trust
    /// chain.
    ///
    /// Preserved exactly as a standalone predicate rather than folded into
    /// validation: it exists to filter out certificates that otherwise
    /// confuse the underlying crypto library when a trust anchor and an
    /// end-entity certificate share a Subject Key Identifier.
    pub fn is_self_issued(&self) -> bool {
        self.issuer_private_address == self.subject_private_address
    }
}

/// A detached signature over an arbitrary payload (e.g. a handshake nonce),
/// together with the certificate of the key that produced it.
///
/// Verification itself — checking the signature bytes against the subject
/// public key, and chaining the certificate to a trust anchor — is
/// delegated to the crypto backend via [`crate::crypto::NodeCryptoBackend::verify_detached`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DetachedSignature {
    pub signature: Vec<u8>,
    pub signer_certificate: Certificate,
}
