//! A deterministic, non-cryptographic stand-in for [`super::NodeCryptoBackend`].
//!
//! Signing here leaks the private key inside the "signature" so verification
//! can recompute it without a real public-key scheme, and "encryption" is a
//! length-prefixed marker rather than an actual cipher. Fine for exercising
//! protocol logic in tests; never wire this into anything that touches real
//! traffic.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, Result};
use crate::model::{
    Cargo, CargoMessageSet, Certificate, DetachedSignature, NodeAddress, PrivateAddress,
    PrivateKeyHandle,
};

use super::KeyPair;

/// Derive the deterministic private address this test backend assigns to a
/// key: the hex SHA-256 digest of the raw key bytes.
pub fn private_address_of(private_key: &PrivateKeyHandle) -> PrivateAddress {
    let mut hasher = Sha256::new();
    hasher.update(&private_key.0);
    PrivateAddress(hex::encode(hasher.finalize()))
}

/// Mint a fresh, random private key handle and self-issued certificate
/// valid for the given window. Useful for seeding test gateways/endpoints.
pub fn generate_self_issued(valid_until: time::OffsetDateTime) -> KeyPair {
    let key_bytes: [u8; 32] = rand::random();
    let private_key = PrivateKeyHandle(key_bytes.to_vec());
    let address = private_address_of(&private_key);
    let certificate = Certificate {
        serialized: key_bytes.to_vec(),
        subject_private_address: address.clone(),
        issuer_private_address: address,
        valid_from: time::OffsetDateTime::now_utc() - time::Duration::minutes(5),
        valid_until,
    };
    KeyPair {
        private_key,
        certificate,
    }
}

/// Issue `subject_key`'s certificate signed by `issuer`, without going
/// through [`FakeCryptoBackend::issue_certificate`] (handy for test setup
/// that doesn't want to thread an `async` call through).
pub fn issue(
    subject_public_key: &[u8],
    issuer: &KeyPair,
    valid_until: time::OffsetDateTime,
) -> Certificate {
    let subject_address = PrivateAddress(hex::encode(Sha256::digest(subject_public_key)));
    Certificate {
        serialized: subject_public_key.to_vec(),
        subject_private_address: subject_address,
        issuer_private_address: issuer.certificate.subject_private_address.clone(),
        valid_from: time::OffsetDateTime::now_utc() - time::Duration::minutes(5),
        valid_until,
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct FakeCargoEnvelope {
    ciphertext: Vec<u8>,
    signature: DetachedSignature,
}

#[derive(Default)]
pub struct FakeCryptoBackend;

impl FakeCryptoBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl super::NodeCryptoBackend for FakeCryptoBackend {
    async fn sign_detached(&self, payload: &[u8], signer: &KeyPair) -> Result<DetachedSignature> {
        let mut signature = signer.private_key.0.clone();
        signature.extend_from_slice(&Sha256::digest(payload));
        Ok(DetachedSignature {
            signature,
            signer_certificate: signer.certificate.clone(),
        })
    }

    async fn verify_detached(
        &self,
        payload: &[u8],
        signature: &DetachedSignature,
        trust_anchors: &[Certificate],
    ) -> Result<PrivateAddress> {
        let signer_cert = &signature.signer_certificate;
        if !signer_cert.is_valid_at(std::time::SystemTime::now()) {
            return Err(GatewayError::Crypto("signer certificate expired".into()));
        }

        let chains = trust_anchors.iter().any(|anchor| {
            anchor.subject_private_address == signer_cert.subject_private_address
                || anchor.subject_private_address == signer_cert.issuer_private_address
        });
        if !chains {
            return Err(GatewayError::Crypto(
                "signer certificate does not chain to any trust anchor".into(),
            ));
        }

        let key_len = signature.signature.len().saturating_sub(32);
        let (key_bytes, digest) = signature.signature.split_at(key_len);
        if digest != Sha256::digest(payload).as_slice() {
            return Err(GatewayError::Crypto("signature does not match payload".into()));
        }
        let private_key = PrivateKeyHandle(key_bytes.to_vec());
        if private_address_of(&private_key) != signer_cert.subject_private_address {
            return Err(GatewayError::Crypto(
                "signature key does not match signer certificate".into(),
            ));
        }

        Ok(signer_cert.subject_private_address.clone())
    }

    async fn issue_certificate(
        &self,
        subject_public_key: &[u8],
        issuer: &KeyPair,
        valid_until: time::OffsetDateTime,
    ) -> Result<Certificate> {
        Ok(issue(subject_public_key, issuer, valid_until))
    }

    async fn encrypt_to(&self, plaintext: &[u8], recipient: &Certificate) -> Result<Vec<u8>> {
        let marker = recipient.subject_private_address.0.as_bytes();
        let mut out = Vec::with_capacity(2 + marker.len() + plaintext.len());
        out.extend_from_slice(&(marker.len() as u16).to_be_bytes());
        out.extend_from_slice(marker);
        out.extend_from_slice(plaintext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8], recipient_key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        if ciphertext.len() < 2 {
            return Err(GatewayError::Crypto("ciphertext too short".into()));
        }
        let marker_len = u16::from_be_bytes([ciphertext[0], ciphertext[1]]) as usize;
        let rest = &ciphertext[2..];
        if rest.len() < marker_len {
            return Err(GatewayError::Crypto("truncated ciphertext marker".into()));
        }
        let (marker, plaintext) = rest.split_at(marker_len);
        let expected = private_address_of(recipient_key);
        if marker != expected.0.as_bytes() {
            return Err(GatewayError::Crypto(
                "ciphertext is not addressed to this key".into(),
            ));
        }
        Ok(plaintext.to_vec())
    }

    async fn pack_cargo(
        &self,
        message_set: &CargoMessageSet,
        signer: &KeyPair,
        recipient_address: NodeAddress,
        recipient_certificate: &Certificate,
        creation_date: time::OffsetDateTime,
        ttl: time::Duration,
    ) -> Result<Cargo> {
        let plaintext = serde_json::to_vec(message_set)
            .map_err(|e| GatewayError::Crypto(format!("cargo message set encoding: {e}")))?;
        let ciphertext = self.encrypt_to(&plaintext, recipient_certificate).await?;
        let signature = self.sign_detached(&ciphertext, signer).await?;
        let envelope = FakeCargoEnvelope { ciphertext, signature };
        let serialized = serde_json::to_vec(&envelope)
            .map_err(|e| GatewayError::Crypto(format!("cargo envelope encoding: {e}")))?;
        Ok(Cargo {
            serialized,
            sender_certificate_chain: vec![signer.certificate.clone()],
            recipient: recipient_address,
            creation_date,
            ttl,
        })
    }

    async fn unpack_cargo(
        &self,
        cargo: &Cargo,
        trust_anchors: &[Certificate],
        recipient_key: &PrivateKeyHandle,
    ) -> Result<CargoMessageSet> {
        let envelope: FakeCargoEnvelope = serde_json::from_slice(&cargo.serialized)
            .map_err(|e| GatewayError::Crypto(format!("cargo envelope decoding: {e}")))?;
        self.verify_detached(&envelope.ciphertext, &envelope.signature, trust_anchors)
            .await?;
        let plaintext = self.decrypt(&envelope.ciphertext, recipient_key).await?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| GatewayError::Crypto(format!("cargo message set decoding: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NodeCryptoBackend;
    use crate::model::{CargoMessage, ParcelCollectionAck};

    fn far_future() -> time::OffsetDateTime {
        time::OffsetDateTime::now_utc() + time::Duration::days(30)
    }

    #[tokio::test]
    async fn sign_then_verify_round_trips() {
        let backend = FakeCryptoBackend::new();
        let signer = generate_self_issued(far_future());
        let signature = backend.sign_detached(b"nonce", &signer).await.unwrap();
        let verified = backend
            .verify_detached(b"nonce", &signature, &[signer.certificate.clone()])
            .await
            .unwrap();
        assert_eq!(verified, signer.certificate.subject_private_address);
    }

    #[tokio::test]
    async fn verify_rejects_tampered_payload() {
        let backend = FakeCryptoBackend::new();
        let signer = generate_self_issued(far_future());
        let signature = backend.sign_detached(b"nonce", &signer).await.unwrap();
        let err = backend
            .verify_detached(b"different", &signature, &[signer.certificate.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Crypto(_)));
    }

    #[tokio::test]
    async fn verify_rejects_untrusted_signer() {
        let backend = FakeCryptoBackend::new();
        let signer = generate_self_issued(far_future());
        let other = generate_self_issued(far_future());
        let signature = backend.sign_detached(b"nonce", &signer).await.unwrap();
        let err = backend
            .verify_detached(b"nonce", &signature, &[other.certificate])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Crypto(_)));
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trips() {
        let backend = FakeCryptoBackend::new();
        let recipient = generate_self_issued(far_future());
        let ciphertext = backend
            .encrypt_to(b"hello parcel", &recipient.certificate)
            .await
            .unwrap();
        let plaintext = backend.decrypt(&ciphertext, &recipient.private_key).await.unwrap();
        assert_eq!(plaintext, b"hello parcel");
    }

    #[tokio::test]
    async fn decrypt_rejects_wrong_key() {
        let backend = FakeCryptoBackend::new();
        let recipient = generate_self_issued(far_future());
        let impostor = generate_self_issued(far_future());
        let ciphertext = backend
            .encrypt_to(b"hello parcel", &recipient.certificate)
            .await
            .unwrap();
        let err = backend.decrypt(&ciphertext, &impostor.private_key).await.unwrap_err();
        assert!(matches!(err, GatewayError::Crypto(_)));
    }

    #[tokio::test]
    async fn pack_then_unpack_cargo_round_trips() {
        let backend = FakeCryptoBackend::new();
        let sender = generate_self_issued(far_future());
        let recipient = generate_self_issued(far_future());
        let message_set = CargoMessageSet {
            messages: vec![CargoMessage::CollectionAck(ParcelCollectionAck {
                sender_private_address: "abc".into(),
                recipient_address: NodeAddress::PublicInternet("https://example".into()),
                parcel_id: "p1".into(),
            })],
        };
        let cargo = backend
            .pack_cargo(
                &message_set,
                &sender,
                NodeAddress::PublicInternet("https://pgw.example".into()),
                &recipient.certificate,
                time::OffsetDateTime::now_utc(),
                time::Duration::days(14),
            )
            .await
            .unwrap();

        let unpacked = backend
            .unpack_cargo(&cargo, &[sender.certificate], &recipient.private_key)
            .await
            .unwrap();
        assert_eq!(unpacked.messages.len(), 1);
    }
}
