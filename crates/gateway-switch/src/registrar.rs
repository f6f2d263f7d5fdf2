//! Pre-register → register round-trip against a public gateway (§4.7).
//!
//! The PoWeb transport itself is an external collaborator (§1); this module
//! only names the two RPCs it exposes and drives the round-trip, persisting
//! state only after both legs succeed (§7 "no partial state is committed").

use async_trait::async_trait;
use gateway_core::constants::{config_keys, DEFAULT_PUBLIC_GATEWAY};
use gateway_core::crypto::{KeyPair, NodeCryptoBackend};
use gateway_core::error::GatewayError;
use gateway_core::model::Certificate;
use gateway_core::store::{ConfigStore, KeyStore};

/// A `PrivateNodeRegistrationRequest` (§4.7 step 4): our public key plus the
/// opaque authorization the public gateway handed us in the pre-register
/// leg.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct PrivateNodeRegistrationRequest {
    pub public_key: Vec<u8>,
    pub registration_authorization: Vec<u8>,
}

/// The signed wire form of a [`PrivateNodeRegistrationRequest`], as handed
/// to [`PoWebClient::register_node`].
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct SignedRegistrationRequest {
    pub request: PrivateNodeRegistrationRequest,
    pub signature: gateway_core::model::DetachedSignature,
}

/// The result of a successful registration round-trip (§4.7 step 5).
pub struct PrivateNodeRegistration {
    pub private_node_certificate: Certificate,
    pub public_gateway_identity_certificate: Certificate,
}

/// Network error surfaced by a [`PoWebClient`] call. Kept separate from
/// [`GatewayError`] so the registrar can uniformly fold every failure mode
/// (network, crypto, store) into [`GatewayError::Registration`] at its own
/// boundary (§7).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PoWebError(pub String);

/// The two RPCs this crate needs from a PoWeb client (§6).
#[async_trait]
pub trait PoWebClient: Send + Sync {
    async fn pre_register_node(&self, public_key: &[u8]) -> Result<Vec<u8>, PoWebError>;
    async fn register_node(&self, signed_request: &[u8]) -> Result<PrivateNodeRegistration, PoWebError>;
}

/// Resolves a [`PoWebClient`] for a given public gateway address. DNS/SRV
/// resolution is delegated to the implementation (§4.7 step 2).
#[async_trait]
pub trait PoWebClientFactory: Send + Sync {
    async fn connect(&self, public_address: &str) -> Result<Box<dyn PoWebClient>, PoWebError>;
}

fn registration_err(detail: impl std::fmt::Display) -> GatewayError {
    GatewayError::Registration(detail.to_string())
}

pub struct Registrar<'a> {
    pub client_factory: &'a dyn PoWebClientFactory,
    pub config_store: &'a dyn ConfigStore,
    pub key_store: &'a dyn KeyStore,
    pub crypto: &'a dyn NodeCryptoBackend,
}

impl<'a> Registrar<'a> {
    pub fn new(
        client_factory: &'a dyn PoWebClientFactory,
        config_store: &'a dyn ConfigStore,
        key_store: &'a dyn KeyStore,
        crypto: &'a dyn NodeCryptoBackend,
    ) -> Self {
        Self {
            client_factory,
            config_store,
            key_store,
            crypto,
        }
    }

    /// Register with `public_address`, or return immediately if we're
    /// already registered with it (§4.7, idempotent — no network round-trip
    /// on the idempotent path, per §8 property 4 / S6).
    pub async fn register(&self, public_address: &str) -> Result<(), GatewayError> {
        let current = self
            .config_store
            .get(config_keys::PUBLIC_GATEWAY_ADDRESS)
            .await?;
        if current.as_deref() == Some(public_address) {
            tracing::debug!(public_address, "already registered, skipping network round-trip");
            return Ok(());
        }

        let client = self
            .client_factory
            .connect(public_address)
            .await
            .map_err(registration_err)?;

        let (private_key, node_certificate) = self.key_store.get_current_key().await?;

        let authorization = client
            .pre_register_node(&node_certificate.serialized)
            .await
            .map_err(registration_err)?;

        let request = PrivateNodeRegistrationRequest {
            public_key: node_certificate.serialized.clone(),
            registration_authorization: authorization,
        };
        let request_bytes =
            serde_json::to_vec(&request).map_err(|e| registration_err(format!("request encoding: {e}")))?;
        let signer = KeyPair {
            private_key: private_key.clone(),
            certificate: node_certificate.clone(),
        };
        let signature = self
            .crypto
            .sign_detached(&request_bytes, &signer)
            .await
            .map_err(registration_err)?;
        let signed = SignedRegistrationRequest { request, signature };
        let signed_bytes =
            serde_json::to_vec(&signed).map_err(|e| registration_err(format!("signed request encoding: {e}")))?;

        let registration = client
            .register_node(&signed_bytes)
            .await
            .map_err(registration_err)?;

        // Everything above only read external state; only now do we commit,
        // and only because the full round-trip succeeded (§7).
        self.key_store
            .save_node_key(private_key, registration.private_node_certificate)
            .await?;
        self.key_store
            .save_public_gateway_certificate(registration.public_gateway_identity_certificate)
            .await?;
        self.config_store
            .set(config_keys::PUBLIC_GATEWAY_ADDRESS, public_address.to_owned())
            .await?;

        tracing::info!(public_address, "registered with public gateway");
        Ok(())
    }

    /// Register with [`DEFAULT_PUBLIC_GATEWAY`] only if no public gateway
    /// address has ever been persisted (§4.7).
    pub async fn register_if_unregistered(&self) -> Result<(), GatewayError> {
        let existing = self
            .config_store
            .get(config_keys::PUBLIC_GATEWAY_ADDRESS)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        self.register(DEFAULT_PUBLIC_GATEWAY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::crypto::testutil::{generate_self_issued, FakeCryptoBackend};
    use gateway_core::store::testutil::{InMemoryConfigStore, InMemoryKeyStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn far_future() -> time::OffsetDateTime {
        time::OffsetDateTime::now_utc() + time::Duration::days(30)
    }

    struct CountingClient {
        public_gw: KeyPair,
    }

    #[async_trait]
    impl PoWebClient for CountingClient {
        async fn pre_register_node(&self, _public_key: &[u8]) -> Result<Vec<u8>, PoWebError> {
            Ok(b"authorization-blob".to_vec())
        }

        async fn register_node(&self, _signed_request: &[u8]) -> Result<PrivateNodeRegistration, PoWebError> {
            Ok(PrivateNodeRegistration {
                private_node_certificate: self.public_gw.certificate.clone(),
                public_gateway_identity_certificate: self.public_gw.certificate.clone(),
            })
        }
    }

    struct CountingFactory {
        connects: AtomicUsize,
        public_gw: KeyPair,
    }

    #[async_trait]
    impl PoWebClientFactory for CountingFactory {
        async fn connect(&self, _public_address: &str) -> Result<Box<dyn PoWebClient>, PoWebError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingClient {
                public_gw: self.public_gw.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn register_persists_certificate_and_address() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone());
        let config_store = InMemoryConfigStore::new();
        let crypto = FakeCryptoBackend::new();
        let factory = CountingFactory {
            connects: AtomicUsize::new(0),
            public_gw: public_gw.clone(),
        };

        let registrar = Registrar::new(&factory, &config_store, &key_store, &crypto);
        registrar.register("gw.example").await.unwrap();

        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
        assert_eq!(
            config_store
                .get(config_keys::PUBLIC_GATEWAY_ADDRESS)
                .await
                .unwrap()
                .as_deref(),
            Some("gw.example")
        );
        assert_eq!(
            key_store.get_public_gateway_certificate().await.unwrap(),
            Some(public_gw.certificate)
        );
    }

    #[tokio::test]
    async fn register_is_idempotent_for_the_same_address() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone());
        let config_store = InMemoryConfigStore::seeded([(config_keys::PUBLIC_GATEWAY_ADDRESS, "gw.example")]);
        let crypto = FakeCryptoBackend::new();
        let factory = CountingFactory {
            connects: AtomicUsize::new(0),
            public_gw,
        };

        let registrar = Registrar::new(&factory, &config_store, &key_store, &crypto);
        registrar.register("gw.example").await.unwrap();
        registrar.register("gw.example").await.unwrap();

        assert_eq!(factory.connects.load(Ordering::SeqCst), 0, "S6: factory never invoked");
    }

    #[tokio::test]
    async fn register_if_unregistered_falls_back_to_default() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone());
        let config_store = InMemoryConfigStore::new();
        let crypto = FakeCryptoBackend::new();
        let factory = CountingFactory {
            connects: AtomicUsize::new(0),
            public_gw,
        };

        let registrar = Registrar::new(&factory, &config_store, &key_store, &crypto);
        registrar.register_if_unregistered().await.unwrap();

        assert_eq!(
            config_store
                .get(config_keys::PUBLIC_GATEWAY_ADDRESS)
                .await
                .unwrap()
                .as_deref(),
            Some(gateway_core::constants::DEFAULT_PUBLIC_GATEWAY)
        );
    }

    #[tokio::test]
    async fn register_if_unregistered_is_a_no_op_once_registered() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone());
        let config_store = InMemoryConfigStore::seeded([(config_keys::PUBLIC_GATEWAY_ADDRESS, "gw.example")]);
        let crypto = FakeCryptoBackend::new();
        let factory = CountingFactory {
            connects: AtomicUsize::new(0),
            public_gw,
        };

        let registrar = Registrar::new(&factory, &config_store, &key_store, &crypto);
        registrar.register_if_unregistered().await.unwrap();

        assert_eq!(factory.connects.load(Ordering::SeqCst), 0);
    }
}
