//! Two-phase collect/deliver exchange with a courier (§4.8).
//!
//! The CogRPC transport and default-gateway discovery are external
//! collaborators (§1); this module names them as traits so the phase logic
//! itself is unit-testable without real network I/O. Process supervision —
//! the fact that a real deployment runs this as a subprocess and maps its
//! outcome to an exit code — is likewise out of scope (§1); [`SyncOutcome`]
//! is the in-process stand-in for that exit code.

use std::net::Ipv4Addr;

use futures::stream::BoxStream;
use futures_util::StreamExt;
use gateway_core::constants::{self, config_keys};
use gateway_core::crypto::{KeyPair, NodeCryptoBackend};
use gateway_core::error::GatewayError;
use gateway_core::model::{
    Cargo, CargoCollectionAuthorization, CargoCollectionRequest, CargoMessage, CargoMessageSet,
    Certificate, NodeAddress, Parcel, ParcelDirection, PrivateKeyHandle, TaggedCargoMessage,
};
use gateway_core::store::{ConfigStore, KeyStore, ParcelStore};
use uuid::Uuid;

use crate::stage::{CourierSyncStage, StageNotifier};

/// Transport/discovery failure surfaced by a [`DefaultGatewayDiscovery`] or
/// [`CogRpcClient`] call.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CourierTransportError(pub String);

/// Locates the courier behind the local device's default network gateway.
#[async_trait::async_trait]
pub trait DefaultGatewayDiscovery: Send + Sync {
    async fn discover_default_gateway_ipv4(&self) -> Result<Ipv4Addr, CourierTransportError>;
}

/// Client role of the courier channel (§6): collect cargoes the public
/// gateway is holding for us, then deliver cargoes we've packed.
#[async_trait::async_trait]
pub trait CogRpcClient: Send + Sync {
    async fn collect_cargo(&self, cca: Vec<u8>) -> Result<BoxStream<'static, Vec<u8>>, CourierTransportError>;

    async fn deliver_cargo(
        &self,
        cargoes: BoxStream<'static, (Vec<u8>, String)>,
    ) -> Result<BoxStream<'static, String>, CourierTransportError>;

    async fn close(&self) -> Result<(), CourierTransportError>;
}

#[async_trait::async_trait]
pub trait CogRpcClientFactory: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn CogRpcClient>, CourierTransportError>;
}

/// In-process stand-in for the subprocess exit codes named in §4.8's table.
/// A real entry point maps these 1:1 onto `std::process::exit` codes; that
/// mapping itself lives outside this crate (§1 process supervision).
#[derive(Debug)]
pub enum SyncOutcome {
    /// Exit code 0.
    Ok,
    /// Exit code 1.
    UnregisteredGateway,
    /// Exit code 2.
    FailedSync(GatewayError),
}

pub struct CourierSyncDriver<'a> {
    pub parcel_store: &'a dyn ParcelStore,
    pub key_store: &'a dyn KeyStore,
    pub config_store: &'a dyn ConfigStore,
    pub crypto: &'a dyn NodeCryptoBackend,
    pub discovery: &'a dyn DefaultGatewayDiscovery,
    pub client_factory: &'a dyn CogRpcClientFactory,
    pub stage_notifier: &'a dyn StageNotifier,
}

impl<'a> CourierSyncDriver<'a> {
    /// Run a full collect/deliver sync. Closes the CogRPC client on every
    /// exit path (§4.8 Teardown).
    pub async fn run(&self) -> SyncOutcome {
        let public_gateway_address = match self.config_store.get(config_keys::PUBLIC_GATEWAY_ADDRESS).await {
            Ok(Some(addr)) => addr,
            Ok(None) => return SyncOutcome::UnregisteredGateway,
            Err(e) => return SyncOutcome::FailedSync(e),
        };

        let default_gateway_ip = match self.discovery.discover_default_gateway_ipv4().await {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!(error = %e, "could not discover default gateway");
                return SyncOutcome::FailedSync(GatewayError::DisconnectedFromCourier(e.to_string()));
            }
        };

        let client = match self
            .client_factory
            .connect(&format!("https://{default_gateway_ip}:{}", constants::COURIER_PORT))
            .await
        {
            Ok(client) => client,
            Err(e) => return SyncOutcome::FailedSync(GatewayError::DisconnectedFromCourier(e.to_string())),
        };

        let result = self.run_phases(client.as_ref(), &public_gateway_address).await;
        if let Err(e) = client.close().await {
            tracing::warn!(error = %e, "error closing courier client");
        }

        match result {
            Ok(()) => SyncOutcome::Ok,
            Err(e) => SyncOutcome::FailedSync(e),
        }
    }

    async fn run_phases(&self, client: &dyn CogRpcClient, public_gateway_address: &str) -> Result<(), GatewayError> {
        self.collect(client).await?;

        self.stage_notifier.notify(CourierSyncStage::Wait).await;
        tokio::time::sleep(std::time::Duration::from_secs(
            constants::DELAY_BETWEEN_COLLECTION_AND_DELIVERY_SECONDS,
        ))
        .await;

        self.deliver(client, public_gateway_address).await
    }

    async fn collect(&self, client: &dyn CogRpcClient) -> Result<(), GatewayError> {
        self.stage_notifier.notify(CourierSyncStage::Collection).await;

        let public_gateway_certificate = self
            .key_store
            .get_public_gateway_certificate()
            .await?
            .ok_or(GatewayError::UnregisteredGateway)?;

        let cca = self.build_cca(&public_gateway_certificate).await?;
        let cca_bytes =
            serde_json::to_vec(&cca).map_err(|e| GatewayError::Crypto(format!("CCA encoding: {e}")))?;

        let mut inbound = client
            .collect_cargo(cca_bytes)
            .await
            .map_err(|e| GatewayError::DisconnectedFromCourier(e.to_string()))?;

        let node_certificates = self.key_store.fetch_node_certificates().await?;
        let self_issued_trust_anchors: Vec<Certificate> = node_certificates
            .into_iter()
            .filter(Certificate::is_self_issued)
            .collect();
        let (node_private_key, _) = self.key_store.get_current_key().await?;

        while let Some(cargo_bytes) = inbound.next().await {
            self.ingest_cargo(&cargo_bytes, &self_issued_trust_anchors, &node_private_key).await;
        }

        Ok(())
    }

    async fn build_cca(&self, public_gateway_certificate: &Certificate) -> Result<CargoCollectionAuthorization, GatewayError> {
        let now = time::OffsetDateTime::now_utc();
        let creation_date = now - time::Duration::minutes(constants::CLOCK_DRIFT_TOLERANCE_MINUTES);
        let expiry_date = now + time::Duration::days(constants::OUTBOUND_CARGO_TTL_DAYS);

        let (cca_issuer_key, cca_issuer_certificate) = self.key_store.get_or_create_cca_issuer().await?;
        let issuer = KeyPair {
            private_key: cca_issuer_key,
            certificate: cca_issuer_certificate,
        };
        let cargo_delivery_authorization = self
            .crypto
            .issue_certificate(&public_gateway_certificate.serialized, &issuer, expiry_date)
            .await?;

        let request = CargoCollectionRequest {
            cargo_delivery_authorization,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| GatewayError::Crypto(format!("CCA payload encoding: {e}")))?;
        let ciphertext = self.crypto.encrypt_to(&payload, public_gateway_certificate).await?;
        let signature = self.crypto.sign_detached(&ciphertext, &issuer).await?;

        Ok(CargoCollectionAuthorization {
            serialized: ciphertext,
            signature,
            creation_date,
            expiry_date,
        })
    }

    async fn ingest_cargo(
        &self,
        cargo_bytes: &[u8],
        trust_anchors: &[Certificate],
        node_private_key: &PrivateKeyHandle,
    ) {
        let cargo: Cargo = match serde_json::from_slice(cargo_bytes) {
            Ok(cargo) => cargo,
            Err(e) => {
                tracing::info!(error = %e, "dropping malformed cargo");
                return;
            }
        };

        let message_set = match self.crypto.unpack_cargo(&cargo, trust_anchors, node_private_key).await {
            Ok(set) => set,
            Err(e) => {
                tracing::info!(error = %e, "dropping cargo that failed to unpack");
                return;
            }
        };

        for message in message_set.messages {
            match message {
                CargoMessage::Parcel(parcel) => {
                    if !is_valid_private_recipient(&parcel) {
                        tracing::debug!("skipping parcel with non-private or unauthenticated recipient");
                        continue;
                    }
                    if let Err(e) = self
                        .parcel_store
                        .store_endpoint_bound(parcel.serialized.clone(), &parcel)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to store endpoint-bound parcel");
                    }
                }
                CargoMessage::CollectionAck(ack) => {
                    // Only one public gateway is ever in play per session
                    // (§1 Non-goals), so every PCA received here applies.
                    if let Err(e) = self.parcel_store.delete_internet_bound_from_ack(&ack).await {
                        tracing::warn!(error = %e, "failed to delete Internet-bound parcel from PCA");
                    }
                }
            }
        }
    }

    async fn deliver(&self, client: &dyn CogRpcClient, public_gateway_address: &str) -> Result<(), GatewayError> {
        self.stage_notifier.notify(CourierSyncStage::Delivery).await;

        let public_gateway_certificate = self
            .key_store
            .get_public_gateway_certificate()
            .await?
            .ok_or(GatewayError::UnregisteredGateway)?;

        let mut tagged_messages = Vec::new();
        let mut pending_acks = self.parcel_store.list_pending_collection_acks();
        while let Some((ack, expiry_date)) = pending_acks.next().await {
            tagged_messages.push(TaggedCargoMessage {
                message: CargoMessage::CollectionAck(ack),
                expiry_date,
            });
        }

        let mut internet_bound = self.parcel_store.list_internet_bound();
        let now = time::OffsetDateTime::now_utc();
        while let Some((key, expiry_date)) = internet_bound.next().await {
            let Some(bytes) = self.parcel_store.retrieve(&key, ParcelDirection::TowardsInternet).await? else {
                tracing::debug!("Internet-bound parcel raced deletion, skipping");
                continue;
            };
            let ttl = expiry_date - now;
            if ttl.is_negative() {
                tracing::debug!("Internet-bound parcel already expired, skipping");
                continue;
            }
            // The parcel's own id and sender chain were assigned when it was
            // first queued by whatever ingested it from the local endpoint
            // (out of scope, §1); the store only exposes its key and expiry,
            // so the key doubles as the wire id here.
            let parcel = Parcel {
                id: key.0.clone(),
                serialized: bytes,
                sender_certificate_chain: Vec::new(),
                recipient: NodeAddress::PublicInternet(public_gateway_address.to_owned()),
                creation_date: now,
                ttl,
            };
            tagged_messages.push(TaggedCargoMessage {
                message: CargoMessage::Parcel(parcel),
                expiry_date,
            });
        }

        if tagged_messages.is_empty() {
            tracing::debug!("nothing to deliver this sync");
            return Ok(());
        }

        let (node_private_key, node_certificate) = self.key_store.get_current_key().await?;
        let signer = KeyPair {
            private_key: node_private_key,
            certificate: node_certificate,
        };
        let message_set = CargoMessageSet {
            messages: tagged_messages.iter().map(|t| t.message.clone()).collect(),
        };
        let cargo = self
            .crypto
            .pack_cargo(
                &message_set,
                &signer,
                NodeAddress::PublicInternet(public_gateway_address.to_owned()),
                &public_gateway_certificate,
                now,
                time::Duration::days(constants::OUTBOUND_CARGO_TTL_DAYS),
            )
            .await?;

        let cargo_bytes = serde_json::to_vec(&cargo).map_err(|e| GatewayError::Crypto(format!("cargo encoding: {e}")))?;
        let local_id = Uuid::new_v4().to_string();
        let outbound = futures::stream::once(async move { (cargo_bytes, local_id) }).boxed();

        let mut acks = client
            .deliver_cargo(outbound)
            .await
            .map_err(|e| GatewayError::DisconnectedFromCourier(e.to_string()))?;
        while let Some(ack_id) = acks.next().await {
            tracing::info!(ack_id, "courier acknowledged cargo delivery");
        }

        for tagged in &tagged_messages {
            if let CargoMessage::CollectionAck(ack) = &tagged.message {
                if let Err(e) = self.parcel_store.delete_collection_ack(ack).await {
                    tracing::warn!(error = %e, "failed to delete delivered PCA");
                }
            }
        }

        Ok(())
    }
}

/// §4.8 Collect step 4.d: a parcel is only accepted if it is addressed to a
/// private (local) recipient and carries at least one sender certificate.
/// Chain validation itself is the crypto backend's job during
/// `unpack_cargo`; this only checks the shape the spec names explicitly.
fn is_valid_private_recipient(parcel: &Parcel) -> bool {
    matches!(parcel.recipient, NodeAddress::Private(_)) && !parcel.sender_certificate_chain.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::crypto::testutil::{generate_self_issued, FakeCryptoBackend};
    use gateway_core::model::ParcelCollectionAck;
    use gateway_core::store::testutil::{InMemoryConfigStore, InMemoryKeyStore, InMemoryParcelStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn far_future() -> time::OffsetDateTime {
        time::OffsetDateTime::now_utc() + time::Duration::days(30)
    }

    struct CountingDiscovery {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DefaultGatewayDiscovery for CountingDiscovery {
        async fn discover_default_gateway_ipv4(&self) -> Result<Ipv4Addr, CourierTransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Ipv4Addr::new(10, 0, 0, 1))
        }
    }

    struct RecordingNotifier {
        stages: Mutex<Vec<CourierSyncStage>>,
    }

    #[async_trait::async_trait]
    impl StageNotifier for RecordingNotifier {
        async fn notify(&self, stage: CourierSyncStage) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    struct FakeClient {
        inbound: Mutex<Option<Vec<Vec<u8>>>>,
        delivered: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl CogRpcClient for FakeClient {
        async fn collect_cargo(&self, _cca: Vec<u8>) -> Result<BoxStream<'static, Vec<u8>>, CourierTransportError> {
            let items = self.inbound.lock().unwrap().take().unwrap_or_default();
            Ok(futures::stream::iter(items).boxed())
        }

        async fn deliver_cargo(
            &self,
            mut cargoes: BoxStream<'static, (Vec<u8>, String)>,
        ) -> Result<BoxStream<'static, String>, CourierTransportError> {
            let mut ack_ids = Vec::new();
            while let Some((bytes, local_id)) = cargoes.next().await {
                self.delivered.lock().unwrap().push(bytes);
                ack_ids.push(local_id);
            }
            Ok(futures::stream::iter(ack_ids).boxed())
        }

        async fn close(&self) -> Result<(), CourierTransportError> {
            Ok(())
        }
    }

    struct FakeClientFactory {
        client: std::sync::Arc<FakeClient>,
    }

    #[async_trait::async_trait]
    impl CogRpcClientFactory for FakeClientFactory {
        async fn connect(&self, _address: &str) -> Result<Box<dyn CogRpcClient>, CourierTransportError> {
            Ok(Box::new(FakeClientShim(self.client.clone())))
        }
    }

    struct FakeClientShim(std::sync::Arc<FakeClient>);

    #[async_trait::async_trait]
    impl CogRpcClient for FakeClientShim {
        async fn collect_cargo(&self, cca: Vec<u8>) -> Result<BoxStream<'static, Vec<u8>>, CourierTransportError> {
            self.0.collect_cargo(cca).await
        }
        async fn deliver_cargo(
            &self,
            cargoes: BoxStream<'static, (Vec<u8>, String)>,
        ) -> Result<BoxStream<'static, String>, CourierTransportError> {
            self.0.deliver_cargo(cargoes).await
        }
        async fn close(&self) -> Result<(), CourierTransportError> {
            self.0.close().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_gateway_short_circuits_before_discovery() {
        let node = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key, node.certificate);
        let config_store = InMemoryConfigStore::new();
        let parcel_store = InMemoryParcelStore::new();
        let crypto = FakeCryptoBackend::new();
        let discovery = CountingDiscovery {
            calls: AtomicUsize::new(0),
        };
        let client = std::sync::Arc::new(FakeClient {
            inbound: Mutex::new(None),
            delivered: Mutex::new(Vec::new()),
        });
        let client_factory = FakeClientFactory { client };
        let notifier = RecordingNotifier {
            stages: Mutex::new(Vec::new()),
        };

        let driver = CourierSyncDriver {
            parcel_store: &parcel_store,
            key_store: &key_store,
            config_store: &config_store,
            crypto: &crypto,
            discovery: &discovery,
            client_factory: &client_factory,
            stage_notifier: &notifier,
        };

        let outcome = driver.run().await;
        assert!(matches!(outcome, SyncOutcome::UnregisteredGateway));
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 0);
        assert!(notifier.stages.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_sync_notifies_stages_in_order_and_delivers_parcel() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let cca_issuer = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone())
            .with_public_gateway_certificate(public_gw.certificate.clone())
            .with_cca_issuer(cca_issuer.private_key, cca_issuer.certificate);
        let config_store = InMemoryConfigStore::seeded([(config_keys::PUBLIC_GATEWAY_ADDRESS, "gw.example")]);
        let parcel_store = InMemoryParcelStore::new();
        parcel_store.seed_internet_bound(
            "parcel-1",
            b"towards-internet payload".to_vec(),
            far_future(),
        );
        let crypto = FakeCryptoBackend::new();
        let discovery = CountingDiscovery {
            calls: AtomicUsize::new(0),
        };
        let client = std::sync::Arc::new(FakeClient {
            inbound: Mutex::new(Some(Vec::new())),
            delivered: Mutex::new(Vec::new()),
        });
        let client_factory = FakeClientFactory { client: client.clone() };
        let notifier = RecordingNotifier {
            stages: Mutex::new(Vec::new()),
        };

        let driver = CourierSyncDriver {
            parcel_store: &parcel_store,
            key_store: &key_store,
            config_store: &config_store,
            crypto: &crypto,
            discovery: &discovery,
            client_factory: &client_factory,
            stage_notifier: &notifier,
        };

        let outcome = driver.run().await;
        assert!(matches!(outcome, SyncOutcome::Ok), "{outcome:?}");
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *notifier.stages.lock().unwrap(),
            vec![
                CourierSyncStage::Collection,
                CourierSyncStage::Wait,
                CourierSyncStage::Delivery,
            ]
        );
        assert_eq!(client.delivered.lock().unwrap().len(), 1, "one cargo should have been delivered");
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_collection_ack_deletes_internet_bound_parcel() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let cca_issuer = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone())
            .with_public_gateway_certificate(public_gw.certificate.clone())
            .with_cca_issuer(cca_issuer.private_key, cca_issuer.certificate);
        let config_store = InMemoryConfigStore::seeded([(config_keys::PUBLIC_GATEWAY_ADDRESS, "gw.example")]);
        let parcel_store = InMemoryParcelStore::new();
        parcel_store.seed_internet_bound("parcel-1", b"payload".to_vec(), far_future());
        assert_eq!(parcel_store.internet_bound_len(), 1);

        let crypto = FakeCryptoBackend::new();
        let message_set = CargoMessageSet {
            messages: vec![CargoMessage::CollectionAck(ParcelCollectionAck {
                sender_private_address: "endpoint-1".into(),
                recipient_address: NodeAddress::PublicInternet("gw.example".into()),
                parcel_id: "parcel-1".into(),
            })],
        };
        let cargo = crypto
            .pack_cargo(
                &message_set,
                &node,
                NodeAddress::Private("node".into()),
                &node.certificate,
                time::OffsetDateTime::now_utc(),
                time::Duration::days(1),
            )
            .await
            .unwrap();
        let cargo_bytes = serde_json::to_vec(&cargo).unwrap();

        let discovery = CountingDiscovery {
            calls: AtomicUsize::new(0),
        };
        let client = std::sync::Arc::new(FakeClient {
            inbound: Mutex::new(Some(vec![cargo_bytes])),
            delivered: Mutex::new(Vec::new()),
        });
        let client_factory = FakeClientFactory { client: client.clone() };
        let notifier = RecordingNotifier {
            stages: Mutex::new(Vec::new()),
        };

        let driver = CourierSyncDriver {
            parcel_store: &parcel_store,
            key_store: &key_store,
            config_store: &config_store,
            crypto: &crypto,
            discovery: &discovery,
            client_factory: &client_factory,
            stage_notifier: &notifier,
        };

        let outcome = driver.run().await;
        assert!(matches!(outcome, SyncOutcome::Ok), "{outcome:?}");
        assert_eq!(parcel_store.internet_bound_len(), 0, "PCA should have removed the Internet-bound parcel");
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn malformed_cargo_is_dropped_and_logged() {
        let node = generate_self_issued(far_future());
        let public_gw = generate_self_issued(far_future());
        let cca_issuer = generate_self_issued(far_future());
        let key_store = InMemoryKeyStore::new(node.private_key.clone(), node.certificate.clone())
            .with_public_gateway_certificate(public_gw.certificate.clone())
            .with_cca_issuer(cca_issuer.private_key, cca_issuer.certificate);
        let config_store = InMemoryConfigStore::seeded([(config_keys::PUBLIC_GATEWAY_ADDRESS, "gw.example")]);
        let parcel_store = InMemoryParcelStore::new();
        let crypto = FakeCryptoBackend::new();
        let discovery = CountingDiscovery {
            calls: AtomicUsize::new(0),
        };
        let client = std::sync::Arc::new(FakeClient {
            inbound: Mutex::new(Some(vec![b"not json".to_vec()])),
            delivered: Mutex::new(Vec::new()),
        });
        let client_factory = FakeClientFactory { client: client.clone() };
        let notifier = RecordingNotifier {
            stages: Mutex::new(Vec::new()),
        };

        let driver = CourierSyncDriver {
            parcel_store: &parcel_store,
            key_store: &key_store,
            config_store: &config_store,
            crypto: &crypto,
            discovery: &discovery,
            client_factory: &client_factory,
            stage_notifier: &notifier,
        };

        let outcome = driver.run().await;
        assert!(matches!(outcome, SyncOutcome::Ok), "{outcome:?}");
        assert!(tracing_test::logs_contain("dropping malformed cargo"));
    }
}
