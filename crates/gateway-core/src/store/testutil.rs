//! In-memory reference implementations of the store traits.
//!
//! These exist so the protocol logic in `gateway-switch` (and this crate's
//! own unit tests) can be exercised without a real database or blob store.
//! They are not persistent and make no attempt at production-grade
//! concurrency beyond what `dashmap` gives for free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;
use crate::model::{
    address::{NodeAddress, PrivateAddress},
    parcel::{Parcel, ParcelDirection, ParcelKey},
    pca::ParcelCollectionAck,
    Certificate, PrivateKeyHandle,
};

use super::{ConfigStore, KeyStore, ParcelStore};

struct StoredParcel {
    bytes: Vec<u8>,
    recipient_private_address: Option<PrivateAddress>,
    sender_private_address: Option<String>,
    parcel_id: String,
    expiry_date: time::OffsetDateTime,
}

struct Subscription {
    addresses: Vec<PrivateAddress>,
    sender: mpsc::UnboundedSender<ParcelKey>,
}

/// An in-memory [`ParcelStore`]. Endpoint-bound and Internet-bound parcels
/// live in separate maps, mirroring the direction tag's role as a second
/// half of the key (§3).
#[derive(Default)]
pub struct InMemoryParcelStore {
    endpoint_bound: DashMap<ParcelKey, StoredParcel>,
    internet_bound: DashMap<ParcelKey, StoredParcel>,
    next_key: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
    pending_acks: Mutex<Vec<(ParcelCollectionAck, time::OffsetDateTime)>>,
}

impl InMemoryParcelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_key(&self) -> ParcelKey {
        let n = self.next_key.fetch_add(1, Ordering::Relaxed);
        ParcelKey(format!("parcel-{n}"))
    }

    fn notify(&self, recipient: &PrivateAddress, key: &ParcelKey) {
        let subs = self.subscriptions.lock().unwrap();
        for sub in subs.iter() {
            if sub.addresses.contains(recipient) {
                let _ = sub.sender.unbounded_send(key.clone());
            }
        }
    }

    /// Seed a parcel bound for `recipient` directly, bypassing the
    /// courier-ingestion path real traffic would normally go through.
    pub fn seed_endpoint_bound(&self, recipient: PrivateAddress, bytes: Vec<u8>) -> ParcelKey {
        let key = self.mint_key();
        self.endpoint_bound.insert(
            key.clone(),
            StoredParcel {
                bytes,
                recipient_private_address: Some(recipient.clone()),
                sender_private_address: None,
                parcel_id: String::new(),
                expiry_date: time::OffsetDateTime::now_utc() + time::Duration::days(1),
            },
        );
        self.notify(&recipient, &key);
        key
    }

    /// Seed an Internet-bound parcel with an explicit `parcel_id`, so a
    /// later PCA can be matched back to it by id.
    pub fn seed_internet_bound(
        &self,
        parcel_id: impl Into<String>,
        bytes: Vec<u8>,
        expiry_date: time::OffsetDateTime,
    ) -> ParcelKey {
        let key = self.mint_key();
        self.internet_bound.insert(
            key.clone(),
            StoredParcel {
                bytes,
                recipient_private_address: None,
                sender_private_address: None,
                parcel_id: parcel_id.into(),
                expiry_date,
            },
        );
        key
    }

    pub fn endpoint_bound_len(&self) -> usize {
        self.endpoint_bound.len()
    }

    pub fn internet_bound_len(&self) -> usize {
        self.internet_bound.len()
    }

    pub fn pending_ack_len(&self) -> usize {
        self.pending_acks.lock().unwrap().len()
    }
}

#[async_trait]
impl ParcelStore for InMemoryParcelStore {
    fn stream_active_bound_for_endpoints(
        &self,
        endpoint_addresses: Vec<PrivateAddress>,
        keep_alive: bool,
    ) -> BoxStream<'static, ParcelKey> {
        let existing: Vec<ParcelKey> = self
            .endpoint_bound
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .recipient_private_address
                    .as_ref()
                    .is_some_and(|addr| endpoint_addresses.contains(addr))
            })
            .map(|entry| entry.key().clone())
            .collect();

        if !keep_alive {
            return stream::iter(existing).boxed();
        }

        let (tx, rx) = mpsc::unbounded();
        self.subscriptions.lock().unwrap().push(Subscription {
            addresses: endpoint_addresses,
            sender: tx,
        });
        stream::iter(existing).chain(rx).boxed()
    }

    async fn retrieve(&self, key: &ParcelKey, direction: ParcelDirection) -> Result<Option<Vec<u8>>> {
        let map = self.map_for(direction);
        Ok(map.get(key).map(|entry| entry.value().bytes.clone()))
    }

    async fn collection_ack_info(
        &self,
        key: &ParcelKey,
    ) -> Result<Option<(ParcelCollectionAck, time::OffsetDateTime)>> {
        let Some(entry) = self.endpoint_bound.get(key) else {
            return Ok(None);
        };
        let stored = entry.value();
        let Some(recipient) = &stored.recipient_private_address else {
            return Ok(None);
        };
        let ack = ParcelCollectionAck {
            sender_private_address: stored.sender_private_address.clone().unwrap_or_default(),
            recipient_address: NodeAddress::Private(recipient.0.clone()),
            parcel_id: stored.parcel_id.clone(),
        };
        Ok(Some((ack, stored.expiry_date)))
    }

    async fn delete(&self, key: &ParcelKey, direction: ParcelDirection) -> Result<()> {
        self.map_for(direction).remove(key);
        Ok(())
    }

    async fn store_endpoint_bound(&self, serialized: Vec<u8>, parcel: &Parcel) -> Result<ParcelKey> {
        let recipient = match &parcel.recipient {
            NodeAddress::Private(addr) => Some(PrivateAddress::from(addr.clone())),
            NodeAddress::PublicInternet(_) => None,
        };
        let sender_private_address = parcel
            .sender_certificate_chain
            .first()
            .map(|cert| cert.subject_private_address.0.clone());
        let key = self.mint_key();
        self.endpoint_bound.insert(
            key.clone(),
            StoredParcel {
                bytes: serialized,
                recipient_private_address: recipient.clone(),
                sender_private_address,
                parcel_id: parcel.id.clone(),
                expiry_date: parcel.expiry_date(),
            },
        );
        if let Some(recipient) = recipient {
            self.notify(&recipient, &key);
        }
        Ok(key)
    }

    fn list_internet_bound(&self) -> BoxStream<'static, (ParcelKey, time::OffsetDateTime)> {
        let items: Vec<_> = self
            .internet_bound
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().expiry_date))
            .collect();
        stream::iter(items).boxed()
    }

    async fn delete_internet_bound_from_ack(&self, ack: &ParcelCollectionAck) -> Result<()> {
        let matching_key = self
            .internet_bound
            .iter()
            .find(|entry| entry.value().parcel_id == ack.parcel_id)
            .map(|entry| entry.key().clone());
        if let Some(key) = matching_key {
            self.internet_bound.remove(&key);
        }
        Ok(())
    }

    async fn record_collection_ack(
        &self,
        ack: ParcelCollectionAck,
        parcel_expiry: time::OffsetDateTime,
    ) -> Result<()> {
        self.pending_acks.lock().unwrap().push((ack, parcel_expiry));
        Ok(())
    }

    fn list_pending_collection_acks(
        &self,
    ) -> BoxStream<'static, (ParcelCollectionAck, time::OffsetDateTime)> {
        let items = self.pending_acks.lock().unwrap().clone();
        stream::iter(items).boxed()
    }

    async fn delete_collection_ack(&self, ack: &ParcelCollectionAck) -> Result<()> {
        self.pending_acks.lock().unwrap().retain(|(stored, _)| stored != ack);
        Ok(())
    }
}

impl InMemoryParcelStore {
    fn map_for(&self, direction: ParcelDirection) -> &DashMap<ParcelKey, StoredParcel> {
        match direction {
            ParcelDirection::FromInternetToEndpoint => &self.endpoint_bound,
            ParcelDirection::TowardsInternet => &self.internet_bound,
        }
    }
}

/// An in-memory [`KeyStore`], pre-seedable with a node key/certificate and
/// a CCA issuer.
pub struct InMemoryKeyStore {
    node_key: Mutex<Option<(PrivateKeyHandle, Certificate)>>,
    cca_issuer: Mutex<Option<(PrivateKeyHandle, Certificate)>>,
    node_certificates: Mutex<Vec<Certificate>>,
    public_gateway_certificate: Mutex<Option<Certificate>>,
}

impl InMemoryKeyStore {
    pub fn new(node_key: PrivateKeyHandle, node_certificate: Certificate) -> Self {
        Self {
            node_certificates: Mutex::new(vec![node_certificate.clone()]),
            node_key: Mutex::new(Some((node_key, node_certificate))),
            cca_issuer: Mutex::new(None),
            public_gateway_certificate: Mutex::new(None),
        }
    }

    pub fn with_public_gateway_certificate(self, certificate: Certificate) -> Self {
        *self.public_gateway_certificate.lock().unwrap() = Some(certificate);
        self
    }

    pub fn with_cca_issuer(self, key: PrivateKeyHandle, certificate: Certificate) -> Self {
        *self.cca_issuer.lock().unwrap() = Some((key, certificate));
        self
    }

    pub fn add_trusted_certificate(&self, certificate: Certificate) {
        self.node_certificates.lock().unwrap().push(certificate);
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn get_current_key(&self) -> Result<(PrivateKeyHandle, Certificate)> {
        self.node_key
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::error::GatewayError::Store("no current node key".into()))
    }

    async fn fetch_node_certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.node_certificates.lock().unwrap().clone())
    }

    async fn get_or_create_cca_issuer(&self) -> Result<(PrivateKeyHandle, Certificate)> {
        self.cca_issuer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::error::GatewayError::Store("no CCA issuer seeded".into()))
    }

    async fn save_node_key(&self, key: PrivateKeyHandle, certificate: Certificate) -> Result<()> {
        self.node_certificates.lock().unwrap().push(certificate.clone());
        *self.node_key.lock().unwrap() = Some((key, certificate));
        Ok(())
    }

    async fn get_public_gateway_certificate(&self) -> Result<Option<Certificate>> {
        Ok(self.public_gateway_certificate.lock().unwrap().clone())
    }

    async fn save_public_gateway_certificate(&self, certificate: Certificate) -> Result<()> {
        *self.public_gateway_certificate.lock().unwrap() = Some(certificate);
        Ok(())
    }
}

/// An in-memory [`ConfigStore`] backed by a plain map.
#[derive(Default)]
pub struct InMemoryConfigStore {
    values: DashMap<String, String>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(pairs: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
        let store = Self::default();
        for (k, v) in pairs {
            store.values.insert(k.to_owned(), v.to_owned());
        }
        store
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Certificate;

    fn cert(subject: &str) -> Certificate {
        let now = time::OffsetDateTime::now_utc();
        Certificate {
            serialized: Vec::new(),
            subject_private_address: subject.into(),
            issuer_private_address: subject.into(),
            valid_from: now - time::Duration::minutes(5),
            valid_until: now + time::Duration::days(1),
        }
    }

    #[tokio::test]
    async fn collection_ack_info_reflects_stored_parcel() {
        let store = InMemoryParcelStore::new();
        let recipient = PrivateAddress::from("endpoint-1".to_owned());
        let parcel = Parcel {
            id: "parcel-xyz".into(),
            serialized: b"payload".to_vec(),
            sender_certificate_chain: vec![cert("sender-1")],
            recipient: NodeAddress::Private(recipient.0.clone()),
            creation_date: time::OffsetDateTime::now_utc(),
            ttl: time::Duration::days(1),
        };
        let key = store.store_endpoint_bound(parcel.serialized.clone(), &parcel).await.unwrap();

        let (ack, expiry) = store.collection_ack_info(&key).await.unwrap().unwrap();
        assert_eq!(ack.sender_private_address, "sender-1");
        assert_eq!(ack.recipient_address, NodeAddress::Private(recipient.0));
        assert_eq!(ack.parcel_id, "parcel-xyz");
        assert_eq!(expiry, parcel.expiry_date());
    }

    #[tokio::test]
    async fn collection_ack_info_is_none_for_unknown_key() {
        let store = InMemoryParcelStore::new();
        assert!(store
            .collection_ack_info(&ParcelKey("missing".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_internet_bound_from_ack_is_idempotent() {
        let store = InMemoryParcelStore::new();
        store.seed_internet_bound("parcel-1", b"payload".to_vec(), time::OffsetDateTime::now_utc());
        let ack = ParcelCollectionAck {
            sender_private_address: "sender-1".into(),
            recipient_address: NodeAddress::PublicInternet("https://pgw.example".into()),
            parcel_id: "parcel-1".into(),
        };
        store.delete_internet_bound_from_ack(&ack).await.unwrap();
        assert_eq!(store.internet_bound_len(), 0);
        store.delete_internet_bound_from_ack(&ack).await.unwrap();
        assert_eq!(store.internet_bound_len(), 0);
    }
}
