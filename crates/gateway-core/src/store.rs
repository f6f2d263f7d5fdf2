//! Storage contracts consumed by the sync protocols.
//!
//! Concrete backends — a relational table for config, a blob store for
//! parcels — live outside this crate (see §6 of the design notes); this
//! module only pins down the shapes the protocol logic depends on.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{
    address::PrivateAddress,
    parcel::{Parcel, ParcelDirection, ParcelKey},
    pca::ParcelCollectionAck,
};

/// Blob CRUD for parcels, keyed by opaque [`ParcelKey`] and indexed by
/// recipient address and [`ParcelDirection`].
///
/// `delete` and `store_endpoint_bound` must be atomic per key; a second
/// `delete` of an already-deleted key is a no-op, never an error (§5).
#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// Lazily enumerate the keys of active parcels bound for any of
    /// `endpoint_addresses`. When `keep_alive` is true the sequence never
    /// terminates on its own; new arrivals are pushed as they are stored.
    /// When false, it ends once the parcels queued at call time have all
    /// been yielded.
    fn stream_active_bound_for_endpoints(
        &self,
        endpoint_addresses: Vec<PrivateAddress>,
        keep_alive: bool,
    ) -> BoxStream<'static, ParcelKey>;

    /// Fetch a parcel's serialized bytes. `Ok(None)` means the key was
    /// valid at enumeration time but has since been deleted — callers must
    /// treat this as a silent skip, not an error.
    async fn retrieve(&self, key: &ParcelKey, direction: ParcelDirection) -> Result<Option<Vec<u8>>>;

    /// Look up the data needed to build a PCA for an endpoint-bound parcel,
    /// without deleting it. Called by the collection server immediately
    /// before it deletes a parcel whose delivery the endpoint just
    /// acknowledged (§4.5), so the resulting PCA can be queued for a later
    /// deliver phase (§3's "dedicated table"). `Ok(None)` means the key is
    /// already gone, mirroring `retrieve`'s raced-deletion semantics.
    async fn collection_ack_info(
        &self,
        key: &ParcelKey,
    ) -> Result<Option<(ParcelCollectionAck, time::OffsetDateTime)>>;

    /// Idempotent delete: removing an already-absent key succeeds.
    async fn delete(&self, key: &ParcelKey, direction: ParcelDirection) -> Result<()>;

    /// Persist a parcel bound for a local endpoint, minting its key.
    async fn store_endpoint_bound(&self, serialized: Vec<u8>, parcel: &Parcel) -> Result<ParcelKey>;

    /// Lazily enumerate every Internet-bound parcel currently queued,
    /// paired with its expiry date so the deliver phase can tag cargo
    /// messages without re-parsing the blob.
    fn list_internet_bound(&self) -> BoxStream<'static, (ParcelKey, time::OffsetDateTime)>;

    /// Delete the Internet-bound parcel a PCA attests was collected.
    /// Idempotent: a PCA for an already-deleted parcel is a silent no-op.
    async fn delete_internet_bound_from_ack(&self, ack: &ParcelCollectionAck) -> Result<()>;

    /// Record that an endpoint-bound parcel has been collected, so the PCA
    /// can be shipped back to its original Internet sender in a later
    /// deliver phase (§4.8 step 2; the "dedicated table" of §3). Called by
    /// the collection server immediately after it deletes the
    /// `FROM_INTERNET_TO_ENDPOINT` parcel the ACK refers to.
    async fn record_collection_ack(
        &self,
        ack: ParcelCollectionAck,
        parcel_expiry: time::OffsetDateTime,
    ) -> Result<()>;

    /// Lazily enumerate every PCA queued for delivery, paired with the
    /// expiry date of the parcel it attests to.
    fn list_pending_collection_acks(&self) -> BoxStream<'static, (ParcelCollectionAck, time::OffsetDateTime)>;

    /// Remove a PCA once it has been packed into an outbound cargo and
    /// acknowledged by the courier transport (§3 invariants). Idempotent.
    async fn delete_collection_ack(&self, ack: &ParcelCollectionAck) -> Result<()>;
}

/// Persistence for this gateway's own keypair/certificate, its CCA-issuer
/// certificate, and the public gateway's certificate.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The node's current identity key and certificate. At most one
    /// identity certificate is ever "current" (§3 invariants).
    async fn get_current_key(&self) -> Result<(crate::model::PrivateKeyHandle, crate::model::Certificate)>;

    /// All certificates this gateway has issued or been issued, used as
    /// trust anchors during handshake verification.
    async fn fetch_node_certificates(&self) -> Result<Vec<crate::model::Certificate>>;

    /// The certificate (and key) used to issue short-lived cargo delivery
    /// authorizations, creating one on first use.
    async fn get_or_create_cca_issuer(
        &self,
    ) -> Result<(crate::model::PrivateKeyHandle, crate::model::Certificate)>;

    /// Persist a newly obtained identity key and certificate, replacing
    /// whichever one was previously current.
    async fn save_node_key(
        &self,
        key: crate::model::PrivateKeyHandle,
        certificate: crate::model::Certificate,
    ) -> Result<()>;

    /// The public gateway's identity certificate, learned during
    /// registration (§4.7 step 5) and consumed by the courier sync driver
    /// to address CCAs (§4.8 step 2). `None` before registration completes.
    async fn get_public_gateway_certificate(&self) -> Result<Option<crate::model::Certificate>>;

    /// Persist the public gateway's identity certificate, called by the
    /// registrar once registration succeeds.
    async fn save_public_gateway_certificate(&self, certificate: crate::model::Certificate) -> Result<()>;
}

/// Small key→string mapping persisted across restarts.
///
/// The registrar is the only writer of [`crate::constants::config_keys::PUBLIC_GATEWAY_ADDRESS`];
/// all other writers must use distinct keys (§5).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

#[cfg(feature = "testutil")]
pub mod testutil;
