use crate::model::address::NodeAddress;

/// Proof that an Internet-bound parcel was collected by its endpoint.
///
/// Persisted in a dedicated table from the moment the parcel is collected
/// until the PCA itself has been packed into an outbound cargo and
/// acknowledged by the courier transport; see [`crate::store::ParcelStore`]
/// for the lifecycle operations.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParcelCollectionAck {
    /// Private address of the endpoint that originally sent the parcel.
    pub sender_private_address: String,
    /// Internet-facing address the parcel was addressed to.
    pub recipient_address: NodeAddress,
    /// Identifier of the collected parcel, as carried by the parcel itself.
    pub parcel_id: String,
}
