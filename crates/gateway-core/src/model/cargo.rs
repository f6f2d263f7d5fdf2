use crate::model::{
    address::NodeAddress, certificate::Certificate, parcel::Parcel, pca::ParcelCollectionAck,
};

/// A signed envelope carried across the courier channel. Structurally
/// identical to a [`Parcel`] — a serialized, signed and usually encrypted
/// blob plus the envelope metadata needed to route and expire it — but
/// distinguished by type so the two are never mixed up.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Cargo {
    pub serialized: Vec<u8>,
    pub sender_certificate_chain: Vec<Certificate>,
    pub recipient: NodeAddress,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_date: time::OffsetDateTime,
    pub ttl: time::Duration,
}

impl Cargo {
    pub fn expiry_date(&self) -> time::OffsetDateTime {
        self.creation_date + self.ttl
    }
}

/// One inner message of a cargo's message set: either a parcel being
/// relayed, or an acknowledgement that a previously-relayed parcel was
/// collected.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum CargoMessage {
    Parcel(Parcel),
    CollectionAck(ParcelCollectionAck),
}

/// The decrypted payload of a [`Cargo`]: an ordered sequence of inner
/// messages. Order has no protocol meaning — each message is processed
/// independently and a malformed one is skipped rather than aborting the
/// whole set (see §7 of the design notes).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct CargoMessageSet {
    pub messages: Vec<CargoMessage>,
}

/// A message queued for the deliver phase, tagged with the expiry date of
/// whatever it wraps. The courier sync driver packs a stream of these into
/// outbound cargoes without needing to re-derive expiry from the raw bytes.
#[derive(Clone, Debug)]
pub struct TaggedCargoMessage {
    pub message: CargoMessage,
    pub expiry_date: time::OffsetDateTime,
}
