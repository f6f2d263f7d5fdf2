use std::fmt;

use crate::model::{address::NodeAddress, certificate::Certificate};

/// Opaque handle minted by the parcel store on `store`. Callers never parse
/// it; they only round-trip it back to the store for `retrieve`/`delete`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ParcelKey(pub String);

impl fmt::Display for ParcelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParcelKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Direction a parcel is persisted under. A parcel bound for a local
/// endpoint and a parcel bound for the Internet never share a key space
/// even if they happen to collide on the opaque key alone.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ParcelDirection {
    FromInternetToEndpoint,
    TowardsInternet,
}

/// An authenticated, end-to-end encrypted payload. Its content is opaque to
/// the gateway; only the envelope fields below are inspected for routing
/// and lifecycle decisions.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Parcel {
    /// Identifier assigned by the parcel's original sender, carried
    /// alongside the envelope. Used to correlate a later PCA back to this
    /// parcel (§3 data model).
    pub id: String,
    pub serialized: Vec<u8>,
    pub sender_certificate_chain: Vec<Certificate>,
    pub recipient: NodeAddress,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_date: time::OffsetDateTime,
    pub ttl: time::Duration,
}

impl Parcel {
    pub fn expiry_date(&self) -> time::OffsetDateTime {
        self.creation_date + self.ttl
    }

    pub fn is_expired_at(&self, instant: time::OffsetDateTime) -> bool {
        instant > self.expiry_date()
    }
}
