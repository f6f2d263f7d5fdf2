use crate::model::certificate::{Certificate, DetachedSignature};

/// Payload wrapped inside a [`CargoCollectionAuthorization`]: the freshly
/// issued, short-lived certificate that authorizes its bearer (the
/// courier) to present itself to the public gateway as our delivery agent.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CargoCollectionRequest {
    pub cargo_delivery_authorization: Certificate,
}

/// A signed, encrypted request handed to a courier so it can collect our
/// queued cargo from the public gateway on our behalf. `signature` is the
/// CCA issuer's detached signature over `serialized`, letting the public
/// gateway authenticate the request before honoring it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CargoCollectionAuthorization {
    pub serialized: Vec<u8>,
    pub signature: DetachedSignature,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_date: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_date: time::OffsetDateTime,
}
