use std::fmt;

/// Where a parcel or cargo is addressed to.
///
/// Relaynet recipients are either reachable over the open Internet (a public
/// gateway URL) or are a private endpoint only this gateway knows how to
/// route to directly.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NodeAddress {
    /// `https://...` address of a public gateway.
    PublicInternet(String),
    /// Opaque identifier of a node private to this gateway's network.
    Private(String),
}

impl NodeAddress {
    pub fn as_str(&self) -> &str {
        match self {
            NodeAddress::PublicInternet(addr) | NodeAddress::Private(addr) => addr,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A private address: the deterministic identifier derived from a node's
/// public key (in the real system, a hash of the SPKI). Opaque here since
/// the hashing itself is a cryptographic primitive out of scope for this
/// crate.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct PrivateAddress(pub String);

impl fmt::Display for PrivateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PrivateAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PrivateAddress {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
