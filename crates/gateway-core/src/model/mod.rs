//! Domain types shared by the collection server, the courier sync driver
//! and the registrar. Nothing in here knows how to serialize itself onto
//! the wire, verify a signature or decrypt an envelope — that is the job
//! of the [`crate::crypto`] backend and whatever codec the transport crate
//! chooses.

pub mod address;
pub mod cargo;
pub mod cca;
pub mod certificate;
pub mod keys;
pub mod parcel;
pub mod pca;

pub use address::{NodeAddress, PrivateAddress};
pub use cargo::{Cargo, CargoMessage, CargoMessageSet, TaggedCargoMessage};
pub use cca::{CargoCollectionAuthorization, CargoCollectionRequest};
pub use certificate::{Certificate, DetachedSignature};
pub use keys::PrivateKeyHandle;
pub use parcel::{Parcel, ParcelDirection, ParcelKey};
pub use pca::ParcelCollectionAck;
