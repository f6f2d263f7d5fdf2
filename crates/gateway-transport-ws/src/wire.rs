//! Wire shapes carried as binary WebSocket frames (§6).
//!
//! The handshake challenge/response types live in
//! `gateway_switch::handshake`; this module only adds the one frame shape
//! that's specific to this transport binding.

/// Server → client frame offering one queued parcel (§4.5).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ParcelDelivery {
    /// UUID-v4 string, unique within this session only (§3 invariants).
    pub delivery_id: String,
    pub parcel_serialized: Vec<u8>,
}
