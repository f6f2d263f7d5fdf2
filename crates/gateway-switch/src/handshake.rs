//! Nonce challenge / multi-signature response handshake (§4.4).
//!
//! Frame I/O (writing the challenge, reading the response) is a transport
//! concern and lives in `gateway-transport-ws`; this module only verifies a
//! response against a freshly generated nonce.

use gateway_core::crypto::NodeCryptoBackend;
use gateway_core::model::{Certificate, DetachedSignature, PrivateAddress};

use crate::error::HandshakeError;

/// Number of random bytes in a handshake nonce (§6).
pub const NONCE_LEN: usize = 16;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HandshakeChallenge {
    pub nonce: Vec<u8>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HandshakeResponse {
    pub nonce_signatures: Vec<DetachedSignature>,
}

/// Generate a fresh 16-byte cryptographically random nonce (§4.4 step 1).
pub fn generate_nonce() -> Vec<u8> {
    let bytes: [u8; NONCE_LEN] = rand::random();
    bytes.to_vec()
}

/// Verify a [`HandshakeResponse`] against the nonce that was challenged,
/// chaining each signature to one of `trust_anchors` (the local gateway's
/// own certificates). Returns the private address of every endpoint
/// certificate that produced a valid signature, in response order.
///
/// Any malformed signature aborts the whole handshake — unlike cargo
/// message-set items (§7), a bad signature here is not skipped, it fails
/// the session (§4.4 "Failure semantics").
pub async fn verify_response(
    nonce: &[u8],
    response: &HandshakeResponse,
    crypto: &dyn NodeCryptoBackend,
    trust_anchors: &[Certificate],
) -> Result<Vec<PrivateAddress>, HandshakeError> {
    if response.nonce_signatures.is_empty() {
        return Err(HandshakeError::NoSignatures);
    }

    let mut endpoint_addresses = Vec::with_capacity(response.nonce_signatures.len());
    for signature in &response.nonce_signatures {
        let address = crypto
            .verify_detached(nonce, signature, trust_anchors)
            .await
            .map_err(|e| HandshakeError::InvalidSignature(e.to_string()))?;
        endpoint_addresses.push(address);
    }
    Ok(endpoint_addresses)
}
