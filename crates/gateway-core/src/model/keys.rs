/// Opaque handle to a private key held by the [`crate::store::KeyStore`]
/// backend.
///
/// The sync core never inspects key material directly — it only ever
/// round-trips a handle between the key store and the [`crate::crypto`]
/// backend, both of which are external collaborators. Implementations are
/// free to make this a PKCS#8 blob, a PKCS#11 handle, whatever fits their
/// key management story.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct PrivateKeyHandle(pub Vec<u8>);

impl std::fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKeyHandle").field(&"..").finish()
    }
}
