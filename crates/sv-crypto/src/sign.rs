use ed25519_dalek::{Signature, Signer as _, Verifier as _, VerifyingKey};

use sv_core::Error;

use crate::keys::FolderSigningKey;

/// Domain separator mixed into every signed payload, so a signature minted
/// for one purpose can never be replayed as though it covered another —
/// the same discipline as the teacher's `sign_manifest_with_domain`.
const INDEX_DOMAIN: &[u8] = b"sharevault.index.v1";

/// Signs `canonical_bytes` (the deterministic serialization of an index
/// document) with the folder's signing key, prefixed by the domain
/// separator so the signature cannot be reinterpreted against unrelated
/// byte strings.
pub fn sign_index(key: &FolderSigningKey, canonical_bytes: &[u8]) -> [u8; 64] {
    let mut message = Vec::with_capacity(INDEX_DOMAIN.len() + canonical_bytes.len());
    message.extend_from_slice(INDEX_DOMAIN);
    message.extend_from_slice(canonical_bytes);
    key.inner().sign(&message).to_bytes()
}

/// Verifies a signature produced by [`sign_index`]. Any byte changed in
/// `canonical_bytes` invalidates the signature.
pub fn verify_index(
    verifying_key: &VerifyingKey,
    canonical_bytes: &[u8],
    signature: &[u8; 64],
) -> Result<(), Error> {
    let mut message = Vec::with_capacity(INDEX_DOMAIN.len() + canonical_bytes.len());
    message.extend_from_slice(INDEX_DOMAIN);
    message.extend_from_slice(canonical_bytes);

    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify(&message, &sig)
        .map_err(|_| Error::IntegrityFailure("index signature verification failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let key = FolderSigningKey::generate();
        let sig = sign_index(&key, b"index-bytes-v1");
        assert!(verify_index(&key.verifying_key(), b"index-bytes-v1", &sig).is_ok());
    }

    #[test]
    fn tampered_bytes_invalidate_signature() {
        let key = FolderSigningKey::generate();
        let sig = sign_index(&key, b"index-bytes-v1");
        assert!(verify_index(&key.verifying_key(), b"index-bytes-v2", &sig).is_err());
    }

    #[test]
    fn wrong_key_invalidates_signature() {
        let key = FolderSigningKey::generate();
        let other = FolderSigningKey::generate();
        let sig = sign_index(&key, b"index-bytes-v1");
        assert!(verify_index(&other.verifying_key(), b"index-bytes-v1", &sig).is_err());
    }
}
