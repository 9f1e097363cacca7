use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;

use sv_core::{Error, Result};

use crate::keys::ContentKey;

pub const MIN_ARGON2_MEMORY_KIB: u32 = 65536;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Expands `ikm` under `salt` and a domain-separating `info` label into
/// `out.len()` bytes of key material, the same HKDF-SHA256 shape the
/// teacher's `hkdf_sha384_expand`/`hkdf_expand_keys` use (SHA-256 here since
/// this crate has no other SHA-384 consumer and only 256-bit keys are
/// needed).
pub fn hkdf_expand(ikm: &[u8], salt: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    hk.expand(info, out)
        .map_err(|_| Error::internal("hkdf output too long"))
}

/// Derives a per-segment [`ContentKey`] and nonce seed from a folder-level
/// session key and the segment's file id, mirroring the teacher's
/// `derive_kek`/`derive_file_nonce_seed` split: one key schedule, two
/// differently labeled outputs.
pub fn derive_segment_keys(session_key: &[u8; 32], file_id: &str) -> Result<(ContentKey, [u8; 16])> {
    let mut aead_key = [0u8; 32];
    hkdf_expand(session_key, file_id.as_bytes(), b"sharevault/segment-aead-key/v1", &mut aead_key)?;

    let mut nonce_seed = [0u8; 16];
    hkdf_expand(session_key, file_id.as_bytes(), b"sharevault/segment-nonce-seed/v1", &mut nonce_seed)?;

    Ok((ContentKey::from_bytes(aead_key), nonce_seed))
}

/// Derives a deterministic key-encryption key for a given user from the
/// folder's identity secret, so that `derive_user_key` is reproducible from
/// `(folder_secret, user_id)` alone and never stored.
pub fn derive_user_key(folder_secret: &[u8; 32], user_id: &str) -> Result<ContentKey> {
    let mut key = [0u8; 32];
    hkdf_expand(folder_secret, user_id.as_bytes(), b"sharevault/identity-wrap-key/v1", &mut key)?;
    Ok(ContentKey::from_bytes(key))
}

/// Derives the key-encryption key a user wraps their copy of a folder's
/// session key under, in identity share mode. Both the publisher (who learns
/// a user's `identity_secret` out of band when granting access, see
/// [`crate::identity`]) and the user themselves arrive at the same KEK by
/// running this over the shared secret, so no separate per-folder salt needs
/// distributing alongside it.
pub fn derive_identity_kek(identity_secret: &[u8; 32]) -> Result<ContentKey> {
    let mut key = [0u8; 32];
    hkdf_expand(identity_secret, b"", b"sharevault/identity-session-kek/v1", &mut key)?;
    Ok(ContentKey::from_bytes(key))
}

/// Derives a key-encryption key from a password via Argon2id, with a memory
/// cost floor of 64 MiB.
pub fn derive_password_key(password: &[u8], salt: &[u8; 16], memory_kib: u32) -> Result<ContentKey> {
    let memory_kib = memory_kib.max(MIN_ARGON2_MEMORY_KIB);
    let params = Params::new(memory_kib, ARGON2_ITERATIONS, ARGON2_PARALLELISM, Some(32))
        .map_err(|_| Error::internal("invalid argon2 params"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|_| Error::CryptoFailure)?;
    Ok(ContentKey::from_bytes(out))
}

/// Wraps a 32-byte key under a key-encryption key with AES-256-GCM, prefixing
/// the random nonce to the ciphertext, as the teacher's `wrap_dek` does.
pub fn wrap_key(kek: &ContentKey, dek: &[u8; 32]) -> Result<Vec<u8>> {
    use rand_core::RngCore;
    let cipher = Aes256Gcm::new_from_slice(kek.expose()).map_err(|_| Error::CryptoFailure)?;
    let mut nonce_bytes = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: dek, aad: b"" })
        .map_err(|_| Error::CryptoFailure)?;

    let mut wrapped = Vec::with_capacity(12 + ciphertext.len());
    wrapped.extend_from_slice(&nonce_bytes);
    wrapped.extend_from_slice(&ciphertext);
    Ok(wrapped)
}

/// Inverse of [`wrap_key`]. Fails closed (opaque [`Error::CryptoFailure`]) on
/// any tamper or wrong-key attempt.
pub fn unwrap_key(kek: &ContentKey, wrapped: &[u8]) -> Result<[u8; 32]> {
    if wrapped.len() < 12 + 16 {
        return Err(Error::CryptoFailure);
    }
    let (nonce_bytes, ciphertext) = wrapped.split_at(12);
    let cipher = Aes256Gcm::new_from_slice(kek.expose()).map_err(|_| Error::CryptoFailure)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: ciphertext, aad: b"" })
        .map_err(|_| Error::CryptoFailure)?;

    plaintext.try_into().map_err(|_| Error::CryptoFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_keys_are_deterministic_for_fixed_inputs() {
        let session_key = [3u8; 32];
        let (k1, seed1) = derive_segment_keys(&session_key, "file-a").unwrap();
        let (k2, seed2) = derive_segment_keys(&session_key, "file-a").unwrap();
        assert_eq!(k1.expose(), k2.expose());
        assert_eq!(seed1, seed2);
    }

    #[test]
    fn segment_keys_differ_across_files() {
        let session_key = [3u8; 32];
        let (k1, _) = derive_segment_keys(&session_key, "file-a").unwrap();
        let (k2, _) = derive_segment_keys(&session_key, "file-b").unwrap();
        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn wrap_unwrap_round_trips() {
        let kek = ContentKey::random();
        let dek = [42u8; 32];
        let wrapped = wrap_key(&kek, &dek).unwrap();
        let unwrapped = unwrap_key(&kek, &wrapped).unwrap();
        assert_eq!(unwrapped, dek);
    }

    #[test]
    fn unwrap_with_wrong_key_fails() {
        let kek_a = ContentKey::random();
        let kek_b = ContentKey::random();
        let wrapped = wrap_key(&kek_a, &[1u8; 32]).unwrap();
        assert!(unwrap_key(&kek_b, &wrapped).is_err());
    }

    #[test]
    fn password_kdf_enforces_memory_floor() {
        let salt = [0u8; 16];
        let key = derive_password_key(b"correct horse", &salt, 1024).unwrap();
        let key_at_floor = derive_password_key(b"correct horse", &salt, MIN_ARGON2_MEMORY_KIB).unwrap();
        assert_eq!(key.expose(), key_at_floor.expose());
    }

    #[test]
    fn identity_kek_is_deterministic_and_distinct_per_secret() {
        let a = derive_identity_kek(&[11u8; 32]).unwrap();
        let a2 = derive_identity_kek(&[11u8; 32]).unwrap();
        let b = derive_identity_kek(&[12u8; 32]).unwrap();
        assert_eq!(a.expose(), a2.expose());
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn password_kdf_differs_for_different_passwords() {
        let salt = [5u8; 16];
        let a = derive_password_key(b"correct horse", &salt, MIN_ARGON2_MEMORY_KIB).unwrap();
        let b = derive_password_key(b"wrong", &salt, MIN_ARGON2_MEMORY_KIB).unwrap();
        assert_ne!(a.expose(), b.expose());
    }
}
