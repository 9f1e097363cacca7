use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use sv_core::Error;

use crate::keys::ContentKey;

/// Derives a deterministic 96-bit nonce from a segment's coordinates, the
/// way the teacher's `nonce_96(file_id, chunk_no)` derives streaming nonces:
/// BLAKE3-keyed over the coordinate tuple, truncated to 12 bytes. Distinct
/// `(file_id, segment_index, redundancy_index)` triples never collide for a
/// fixed key, which is what nonce-uniqueness within a share requires.
pub fn derive_nonce(
    nonce_seed: &[u8; 16],
    file_id: &str,
    segment_index: u32,
    redundancy_index: u32,
) -> [u8; 12] {
    let mut hasher = blake3::Hasher::new_keyed(&expand_seed(nonce_seed));
    hasher.update(file_id.as_bytes());
    hasher.update(&segment_index.to_be_bytes());
    hasher.update(&redundancy_index.to_be_bytes());
    let digest = hasher.finalize();
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&digest.as_bytes()[..12]);
    nonce
}

fn expand_seed(seed: &[u8; 16]) -> [u8; 32] {
    let mut expanded = [0u8; 32];
    expanded[..16].copy_from_slice(seed);
    expanded[16..].copy_from_slice(seed);
    expanded
}

/// Builds the associated data bound to a segment's ciphertext: folder,
/// relative path, and coordinates, so a segment from one file can never be
/// swapped in for another even if its plaintext happens to collide. The
/// compression flag deliberately lives inside the packed plaintext envelope
/// instead of here, so AAD stays fixed per coordinate regardless of whether
/// compression helped.
pub fn segment_aad(
    folder_id: &str,
    relative_path: &str,
    segment_index: u32,
    redundancy_index: u32,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(folder_id.len() + relative_path.len() + 16);
    aad.extend_from_slice(folder_id.as_bytes());
    aad.push(0);
    aad.extend_from_slice(relative_path.as_bytes());
    aad.push(0);
    aad.extend_from_slice(&segment_index.to_be_bytes());
    aad.extend_from_slice(&redundancy_index.to_be_bytes());
    aad
}

/// Encrypts `plaintext` under `key` with the given nonce and associated
/// data, returning ciphertext with the GCM tag appended.
pub fn seal(key: &ContentKey, nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = Aes256Gcm::new_from_slice(key.expose()).map_err(|_| Error::CryptoFailure)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| Error::CryptoFailure)
}

/// Decrypts and verifies `ciphertext` under `key`, the given nonce, and
/// associated data. Any tampering anywhere in ciphertext or AAD surfaces
/// as an opaque [`Error::CryptoFailure`], never distinguishing the cause.
pub fn open(key: &ContentKey, nonce: &[u8; 12], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = Aes256Gcm::new_from_slice(key.expose()).map_err(|_| Error::CryptoFailure)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::CryptoFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let key = ContentKey::random();
        let nonce = derive_nonce(&[7u8; 16], "file-1", 3, 0);
        let aad = b"segment-aad";
        let pt = b"the quick brown fox";

        let ct = seal(&key, &nonce, aad, pt).unwrap();
        let recovered = open(&key, &nonce, aad, &ct).unwrap();
        assert_eq!(recovered, pt);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let key = ContentKey::random();
        let nonce = derive_nonce(&[1u8; 16], "file-2", 0, 0);
        let mut ct = seal(&key, &nonce, b"aad", b"payload").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(open(&key, &nonce, b"aad", &ct).is_err());
    }

    #[test]
    fn nonces_differ_across_segment_index() {
        let seed = [9u8; 16];
        let n0 = derive_nonce(&seed, "file-3", 0, 0);
        let n1 = derive_nonce(&seed, "file-3", 1, 0);
        assert_ne!(n0, n1);
    }

    #[test]
    fn nonces_differ_across_redundancy_index() {
        let seed = [9u8; 16];
        let n0 = derive_nonce(&seed, "file-3", 0, 0);
        let n1 = derive_nonce(&seed, "file-3", 0, 1);
        assert_ne!(n0, n1);
    }

    #[test]
    fn segment_aad_binds_folder_and_path() {
        let a = segment_aad("folder-1", "docs/a.txt", 0, 0);
        let b = segment_aad("folder-1", "docs/b.txt", 0, 0);
        let c = segment_aad("folder-2", "docs/a.txt", 0, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn mismatched_aad_fails_open() {
        let key = ContentKey::random();
        let nonce = derive_nonce(&[2u8; 16], "file-4", 0, 0);
        let aad = segment_aad("folder-1", "docs/a.txt", 0, 0);
        let ct = seal(&key, &nonce, &aad, b"payload").unwrap();
        let wrong_aad = segment_aad("folder-1", "docs/b.txt", 0, 0);
        assert!(open(&key, &nonce, &wrong_aad, &ct).is_err());
    }
}
