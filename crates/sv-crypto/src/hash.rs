/// Content hash over plaintext bytes. Always BLAKE3-256, computed over
/// plaintext and never ciphertext, following the teacher's choice of BLAKE3
/// for content addressing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hashes a stream incrementally, for callers that cannot hold the whole
    /// file in memory at once (the segmenter reads in fixed-size windows).
    pub fn hasher() -> blake3::Hasher {
        blake3::Hasher::new()
    }

    pub fn from_hasher(hasher: blake3::Hasher) -> Self {
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Derives a segment's `subject_hash`: a keyed hash of its coordinates under
/// the folder's session key, so the posted article subject is an opaque,
/// non-correlatable label rather than the content hash itself. Two segments
/// with identical plaintext still get distinct subjects because `file_id`
/// and `segment_index` differ.
pub fn subject_label(
    session_key: &[u8; 32],
    folder_id: &str,
    file_id: &str,
    segment_index: u32,
    redundancy_index: u32,
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_keyed(session_key);
    hasher.update(b"sharevault/subject-label/v1");
    hasher.update(folder_id.as_bytes());
    hasher.update(file_id.as_bytes());
    hasher.update(&segment_index.to_be_bytes());
    hasher.update(&redundancy_index.to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// First four bytes of SHA-256(message_id), used as the integrity prefix
/// inside the access credential, bit-exact.
pub fn sha256_prefix4(message_id: &str) -> [u8; 4] {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(message_id.as_bytes());
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&digest[..4]);
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_identically() {
        let a = ContentHash::of(b"hello world");
        let b = ContentHash::of(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn incremental_hashing_matches_one_shot() {
        let whole = ContentHash::of(b"hello world");
        let mut hasher = ContentHash::hasher();
        hasher.update(b"hello ");
        hasher.update(b"world");
        let incremental = ContentHash::from_hasher(hasher);
        assert_eq!(whole, incremental);
    }

    #[test]
    fn subject_label_differs_per_segment() {
        let key = [7u8; 32];
        let a = subject_label(&key, "folder1", "file1", 0, 0);
        let b = subject_label(&key, "folder1", "file1", 1, 0);
        let c = subject_label(&key, "folder1", "file1", 0, 1);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, subject_label(&key, "folder1", "file1", 0, 0));
    }

    #[test]
    fn prefix_is_stable_for_fixed_input() {
        let p1 = sha256_prefix4("<abc123@news.example>");
        let p2 = sha256_prefix4("<abc123@news.example>");
        assert_eq!(p1, p2);
        let p3 = sha256_prefix4("<different@news.example>");
        assert_ne!(p1, p3);
    }
}
