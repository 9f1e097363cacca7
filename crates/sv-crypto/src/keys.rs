use secrecy::{ExposeSecret, Secret};
use zeroize::Zeroize;

/// A 256-bit symmetric key, held behind [`secrecy::Secret`] and zeroized on
/// drop exactly as the teacher's `ContentEncryptionKey` does.
#[derive(Clone)]
pub struct ContentKey(Secret<[u8; 32]>);

impl ContentKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Secret::new(bytes))
    }

    pub fn random() -> Self {
        use rand_core::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn expose(&self) -> &[u8; 32] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(***)")
    }
}

/// The pair of keys derived for a single segment: the AEAD key and the
/// nonce seed used to build its deterministic nonce, mirroring the
/// teacher's `ContentKeys` grouping.
pub struct SegmentKeys {
    pub aead_key: ContentKey,
    pub nonce_seed: [u8; 16],
}

impl Drop for SegmentKeys {
    fn drop(&mut self) {
        self.nonce_seed.zeroize();
    }
}

/// An Ed25519 keypair used to sign folder index documents.
pub struct FolderSigningKey {
    signing: ed25519_dalek::SigningKey,
}

impl FolderSigningKey {
    pub fn generate() -> Self {
        let signing = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        Self { signing }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    pub fn verifying_key(&self) -> ed25519_dalek::VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn inner(&self) -> &ed25519_dalek::SigningKey {
        &self.signing
    }
}

impl std::fmt::Debug for FolderSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FolderSigningKey(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_debug_does_not_leak() {
        let k = ContentKey::random();
        let printed = format!("{:?}", k);
        assert_eq!(printed, "ContentKey(***)");
    }

    #[test]
    fn signing_key_round_trips_through_bytes() {
        let key = FolderSigningKey::generate();
        let bytes = key.to_bytes();
        let restored = FolderSigningKey::from_bytes(&bytes);
        assert_eq!(key.verifying_key(), restored.verifying_key());
    }
}
