use ed25519_dalek::VerifyingKey;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

use sv_core::{Error, Result};
use sv_crypto::keys::FolderSigningKey;
use sv_crypto::sign::{sign_index, verify_index};
use sv_crypto::{aead, ContentKey};

use crate::access::AccessBlock;
use crate::document::IndexDocument;

const INDEX_AAD: &[u8] = b"sharevault/index-envelope/v1";

/// The fields the folder signature actually covers, in the exact order
/// they're encoded for signing and for verification. Keeping this as its
/// own (unsigned) type rather than re-deriving the byte string inline at
/// each call site means `seal` and `verify_signature` can never drift apart
/// on what "the signed bytes" are.
#[derive(Serialize)]
struct SignaturePayload<'a> {
    version: u32,
    folder_public_key: &'a [u8; 32],
    access: &'a AccessBlock,
    ciphertext: &'a [u8],
}

impl SignaturePayload<'_> {
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| Error::Internal(format!("signature payload encode failed: {e}")))
    }
}

/// What actually gets posted as an index article chain. `folder_public_key`
/// and `access` travel in the clear — a holder needs `access` to recover
/// the session key, and needs `folder_public_key` to verify `signature`
/// before it has that key at all. `ciphertext` is the session key's AEAD
/// encryption of the plaintext [`IndexDocument`]. `signature` is the folder
/// signing key's detached signature over every other field (see
/// [`SignaturePayload`]), so tampering with the access block is caught by
/// the same check that catches tampering with the encrypted body — neither
/// requires decrypting anything first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishedIndex {
    pub version: u32,
    pub folder_public_key: [u8; 32],
    pub access: AccessBlock,
    pub ciphertext: Vec<u8>,
    pub signature: [u8; 64],
}

impl PublishedIndex {
    /// Encrypts `document` under `session_key`, then signs the resulting
    /// envelope (access block included) with `signing_key`. `folder_public_key`
    /// is `signing_key`'s own verifying key; it is passed in explicitly
    /// rather than re-derived so callers which already have it (the
    /// publisher builds it once for `IndexDocument::folder.public_key` too)
    /// don't redo the work.
    pub fn seal(
        version: u32,
        folder_public_key: [u8; 32],
        access: AccessBlock,
        session_key: &ContentKey,
        document: &IndexDocument,
        signing_key: &FolderSigningKey,
    ) -> Result<Self> {
        let ciphertext = encrypt_index_document(session_key, document)?;
        let payload = SignaturePayload { version, folder_public_key: &folder_public_key, access: &access, ciphertext: &ciphertext };
        let signature = sign_index(signing_key, &payload.canonical_bytes()?);
        Ok(Self { version, folder_public_key, access, ciphertext, signature })
    }

    /// Verifies the folder signature over this envelope's clear fields and
    /// ciphertext, independent of `session_key` and before any attempt to
    /// decrypt. Must succeed before [`Self::open`] decrypts anything.
    pub fn verify_signature(&self) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&self.folder_public_key)
            .map_err(|_| Error::IntegrityFailure("folder public key is not a valid ed25519 key".into()))?;
        let payload = SignaturePayload {
            version: self.version,
            folder_public_key: &self.folder_public_key,
            access: &self.access,
            ciphertext: &self.ciphertext,
        };
        verify_index(&verifying_key, &payload.canonical_bytes()?, &self.signature)
    }

    /// Verifies the folder signature, then decrypts the index document with
    /// `session_key`. Signature verification always runs first and does not
    /// depend on `session_key`, so a tampered envelope is rejected whether
    /// or not the caller's secret would have unlocked it.
    pub fn open(&self, session_key: &ContentKey) -> Result<IndexDocument> {
        self.verify_signature()?;
        decrypt_index_document(session_key, &self.ciphertext)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| Error::Internal(format!("published index encode failed: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| Error::IntegrityFailure(format!("published index decode failed: {e}")))
    }
}

fn encrypt_index_document(session_key: &ContentKey, document: &IndexDocument) -> Result<Vec<u8>> {
    let plaintext = document.canonical_bytes()?;
    let mut nonce = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = aead::seal(session_key, &nonce, INDEX_AAD, &plaintext)?;
    let mut out = Vec::with_capacity(12 + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_index_document(session_key: &ContentKey, blob: &[u8]) -> Result<IndexDocument> {
    if blob.len() < 12 {
        return Err(Error::IntegrityFailure("index ciphertext shorter than its nonce".into()));
    }
    let (nonce_bytes, ciphertext) = blob.split_at(12);
    let nonce: [u8; 12] = nonce_bytes.try_into().expect("split_at(12) guarantees 12 bytes");

    let plaintext = aead::open(session_key, &nonce, INDEX_AAD, ciphertext)?;
    IndexDocument::decode(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FileEntry, FolderMeta, SegmentLocator};
    use sv_crypto::keys::FolderSigningKey;

    fn sample_document_and_key() -> (IndexDocument, FolderSigningKey) {
        let key = FolderSigningKey::generate();
        let document = IndexDocument {
            version: 1,
            folder: FolderMeta {
                folder_id: "f1".into(),
                name: "Photos".into(),
                public_key: key.verifying_key().to_bytes(),
                share_mode: "open".into(),
            },
            files: vec![FileEntry {
                path: "a.jpg".into(),
                size: 10,
                content_hash: "hash".into(),
                segments: vec![SegmentLocator { message_ids: vec!["<m0@news>".into()] }],
            }],
        };
        (document, key)
    }

    #[test]
    fn seal_then_open_round_trips() {
        let (document, key) = sample_document_and_key();
        let session_key = ContentKey::random();
        let access = AccessBlock::open(&session_key);
        let published = PublishedIndex::seal(1, key.verifying_key().to_bytes(), access, &session_key, &document, &key).unwrap();

        assert!(published.verify_signature().is_ok());
        let recovered = published.open(&session_key).unwrap();
        assert_eq!(recovered.files[0].path, "a.jpg");
    }

    #[test]
    fn wrong_session_key_fails_to_open_but_signature_still_verifies() {
        let (document, key) = sample_document_and_key();
        let session_key = ContentKey::random();
        let wrong_key = ContentKey::random();
        let access = AccessBlock::open(&session_key);
        let published = PublishedIndex::seal(1, key.verifying_key().to_bytes(), access, &session_key, &document, &key).unwrap();

        assert!(published.verify_signature().is_ok());
        assert!(published.open(&wrong_key).is_err());
    }

    #[test]
    fn tampered_access_block_invalidates_signature_without_decrypting() {
        let (document, key) = sample_document_and_key();
        let session_key = ContentKey::random();
        let access = AccessBlock::open(&session_key);
        let mut published = PublishedIndex::seal(1, key.verifying_key().to_bytes(), access, &session_key, &document, &key).unwrap();

        // Swap in a different session key inside the (clear) access block,
        // simulating an attacker substituting their own key material.
        published.access = AccessBlock::open(&ContentKey::random());

        assert!(published.verify_signature().is_err());
        // `open` must reject before it ever attempts to decrypt.
        assert!(published.open(&session_key).is_err());
    }

    #[test]
    fn tampered_ciphertext_invalidates_signature() {
        let (document, key) = sample_document_and_key();
        let session_key = ContentKey::random();
        let access = AccessBlock::open(&session_key);
        let mut published = PublishedIndex::seal(1, key.verifying_key().to_bytes(), access, &session_key, &document, &key).unwrap();

        published.ciphertext[0] ^= 0xFF;

        assert!(published.verify_signature().is_err());
    }

    #[test]
    fn encode_decode_round_trips() {
        let (document, key) = sample_document_and_key();
        let session_key = ContentKey::random();
        let access = AccessBlock::open(&session_key);
        let published = PublishedIndex::seal(1, key.verifying_key().to_bytes(), access, &session_key, &document, &key).unwrap();

        let bytes = published.encode().unwrap();
        let decoded = PublishedIndex::decode(&bytes).unwrap();
        assert_eq!(decoded.ciphertext, published.ciphertext);
        assert!(decoded.verify_signature().is_ok());
    }
}
