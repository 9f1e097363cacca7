use serde::{Deserialize, Serialize};

use sv_core::{Error, Result};

/// Folder-level metadata carried inside the index document, mirroring
/// `folders.display_name` and the folder's signing keypair rather than
/// referencing the catalog row directly, so a resolver with no local
/// catalog can still make sense of a fetched index. `folder_id` is the
/// uploader's `folder_unique_id`, carried along verbatim because the
/// per-segment key and AAD derivation is bound to it: a downloader on a
/// fresh host has no catalog row to read it back from otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderMeta {
    pub folder_id: String,
    pub name: String,
    pub public_key: [u8; 32],
    pub share_mode: String,
}

/// One segment's redundant copies, ordered by `redundancy_index` with the
/// primary copy first. The downloader tries each message_id in order until
/// one retrieves cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentLocator {
    pub message_ids: Vec<String>,
}

/// One file's manifest entry: enough to verify content after download
/// (`content_hash`) and to locate every segment that reassembles it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub content_hash: String,
    pub segments: Vec<SegmentLocator>,
}

/// The manifest a folder publishes: its own metadata plus every file it
/// contains. This is the part that gets encrypted under the share's
/// session key; the folder signature covers the whole on-wire envelope
/// (access block and ciphertext alike), not just these plaintext bytes —
/// see [`crate::envelope::PublishedIndex`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexDocument {
    pub version: u32,
    pub folder: FolderMeta,
    pub files: Vec<FileEntry>,
}

impl IndexDocument {
    /// Deterministic encoding: `postcard` serializes struct fields in
    /// declaration order with fixed-width integers, so two documents with
    /// identical field values always produce identical bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| Error::Internal(format!("index document encode failed: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| Error::IntegrityFailure(format!("index document decode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> IndexDocument {
        IndexDocument {
            version: 1,
            folder: FolderMeta { folder_id: "f1".into(), name: "Photos".into(), public_key: [9u8; 32], share_mode: "open".into() },
            files: vec![FileEntry {
                path: "a.jpg".into(),
                size: 1024,
                content_hash: "deadbeef".into(),
                segments: vec![SegmentLocator { message_ids: vec!["<m0@news>".into()] }],
            }],
        }
    }

    #[test]
    fn canonical_bytes_are_stable_across_calls() {
        let doc = sample_document();
        assert_eq!(doc.canonical_bytes().unwrap(), doc.canonical_bytes().unwrap());
    }

    #[test]
    fn encode_decode_round_trips() {
        let doc = sample_document();
        let bytes = doc.canonical_bytes().unwrap();
        let decoded = IndexDocument::decode(&bytes).unwrap();
        assert_eq!(decoded.files[0].path, "a.jpg");
    }
}
