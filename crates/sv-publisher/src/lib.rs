//! Builds a folder's index document, encrypts it under a fresh session
//! key, wraps that key per the folder's share mode, and signs the whole
//! envelope — access block and ciphertext alike — with the folder's
//! signing key. Posts the result as a chunked article chain through
//! `sv-transport`, and resolves an access credential back into a
//! file/segment manifest on the other end, verifying the envelope
//! signature before ever unlocking or decrypting it.

pub mod access;
pub mod chunked;
pub mod document;
pub mod envelope;
pub mod publisher;
pub mod resolver;

pub use access::{AccessBlock, AccessCredential, IdentityGrant, UnlockSecret};
pub use document::{FileEntry, FolderMeta, IndexDocument, SegmentLocator};
pub use envelope::PublishedIndex;
pub use publisher::Publisher;
pub use resolver::Resolver;

/// Default newsgroup used when no per-folder newsgroup has been configured
/// elsewhere. The catalog does not yet persist a folder's newsgroup
/// alongside its share, so callers must pass the same value used at upload
/// time through to [`Resolver::resolve`] (see `DESIGN.md`).
pub const DEFAULT_NEWSGROUP: &str = "alt.binaries.sharevault";
