//! Symmetric encryption, key wrapping, KDFs, signatures, and identity proofs
//! for sharevault. Every primitive here is named by role, not
//! by library, so callers in other crates never reach for a raw cipher type
//! directly.

pub mod aead;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod keys;
pub mod sign;

pub use hash::ContentHash;
pub use keys::{ContentKey, FolderSigningKey, SegmentKeys};
