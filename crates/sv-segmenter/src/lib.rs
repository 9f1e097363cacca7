//! Turns a file on disk into a lazy sequence of fixed-size plaintext
//! segments, and frames already-encrypted segment ciphertext into the
//! printable-safe article body the transport posts. Encryption itself lives
//! in `sv-crypto`; this crate only produces and consumes the bytes either
//! side of it.

pub mod chunking;
pub mod compression;
pub mod framing;

pub use chunking::{PlaintextSegment, Segmenter};
pub use compression::{compress_if_smaller, pack_segment, unpack_segment};
pub use framing::{decode_article, encode_article, ArticleBody};
