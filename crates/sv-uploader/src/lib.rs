//! Scans a local folder, segments and encrypts each file, and posts the
//! resulting articles through `sv-transport` with configured redundancy,
//! recording every step in `sv-catalog` as it happens.

mod uploader;
mod walk;

pub use uploader::{UploadOptions, UploadSummary, Uploader};
pub use walk::{discover_files, DiscoveredFile};
