//! Turns an access credential into files on disk: resolves the share's
//! index through `sv-publisher`, retrieves and decrypts every segment
//! through `sv-transport`/`sv-crypto`, verifies each file's content hash,
//! and stages it atomically into the destination directory. Progress is
//! tracked per file and per segment in `sv-catalog` so a killed process
//! resumes instead of redownloading a share from scratch.

mod downloader;
mod staging;

pub use downloader::{DownloadOptions, DownloadSummary, Downloader};
