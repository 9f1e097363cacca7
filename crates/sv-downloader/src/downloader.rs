use std::sync::Arc;

use futures::stream::{self, StreamExt};

use sv_catalog::Catalog;
use sv_core::{Error, Result};
use sv_crypto::{aead, kdf, ContentKey};
use sv_publisher::{AccessCredential, FileEntry, Resolver, UnlockSecret};
use sv_segmenter::{chunking, compression, decode_article};
use sv_transport::{CallOptions, Transport};

use crate::staging;

/// Tuning knobs specific to a single download run, mirroring `sv-uploader`'s
/// `UploadOptions` split from process-wide [`sv_core::Config`].
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    pub newsgroup: String,
    pub file_concurrency: usize,
    /// How many times to retry the *same* redundant copy on a retryable
    /// transport error before falling through to the next copy in
    /// `SegmentLocator::message_ids`.
    pub retry_limit: u32,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            newsgroup: sv_publisher::DEFAULT_NEWSGROUP.to_string(),
            file_concurrency: 4,
            retry_limit: 3,
        }
    }
}

/// Outcome of one `download` call.
#[derive(Clone, Debug, Default)]
pub struct DownloadSummary {
    pub session_id: String,
    pub files_completed: usize,
    pub files_failed: usize,
    pub bytes_written: u64,
}

/// Turns an access credential plus an unlock secret into files staged under
/// `destination`, tracking per-file and per-segment progress in the catalog
/// so a killed-and-restarted run resumes instead of starting over.
pub struct Downloader {
    catalog: Catalog,
    transport: Arc<Transport>,
}

impl Downloader {
    pub fn new(catalog: Catalog, transport: Arc<Transport>) -> Self {
        Self { catalog, transport }
    }

    pub async fn download(
        &self,
        credential_str: &str,
        destination: &std::path::Path,
        secret: UnlockSecret,
        opts: &DownloadOptions,
    ) -> Result<DownloadSummary> {
        // Validate shape early: a malformed credential should fail before we
        // touch the catalog or network at all.
        AccessCredential::decode(credential_str)?;

        let resolver = Resolver::new(self.transport.clone());
        let (document, session_key) =
            resolver.resolve_with_session_key(credential_str, &opts.newsgroup, secret).await?;

        let destination_str = destination.to_string_lossy().to_string();
        let total_files = document.files.len() as i64;
        let total_size: i64 = document.files.iter().map(|f| f.size as i64).sum();

        let session_id = match self
            .catalog
            .find_resumable_session(credential_str, &destination_str)
            .await?
        {
            Some(existing) => {
                tracing::info!(session_id = %existing.session_id, "resuming download session");
                existing.session_id
            }
            None => {
                let session_id = sv_core::ids::random_id(16);
                self.catalog
                    .open_session(&session_id, credential_str, &destination_str, total_files, total_size)
                    .await?;
                session_id
            }
        };

        let file_rows: Vec<(String, i64, String)> = document
            .files
            .iter()
            .map(|f| (f.path.clone(), f.size as i64, f.content_hash.clone()))
            .collect();
        self.catalog.init_session_files(&session_id, &file_rows).await?;

        self.catalog.advance_session(&session_id, 0, 0, Some("fetching"), None).await?;

        let folder_id = document.folder.folder_id.clone();
        let results: Vec<Result<FileOutcome>> = stream::iter(document.files.iter())
            .map(|file| {
                let session_id = session_id.clone();
                let folder_id = folder_id.clone();
                let session_key = session_key.clone();
                async move {
                    self.download_file(&session_id, &folder_id, file, &session_key, destination, opts)
                        .await
                }
            })
            .buffer_unordered(opts.file_concurrency.max(1))
            .collect()
            .await;

        let mut summary = DownloadSummary { session_id: session_id.clone(), ..Default::default() };
        let mut done_files = 0i64;
        let mut done_size = 0i64;
        let mut first_error: Option<String> = None;

        for result in results {
            match result {
                Ok(FileOutcome::Completed { size }) => {
                    summary.files_completed += 1;
                    summary.bytes_written += size;
                    done_files += 1;
                    done_size += size as i64;
                }
                Ok(FileOutcome::AlreadyCompleted { size }) => {
                    summary.files_completed += 1;
                    summary.bytes_written += size;
                    done_files += 1;
                    done_size += size as i64;
                }
                Ok(FileOutcome::Failed { path, error }) => {
                    summary.files_failed += 1;
                    first_error.get_or_insert_with(|| format!("{path}: {error}"));
                }
                Err(e) => {
                    summary.files_failed += 1;
                    first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let final_state = if summary.files_failed == 0 { "completed" } else { "failed" };
        self.catalog
            .advance_session(&session_id, done_files, done_size, Some(final_state), first_error.as_deref())
            .await?;

        Ok(summary)
    }

    async fn download_file(
        &self,
        session_id: &str,
        folder_id: &str,
        file: &FileEntry,
        session_key: &ContentKey,
        destination: &std::path::Path,
        opts: &DownloadOptions,
    ) -> Result<FileOutcome> {
        let session_file = self.catalog.get_session_file(session_id, &file.path).await?;
        if session_file.state == "completed" {
            return Ok(FileOutcome::AlreadyCompleted { size: file.size });
        }

        self.catalog.set_session_file_state(session_id, &file.path, "fetching", None).await?;

        let already_fetched = self.catalog.fetched_segments(session_id, &file.path).await?;
        let resume_from = already_fetched.len() as u32;
        let recorded_len: u64 = already_fetched.iter().map(|s| s.decoded_size as u64).sum();

        let staging_path = staging::staging_path(destination, &file.path);
        // A crash between appending a segment's plaintext and recording it
        // in the catalog leaves an orphaned tail the catalog doesn't know
        // about; truncate back to exactly what's recorded before resuming
        // appends, so that tail is never duplicated underneath it.
        if resume_from > 0 {
            staging::truncate_to(&staging_path, recorded_len).await?;
        }
        let mut staging_file = staging::open_for_append(&staging_path, resume_from > 0).await?;

        let (aead_key, nonce_seed) = kdf::derive_segment_keys(session_key.expose(), &file.path)?;

        for segment_index in resume_from..file.segments.len() as u32 {
            let locator = &file.segments[segment_index as usize];
            let plaintext = self
                .fetch_segment(
                    locator,
                    folder_id,
                    &file.path,
                    segment_index,
                    &aead_key,
                    &nonce_seed,
                    opts,
                )
                .await;

            let (plaintext, redundancy_index) = match plaintext {
                Ok(found) => found,
                Err(e) => {
                    drop(staging_file);
                    staging::discard(&staging_path).await;
                    let message = e.to_string();
                    self.catalog.set_session_file_state(session_id, &file.path, "failed", Some(&message)).await?;
                    return Ok(FileOutcome::Failed { path: file.path.clone(), error: message });
                }
            };

            staging::append_segment(&mut staging_file, &plaintext).await?;
            self.catalog
                .record_fetched_segment(
                    session_id,
                    &file.path,
                    segment_index as i64,
                    redundancy_index as i64,
                    plaintext.len() as i64,
                )
                .await?;
        }
        drop(staging_file);

        let hash = chunking::hash_whole_file(&staging_path, 1024 * 1024).await?;
        if hash.to_hex() != file.content_hash {
            staging::discard(&staging_path).await;
            let message = format!(
                "content hash mismatch for {}: expected {}, got {}",
                file.path, file.content_hash, hash.to_hex()
            );
            self.catalog.set_session_file_state(session_id, &file.path, "failed", Some(&message)).await?;
            return Ok(FileOutcome::Failed { path: file.path.clone(), error: message });
        }

        let final_path = staging::final_path(destination, &file.path);
        staging::finalize(&staging_path, &final_path).await?;
        self.catalog.set_session_file_state(session_id, &file.path, "completed", None).await?;

        Ok(FileOutcome::Completed { size: file.size })
    }

    /// Tries every redundant copy of one segment in order, retrying each
    /// copy up to `opts.retry_limit` times while the failure is retryable.
    /// Returns the decrypted, decompressed plaintext plus which copy
    /// supplied it.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_segment(
        &self,
        locator: &sv_publisher::SegmentLocator,
        folder_id: &str,
        relative_path: &str,
        segment_index: u32,
        aead_key: &ContentKey,
        nonce_seed: &[u8; 16],
        opts: &DownloadOptions,
    ) -> Result<(Vec<u8>, u32)> {
        let mut last_err = Error::NotFound(format!("segment {segment_index} of {relative_path} has no copies"));

        for (redundancy_index, message_id) in locator.message_ids.iter().enumerate() {
            let redundancy_index = redundancy_index as u32;
            let mut attempt = 0u32;
            loop {
                match self
                    .fetch_one_copy(message_id, folder_id, relative_path, segment_index, redundancy_index, aead_key, nonce_seed)
                    .await
                {
                    Ok(plaintext) => return Ok((plaintext, redundancy_index)),
                    Err(e) => {
                        attempt += 1;
                        let retryable = e.is_retryable();
                        last_err = e;
                        if !retryable || attempt >= opts.retry_limit.max(1) {
                            break;
                        }
                    }
                }
            }
        }

        Err(last_err)
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_one_copy(
        &self,
        message_id: &str,
        folder_id: &str,
        relative_path: &str,
        segment_index: u32,
        redundancy_index: u32,
        aead_key: &ContentKey,
        nonce_seed: &[u8; 16],
    ) -> Result<Vec<u8>> {
        let body = self.transport.retrieve(message_id, None, CallOptions::default()).await?;
        let article = decode_article(&body)?;

        let nonce = aead::derive_nonce(nonce_seed, relative_path, segment_index, redundancy_index);
        let aad = aead::segment_aad(folder_id, relative_path, segment_index, redundancy_index);
        let envelope = aead::open(aead_key, &nonce, &aad, &article.bytes)?;
        compression::unpack_segment(&envelope)
    }
}

enum FileOutcome {
    Completed { size: u64 },
    AlreadyCompleted { size: u64 },
    Failed { path: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_target_the_default_newsgroup() {
        let opts = DownloadOptions::default();
        assert_eq!(opts.newsgroup, sv_publisher::DEFAULT_NEWSGROUP);
        assert!(opts.file_concurrency > 0);
        assert!(opts.retry_limit > 0);
    }
}
