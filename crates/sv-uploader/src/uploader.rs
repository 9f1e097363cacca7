use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use sv_catalog::models::FolderRow;
use sv_catalog::Catalog;
use sv_core::{Config, Error, Result};
use sv_crypto::{aead, hash, kdf, ContentKey};
use sv_segmenter::{chunking, compression, Segmenter};
use sv_transport::{CallOptions, Transport};

use crate::walk::discover_files;

/// Tuning knobs specific to a single upload run; separate from [`Config`]
/// since a newsgroup and concurrency level are per-folder choices, not
/// process-wide ones.
#[derive(Clone, Debug)]
pub struct UploadOptions {
    pub newsgroup: String,
    pub segment_concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { newsgroup: "alt.binaries.sharevault".to_string(), segment_concurrency: 4 }
    }
}

/// Outcome of uploading one folder: how many files were touched and how
/// many segment postings (primary plus redundant copies) actually happened.
#[derive(Clone, Debug, Default)]
pub struct UploadSummary {
    pub files_uploaded: usize,
    pub files_unchanged: usize,
    pub segments_posted: u64,
}

/// Scans a folder, segments and encrypts every new or modified file, and
/// posts the resulting articles through the transport with the configured
/// redundancy, recording every step in the catalog as it happens so a
/// crashed run resumes from `upsert_segment`'s `pending` rows instead of
/// redoing finished work.
pub struct Uploader {
    catalog: Catalog,
    transport: Arc<Transport>,
    config: Arc<Config>,
}

impl Uploader {
    pub fn new(catalog: Catalog, transport: Arc<Transport>, config: Arc<Config>) -> Self {
        Self { catalog, transport, config }
    }

    /// Uploads every file under `folder.local_path`, using `session_key` to
    /// derive each file's segment keys. The caller supplies `session_key`
    /// directly (rather than the catalog, which never stores it in the
    /// clear) because it is generated once when the folder is created and
    /// held only in memory or wrapped inside a published share's access
    /// block.
    pub async fn upload_folder(
        &self,
        folder: &FolderRow,
        session_key: &ContentKey,
        opts: &UploadOptions,
    ) -> Result<UploadSummary> {
        let root = std::path::Path::new(&folder.local_path);
        let files = discover_files(root).await?;
        let mut summary = UploadSummary::default();

        for discovered in files {
            let changed = self
                .upload_file(folder, session_key, &discovered.relative_path, &discovered.absolute_path, opts)
                .await?;
            if changed {
                summary.files_uploaded += 1;
            } else {
                summary.files_unchanged += 1;
            }
        }

        self.catalog.bump_folder_version(&folder.folder_unique_id).await?;
        Ok(summary)
    }

    /// Segments, encrypts, and posts a single file. Returns `false` without
    /// posting anything when the file's content hash already matches the
    /// catalog's record and every primary segment is already posted, so a
    /// re-run over an unchanged tree is a cheap no-op.
    async fn upload_file(
        &self,
        folder: &FolderRow,
        session_key: &ContentKey,
        relative_path: &str,
        absolute_path: &std::path::Path,
        opts: &UploadOptions,
    ) -> Result<bool> {
        let content_hash = chunking::hash_whole_file(absolute_path, self.config.segment_size).await?;
        let metadata = tokio::fs::metadata(absolute_path).await?;
        let size = metadata.len() as i64;
        let modified_at = file_modified_at(&metadata);

        let segmenter = Segmenter::new(absolute_path, self.config.segment_size);
        let segment_count = segmenter.segment_count().await?;

        if let Ok(existing) = self.catalog.get_file(&folder.folder_unique_id, relative_path).await {
            if existing.content_hash == content_hash.to_hex()
                && self.catalog.posted_primary_count(existing.id).await? == segment_count as i64
            {
                return Ok(false);
            }
        }

        let file = self
            .catalog
            .upsert_file(
                &folder.folder_unique_id,
                relative_path,
                &content_hash.to_hex(),
                size,
                &modified_at,
                segment_count as i64,
                "uploading",
            )
            .await?;

        let redundancy = self.config.redundancy;
        let servers: Vec<String> =
            self.transport.enabled_server_names().into_iter().map(String::from).collect();
        if servers.is_empty() {
            return Err(Error::TransportTerminal("no enabled servers configured for upload".into()));
        }

        let jobs = (0..segment_count).map(|segment_index| SegmentJob {
            file_id: file.id,
            folder_id: folder.folder_unique_id.clone(),
            relative_path: relative_path.to_string(),
            segment_index,
        });

        let newsgroup = opts.newsgroup.clone();
        let results: Vec<Result<u64>> = stream::iter(jobs)
            .map(|job| {
                let segmenter_path = absolute_path.to_path_buf();
                let target_size = self.config.segment_size;
                let session_key = session_key.clone();
                let servers = servers.clone();
                let newsgroup = newsgroup.clone();
                async move {
                    self.upload_segment(job, &segmenter_path, target_size, &session_key, redundancy, &servers, &newsgroup)
                        .await
                }
            })
            .buffer_unordered(opts.segment_concurrency.max(1))
            .collect()
            .await;

        let mut posted = 0u64;
        for result in results {
            posted += result?;
        }

        self.catalog.set_file_state(file.id, "uploaded").await?;
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_segment(
        &self,
        job: SegmentJob,
        path: &std::path::Path,
        target_size: usize,
        session_key: &ContentKey,
        redundancy: u32,
        servers: &[String],
        newsgroup: &str,
    ) -> Result<u64> {
        let segmenter = Segmenter::new(path, target_size);
        let plaintext = segmenter.read_segment(job.segment_index).await?;
        let envelope = compression::pack_segment(&plaintext.data);

        let (aead_key, nonce_seed) = kdf::derive_segment_keys(session_key.expose(), &job.relative_path)?;
        let segment_aad = aead::segment_aad(&job.folder_id, &job.relative_path, job.segment_index, 0);

        let mut posted = 0u64;
        for redundancy_index in 0..redundancy.max(1) {
            let nonce = aead::derive_nonce(&nonce_seed, &job.relative_path, job.segment_index, redundancy_index);
            let aad = if redundancy_index == 0 {
                segment_aad.clone()
            } else {
                aead::segment_aad(&job.folder_id, &job.relative_path, job.segment_index, redundancy_index)
            };
            let ciphertext = aead::seal(&aead_key, &nonce, &aad, &envelope)?;
            let ciphertext_hash = hash::ContentHash::of(&ciphertext);

            let subject_bytes = hash::subject_label(
                session_key.expose(),
                &job.folder_id,
                &job.relative_path,
                job.segment_index,
                redundancy_index,
            );
            let subject = format!("sv-seg-{}", hex::encode(subject_bytes));

            let article = sv_segmenter::encode_article(&ciphertext, &subject, sv_segmenter::framing::DEFAULT_FRAME_LINE_WIDTH);

            let segment = self
                .catalog
                .upsert_segment(
                    job.file_id,
                    job.segment_index as i64,
                    &plaintext.plaintext_hash.to_hex(),
                    &ciphertext_hash.to_hex(),
                    article.len() as i64,
                    newsgroup,
                    &hex::encode(subject_bytes),
                    redundancy_index as i64,
                    "pending",
                )
                .await?;

            let prefer = servers.get(
                (job.segment_index as usize + redundancy_index as usize) % servers.len(),
            );

            match self
                .transport
                .post(&subject, &article, newsgroup, prefer.map(String::as_str), CallOptions::default())
                .await
            {
                Ok(message_id) => {
                    self.catalog.mark_segment_posted(segment.id, &message_id).await?;
                    posted += 1;
                }
                Err(e) => {
                    self.catalog.mark_segment_failed(segment.id).await?;
                    return Err(e);
                }
            }
        }

        Ok(posted)
    }
}

struct SegmentJob {
    file_id: i64,
    folder_id: String,
    relative_path: String,
    segment_index: u32,
}

fn file_modified_at(metadata: &std::fs::Metadata) -> String {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(modified).to_rfc3339()
}
