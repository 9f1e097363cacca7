use std::collections::BTreeMap;
use std::sync::Arc;

use rand_core::RngCore;

use sv_catalog::models::FolderRow;
use sv_catalog::pagination::Page;
use sv_catalog::Catalog;
use sv_core::{Error, Result};
use sv_crypto::keys::FolderSigningKey;
use sv_crypto::ContentKey;
use sv_transport::Transport;

use crate::access::AccessBlock;
use crate::chunked::post_chunked;
use crate::document::{FileEntry, FolderMeta, IndexDocument, SegmentLocator};
use crate::envelope::PublishedIndex;
use crate::AccessCredential;

const INDEX_DOCUMENT_VERSION: u32 = 1;

/// Builds and posts a folder's index document, wrapping its session key
/// per the requested share mode and recording the resulting share in the
/// catalog.
pub struct Publisher {
    catalog: Catalog,
    transport: Arc<Transport>,
}

impl Publisher {
    pub fn new(catalog: Catalog, transport: Arc<Transport>) -> Self {
        Self { catalog, transport }
    }

    /// Assembles the file/segment manifest for `folder` from whatever the
    /// catalog has already recorded as posted. Fails if any file has
    /// segments that are not yet `posted`, since a partially-uploaded
    /// folder has no business being published.
    pub async fn build_index_document(&self, folder: &FolderRow, signing_key: &FolderSigningKey, share_mode: &str) -> Result<IndexDocument> {
        let mut files = Vec::new();
        let mut page = Page::first(256);

        loop {
            let rows = self.catalog.iter_files(&folder.folder_unique_id, &page).await?;
            if rows.is_empty() {
                break;
            }
            let exhausted = rows.len() < page.limit as usize;
            let last_path = rows.last().map(|r| r.relative_path.clone());

            for file in &rows {
                let segment_rows = self.catalog.iter_segments(file.id).await?;
                let mut grouped: BTreeMap<i64, Vec<(i64, String)>> = BTreeMap::new();
                for seg in segment_rows {
                    if !seg.is_posted() {
                        return Err(Error::InvalidInput(format!(
                            "file {} segment {} is not fully posted yet",
                            file.relative_path, seg.segment_index
                        )));
                    }
                    grouped.entry(seg.segment_index).or_default().push((
                        seg.redundancy_index,
                        seg.message_id.expect("is_posted() guarantees message_id is set"),
                    ));
                }

                let mut segments = Vec::with_capacity(grouped.len());
                for (_, mut copies) in grouped {
                    copies.sort_by_key(|(redundancy_index, _)| *redundancy_index);
                    segments.push(SegmentLocator {
                        message_ids: copies.into_iter().map(|(_, message_id)| message_id).collect(),
                    });
                }

                files.push(FileEntry {
                    path: file.relative_path.clone(),
                    size: file.size as u64,
                    content_hash: file.content_hash.clone(),
                    segments,
                });
            }

            if exhausted {
                break;
            }
            page = Page::after(last_path.expect("non-empty page has a last row"), 256);
        }

        Ok(IndexDocument {
            version: INDEX_DOCUMENT_VERSION,
            folder: FolderMeta {
                folder_id: folder.folder_unique_id.clone(),
                name: folder.display_name.clone(),
                public_key: signing_key.verifying_key().to_bytes(),
                share_mode: share_mode.to_string(),
            },
            files,
        })
    }

    /// Publishes `folder` under the given access block, posting the signed
    /// and encrypted index as a chunked article chain and recording the
    /// resulting share in the catalog. Returns the access credential.
    async fn publish_with_access(
        &self,
        folder: &FolderRow,
        signing_key: &FolderSigningKey,
        session_key: &ContentKey,
        access: AccessBlock,
        newsgroup: &str,
        expires_at: Option<&str>,
        password_hint: Option<&str>,
    ) -> Result<String> {
        let document = self.build_index_document(folder, signing_key, access.share_mode()).await?;
        let folder_public_key = signing_key.verifying_key().to_bytes();
        let published = PublishedIndex::seal(INDEX_DOCUMENT_VERSION, folder_public_key, access.clone(), session_key, &document, signing_key)?;
        let bytes = published.encode()?;

        let mut share_id = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut share_id);
        let share_id_hex = hex::encode(share_id);

        let entry_message_id = post_chunked(&self.transport, newsgroup, &share_id_hex, &bytes).await?;

        self.catalog
            .create_share(&share_id_hex, &folder.folder_unique_id, access.share_mode(), &entry_message_id, expires_at, password_hint)
            .await?;
        self.catalog.bump_folder_version(&folder.folder_unique_id).await?;

        let credential = AccessCredential::new(share_id, &entry_message_id);
        tracing::info!(folder = %folder.folder_unique_id, share_mode = access.share_mode(), "folder published");
        Ok(credential.encode())
    }

    pub async fn publish_open(
        &self,
        folder: &FolderRow,
        signing_key: &FolderSigningKey,
        session_key: &ContentKey,
        newsgroup: &str,
        expires_at: Option<&str>,
    ) -> Result<String> {
        let access = AccessBlock::open(session_key);
        self.publish_with_access(folder, signing_key, session_key, access, newsgroup, expires_at, None).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn publish_identity(
        &self,
        folder: &FolderRow,
        signing_key: &FolderSigningKey,
        session_key: &ContentKey,
        owner_identity_secret: &[u8; 32],
        users: &[(String, [u8; 32])],
        newsgroup: &str,
        expires_at: Option<&str>,
    ) -> Result<String> {
        let access = AccessBlock::identity(session_key, owner_identity_secret, users)?;
        self.publish_with_access(folder, signing_key, session_key, access, newsgroup, expires_at, None).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn publish_password(
        &self,
        folder: &FolderRow,
        signing_key: &FolderSigningKey,
        session_key: &ContentKey,
        password: &[u8],
        argon2_memory_kib: u32,
        password_hint: Option<&str>,
        newsgroup: &str,
        expires_at: Option<&str>,
    ) -> Result<String> {
        let access = AccessBlock::password(session_key, password, argon2_memory_kib, password_hint.map(str::to_string))?;
        self.publish_with_access(folder, signing_key, session_key, access, newsgroup, expires_at, password_hint).await
    }
}
