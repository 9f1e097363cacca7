use std::sync::Arc;

use sv_core::{Error, Result};
use sv_crypto::ContentKey;
use sv_transport::{CallOptions, Transport};

use crate::access::UnlockSecret;
use crate::chunked::{chunk_subject, fetch_chunked};
use crate::document::IndexDocument;
use crate::envelope::PublishedIndex;
use crate::AccessCredential;

/// How many search hits to consider before giving up: a deterministic
/// subject should realistically only ever match one article, but a few
/// slots of slack tolerate a server that returns stale or duplicate
/// listings.
const SEARCH_LIMIT: usize = 8;

/// Turns an access credential into the folder's file/segment manifest,
/// without needing any local catalog: everything it needs travels inside
/// the index article chain itself.
pub struct Resolver {
    transport: Arc<Transport>,
}

impl Resolver {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Finds the index article chain's entry message_id for `credential` by
    /// searching `newsgroup` for the deterministic chunk-0 subject derived
    /// from the credential's `share_id`, then checking each candidate
    /// against the credential's integrity prefix before trusting it (the
    /// credential never embeds the message_id directly).
    pub async fn locate_entry_message_id(&self, credential: &AccessCredential, newsgroup: &str) -> Result<String> {
        let subject = chunk_subject(&credential.share_id_hex(), 0);
        let candidates = self
            .transport
            .search(newsgroup, &subject, SEARCH_LIMIT, None, CallOptions::default())
            .await?;

        candidates
            .into_iter()
            .find(|candidate| credential.verify_index_message_id(candidate))
            .ok_or_else(|| Error::NotFound("no index article matched this access credential".into()))
    }

    pub async fn fetch_published_index(&self, entry_message_id: &str) -> Result<PublishedIndex> {
        let bytes = fetch_chunked(&self.transport, entry_message_id).await?;
        PublishedIndex::decode(&bytes)
    }

    /// Full resolution: locate the index article, fetch and reassemble it,
    /// verify the folder's signature, then unlock the session key with
    /// `secret` and decrypt the document.
    pub async fn resolve(&self, credential_str: &str, newsgroup: &str, secret: UnlockSecret) -> Result<IndexDocument> {
        let (document, _session_key) = self.resolve_with_session_key(credential_str, newsgroup, secret).await?;
        Ok(document)
    }

    /// Same resolution as [`Self::resolve`], but additionally returns the
    /// share's session key: the Downloader needs it to derive each segment's
    /// AEAD key (`sv_crypto::kdf::derive_segment_keys`) and cannot re-derive
    /// it from the document alone, since the whole point of the access block
    /// is that only a holder of the right secret can recover it.
    ///
    /// Order matters here and is not incidental: the folder signature is
    /// verified over the whole fetched envelope — access block and
    /// ciphertext both — before the session key is ever unlocked or
    /// anything is decrypted. A tampered envelope is rejected at
    /// `verify_signature`, never reaching `access.unlock` or `open`.
    pub async fn resolve_with_session_key(
        &self,
        credential_str: &str,
        newsgroup: &str,
        secret: UnlockSecret,
    ) -> Result<(IndexDocument, ContentKey)> {
        let credential = AccessCredential::decode(credential_str)?;
        let entry_message_id = self.locate_entry_message_id(&credential, newsgroup).await?;
        let published = self.fetch_published_index(&entry_message_id).await?;

        published.verify_signature()?;

        let session_key = published.access.unlock(&secret)?;
        let document = published.open(&session_key)?;

        Ok((document, session_key))
    }
}
