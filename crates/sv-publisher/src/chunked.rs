use serde::{Deserialize, Serialize};

use sv_core::{Error, Result};
use sv_segmenter::framing::DEFAULT_FRAME_LINE_WIDTH;
use sv_segmenter::{decode_article, encode_article};
use sv_transport::{CallOptions, Transport};

/// Maximum payload carried by a single chunk article, chosen well under a
/// typical server's article-size ceiling once yEnc framing's ~1.4x
/// expansion is applied.
const MAX_CHUNK_BYTES: usize = 256 * 1024;

/// One link in the reverse-posted chain an index document travels as.
/// `next` points at the chunk immediately *after* this one in document
/// order, even though that chunk was posted *before* this one — see
/// [`post_chunked`].
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChunkRecord {
    index: u32,
    total: u32,
    payload: Vec<u8>,
    next: Option<String>,
}

/// Deterministic subject for chunk `index` of `share_id_hex`'s index
/// article. Chunk 0's subject is the one a resolver without a local
/// catalog can reconstruct from the access credential alone and search for.
pub fn chunk_subject(share_id_hex: &str, index: u32) -> String {
    format!("sv-share-{share_id_hex}-{index}")
}

/// Splits `bytes` into fixed-size chunks and posts them last-chunk-first,
/// so each earlier chunk's `next` field can embed the already-known
/// message_id of the chunk that follows it. Returns chunk 0's message_id,
/// the entry point a resolver fetches and then walks forward through
/// `next` links to reassemble the whole document.
pub async fn post_chunked(
    transport: &Transport,
    newsgroup: &str,
    share_id_hex: &str,
    bytes: &[u8],
) -> Result<String> {
    let chunks: Vec<&[u8]> = if bytes.is_empty() { vec![&bytes[..]] } else { bytes.chunks(MAX_CHUNK_BYTES).collect() };
    let total = chunks.len() as u32;

    let mut next: Option<String> = None;
    for (i, payload) in chunks.into_iter().enumerate().rev() {
        let record = ChunkRecord { index: i as u32, total, payload: payload.to_vec(), next: next.clone() };
        let encoded = postcard::to_allocvec(&record)
            .map_err(|e| Error::Internal(format!("index chunk encode failed: {e}")))?;
        let subject = chunk_subject(share_id_hex, i as u32);
        let article = encode_article(&encoded, &subject, DEFAULT_FRAME_LINE_WIDTH);
        let message_id = transport.post(&subject, &article, newsgroup, None, CallOptions::default()).await?;
        next = Some(message_id);
    }

    next.ok_or_else(|| Error::Internal("post_chunked produced no chunks".into()))
}

/// Fetches an index article chain starting at `entry_message_id` and
/// concatenates payloads back into original document order.
pub async fn fetch_chunked(transport: &Transport, entry_message_id: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut current = entry_message_id.to_string();
    let mut seen = 0u32;

    loop {
        let body = transport.retrieve(&current, None, CallOptions::default()).await?;
        let article = decode_article(&body)?;
        let record: ChunkRecord = postcard::from_bytes(&article.bytes)
            .map_err(|e| Error::IntegrityFailure(format!("index chunk decode failed: {e}")))?;

        out.extend_from_slice(&record.payload);
        seen += 1;
        if seen > record.total {
            return Err(Error::IntegrityFailure("index chunk chain exceeded its declared length".into()));
        }

        match record.next {
            Some(next_id) => current = next_id,
            None => break,
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_subject_is_deterministic_per_index() {
        assert_eq!(chunk_subject("abc", 0), "sv-share-abc-0");
        assert_ne!(chunk_subject("abc", 0), chunk_subject("abc", 1));
    }
}
