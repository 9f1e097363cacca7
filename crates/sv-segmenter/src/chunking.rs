use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use sv_core::{Error, Result};
use sv_crypto::ContentHash;

/// One fixed-size plaintext window of a file, read but not yet encrypted.
/// `index` is 0-based and dense; only the final segment of a file may be
/// shorter than the configured target size.
#[derive(Clone)]
pub struct PlaintextSegment {
    pub index: u32,
    pub data: Vec<u8>,
    pub plaintext_hash: ContentHash,
    pub is_final: bool,
}

/// Reads one file in fixed-size windows, the way the teacher's
/// `encrypt_stream` reads `chunk_size`-sized buffers from a `tokio::fs::File`
/// — except the Segmenter stops at plaintext framing and hands the window to
/// the caller rather than encrypting inline, since encryption is a
/// `sv-crypto` concern in this workspace's split.
pub struct Segmenter {
    path: PathBuf,
    target_size: usize,
}

impl Segmenter {
    pub fn new(path: impl Into<PathBuf>, target_size: usize) -> Self {
        Self { path: path.into(), target_size: target_size.max(1) }
    }

    /// Number of dense segments `[0..segment_count)` this file will produce,
    /// computed from on-disk size without reading the file body.
    pub async fn segment_count(&self) -> Result<u32> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        let size = metadata.len() as usize;
        let count = if size == 0 {
            1
        } else {
            (size + self.target_size - 1) / self.target_size
        };
        u32::try_from(count).map_err(|_| Error::InvalidInput("file too large to segment".into()))
    }

    /// Reads and hashes a single segment by index, seeking directly to its
    /// offset so random-access resume and requeue never re-read earlier
    /// segments.
    pub async fn read_segment(&self, index: u32) -> Result<PlaintextSegment> {
        let total = self.segment_count().await?;
        if index >= total {
            return Err(Error::InvalidInput(format!(
                "segment index {index} out of range (file has {total} segments)"
            )));
        }

        let mut file = File::open(&self.path).await?;
        let offset = index as u64 * self.target_size as u64;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; self.target_size];
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        let plaintext_hash = ContentHash::of(&buf);
        Ok(PlaintextSegment {
            index,
            data: buf,
            plaintext_hash,
            is_final: index + 1 == total,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }
}

/// Hashes an entire file's plaintext in one pass, independent of the
/// segment boundaries, for `files.content_hash`, which is always computed
/// over plaintext, never ciphertext. Reads in `target_size`-sized windows so
/// memory stays bounded regardless of file size.
pub async fn hash_whole_file(path: &Path, window: usize) -> Result<ContentHash> {
    let mut file = File::open(path).await?;
    let mut hasher = ContentHash::hasher();
    let mut buf = vec![0u8; window.max(4096)];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ContentHash::from_hasher(hasher))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_temp(bytes: &[u8]) -> tempfile::TempPath {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write as _;
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f.into_temp_path()
    }

    #[tokio::test]
    async fn small_file_is_a_single_final_segment() {
        let path = write_temp(b"hello").await;
        let seg = Segmenter::new(path.to_path_buf(), 1024);
        assert_eq!(seg.segment_count().await.unwrap(), 1);
        let s0 = seg.read_segment(0).await.unwrap();
        assert_eq!(s0.data, b"hello");
        assert!(s0.is_final);
    }

    #[tokio::test]
    async fn large_file_splits_into_dense_prefix() {
        let bytes = vec![0xAAu8; 10 * 1024];
        let path = write_temp(&bytes).await;
        let seg = Segmenter::new(path.to_path_buf(), 4096);
        let count = seg.segment_count().await.unwrap();
        assert_eq!(count, 3); // 4096 + 4096 + 2048

        let mut reassembled = Vec::new();
        for i in 0..count {
            let s = seg.read_segment(i).await.unwrap();
            assert_eq!(s.is_final, i + 1 == count);
            reassembled.extend_from_slice(&s.data);
        }
        assert_eq!(reassembled, bytes);
    }

    #[tokio::test]
    async fn identical_bytes_produce_identical_hashes() {
        let path_a = write_temp(b"deterministic content").await;
        let path_b = write_temp(b"deterministic content").await;
        let a = Segmenter::new(path_a.to_path_buf(), 1024).read_segment(0).await.unwrap();
        let b = Segmenter::new(path_b.to_path_buf(), 1024).read_segment(0).await.unwrap();
        assert_eq!(a.plaintext_hash, b.plaintext_hash);
    }

    #[tokio::test]
    async fn out_of_range_index_is_rejected() {
        let path = write_temp(b"hello").await;
        let seg = Segmenter::new(path.to_path_buf(), 1024);
        assert!(seg.read_segment(5).await.is_err());
    }

    #[tokio::test]
    async fn whole_file_hash_matches_manual_blake3() {
        let bytes = b"the quick brown fox jumps over the lazy dog".to_vec();
        let path = write_temp(&bytes).await;
        let hash = hash_whole_file(path.as_ref(), 16).await.unwrap();
        assert_eq!(hash, ContentHash::of(&bytes));
    }
}
