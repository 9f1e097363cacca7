use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use sv_core::Result;

/// Sibling directory under the destination root that partial files are
/// staged into before an atomic rename, mirroring the teacher's
/// `NamedTempFile::new_in(output_dir)` + `persist` idiom except the staging
/// path is stable (not randomly named) so a killed process can find and
/// resume it on restart instead of losing track of it.
const STAGING_DIR_NAME: &str = ".sharevault-staging";

/// Where a file's partial bytes live while its segments are still being
/// fetched, mirroring `relative_path`'s own directory structure under the
/// staging root so two files named the same in different subdirectories
/// never collide.
pub fn staging_path(destination: &Path, relative_path: &str) -> PathBuf {
    destination.join(STAGING_DIR_NAME).join(format!("{relative_path}.part"))
}

pub fn final_path(destination: &Path, relative_path: &str) -> PathBuf {
    destination.join(relative_path)
}

/// Opens a file's staging buffer for appending, creating parent directories
/// as needed. `resume` reuses the existing partial file (assumed to already
/// hold however many segments the catalog recorded as fetched); otherwise
/// the file is created fresh, truncating any stale partial left by an
/// abandoned attempt.
pub async fn open_for_append(path: &Path, resume: bool) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .truncate(!resume)
        .open(path)
        .await?;
    Ok(file)
}

pub async fn append_segment(file: &mut File, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Truncates a resumed staging file to exactly `expected_len` bytes before
/// any further segment is appended.
///
/// `append_segment` and the catalog's `record_fetched_segment` are two
/// separate writes, not one atomic step: a crash in between leaves a
/// segment's plaintext sitting in the staging file without a matching
/// catalog row. Left alone, resuming from `fetched_segments().len()` would
/// re-fetch and re-append that same segment on top of the bytes already
/// there, duplicating it. Truncating to the length the catalog actually
/// recorded discards any such orphaned tail before resume continues, so the
/// file's length always matches its recorded segment count exactly.
pub async fn truncate_to(path: &Path, expected_len: u64) -> Result<()> {
    let file = match OpenOptions::new().write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    file.set_len(expected_len).await?;
    Ok(())
}

/// Moves a fully verified staging file into its final place, creating the
/// destination's parent directories first. `rename` is atomic as long as
/// both paths share a filesystem, which they do here since staging lives
/// under the destination root itself.
pub async fn finalize(staging: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(staging, destination).await?;
    Ok(())
}

/// Removes a staging file that turned out to be corrupt, so a subsequent
/// resume attempt starts that file over rather than trusting bytes that
/// failed verification.
pub async fn discard(staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(staging).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %staging.display(), error = %e, "failed to discard corrupt staging file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_finalize_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_path(dir.path(), "sub/a.txt");
        let mut file = open_for_append(&staging, false).await.unwrap();
        append_segment(&mut file, b"hello ").await.unwrap();
        append_segment(&mut file, b"world").await.unwrap();
        drop(file);

        let dest = final_path(dir.path(), "sub/a.txt");
        finalize(&staging, &dest).await.unwrap();

        let contents = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(contents, b"hello world");
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn resume_append_continues_existing_partial() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_path(dir.path(), "b.bin");
        {
            let mut file = open_for_append(&staging, false).await.unwrap();
            append_segment(&mut file, b"first").await.unwrap();
        }
        {
            let mut file = open_for_append(&staging, true).await.unwrap();
            append_segment(&mut file, b"second").await.unwrap();
        }
        let contents = tokio::fs::read(&staging).await.unwrap();
        assert_eq!(contents, b"firstsecond");
    }

    #[tokio::test]
    async fn discard_removes_the_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_path(dir.path(), "c.txt");
        let mut file = open_for_append(&staging, false).await.unwrap();
        append_segment(&mut file, b"partial").await.unwrap();
        drop(file);

        discard(&staging).await;
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn discard_of_missing_file_does_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_path(dir.path(), "missing.txt");
        discard(&staging).await;
    }

    #[tokio::test]
    async fn truncate_to_drops_an_orphaned_unrecorded_tail() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_path(dir.path(), "d.bin");
        {
            let mut file = open_for_append(&staging, false).await.unwrap();
            append_segment(&mut file, b"first").await.unwrap();
            // Simulates a crash after this segment's bytes were appended
            // but before the catalog recorded it as fetched: an extra
            // segment's worth of bytes makes it to disk with no matching
            // record of how much of the file that represents.
            append_segment(&mut file, b"orphaned-segment").await.unwrap();
        }

        // Resume believes only "first" (5 bytes) was ever recorded.
        truncate_to(&staging, 5).await.unwrap();
        {
            let mut file = open_for_append(&staging, true).await.unwrap();
            append_segment(&mut file, b"second").await.unwrap();
        }

        let contents = tokio::fs::read(&staging).await.unwrap();
        assert_eq!(contents, b"firstsecond");
    }

    #[tokio::test]
    async fn truncate_to_of_missing_file_does_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_path(dir.path(), "missing.bin");
        truncate_to(&staging, 0).await.unwrap();
    }
}
