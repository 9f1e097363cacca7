use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use sv_core::{Error, Result};

use crate::error::from_sqlx;
use crate::models::{
    DownloadSessionRow, FileRow, FolderRow, SegmentRow, SessionFileRow, SessionSegmentRow, ShareRow,
    StateCount, UserRow,
};
use crate::pagination::Page;
use crate::schema::SCHEMA;

/// Durable, ordered store for users, folders, files, segments, shares, and
/// download sessions, backed by SQLite in WAL mode (see `DESIGN.md` for the
/// dependency grounding). Single writer connection, many reader connections: the
/// pool below is sized so that exactly one connection is ever used for
/// writes at a time, the way the teacher's bitcask `Handle` serializes
/// writers behind one logical path while readers are drawn from a queue.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Opens (creating if absent) the SQLite database at `path` and applies
    /// the schema. `max_connections` bounds the reader pool; writes are
    /// additionally serialized by SQLite's own locking in WAL mode.
    pub async fn open(path: &std::path::Path, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| Error::InvalidInput(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(from_sqlx)?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(from_sqlx)?;

        tracing::info!(path = %path.display(), max_connections, "catalog opened");
        Ok(Self { pool })
    }

    /// An in-memory catalog for tests: same schema, no file on disk.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect("sqlite::memory:")
            .await
            .map_err(from_sqlx)?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(from_sqlx)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- users -----------------------------------------------------

    pub async fn create_user(
        &self,
        user_id: &str,
        display_name: &str,
        email: Option<&str>,
        public_key: &[u8],
        wrapped_private_key: &[u8],
    ) -> Result<UserRow> {
        let created_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (user_id, display_name, email, public_key, wrapped_private_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(email)
        .bind(public_key)
        .bind(wrapped_private_key)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        tracing::debug!(user_id, "user created");
        Ok(UserRow {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            email: email.map(str::to_string),
            public_key: public_key.to_vec(),
            wrapped_private_key: wrapped_private_key.to_vec(),
            created_at,
        })
    }

    // ---- folders ----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_folder(
        &self,
        folder_unique_id: &str,
        local_path: &str,
        display_name: &str,
        share_mode: &str,
        owner_user_id: Option<&str>,
        signing_public_key: &[u8],
        wrapped_signing_private_key: &[u8],
    ) -> Result<FolderRow> {
        sqlx::query(
            "INSERT INTO folders
                (folder_unique_id, local_path, display_name, share_mode, owner_user_id,
                 version, total_files, total_size, state, signing_public_key, wrapped_signing_private_key)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, 'active', ?6, ?7)",
        )
        .bind(folder_unique_id)
        .bind(local_path)
        .bind(display_name)
        .bind(share_mode)
        .bind(owner_user_id)
        .bind(signing_public_key)
        .bind(wrapped_signing_private_key)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        tracing::info!(folder_unique_id, share_mode, "folder created");
        self.get_folder(folder_unique_id).await
    }

    pub async fn get_folder(&self, folder_id: &str) -> Result<FolderRow> {
        sqlx::query_as::<_, FolderRow>("SELECT * FROM folders WHERE folder_unique_id = ?1")
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("folder {folder_id}")))
    }

    pub async fn list_folders(&self, owner: Option<&str>) -> Result<Vec<FolderRow>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query_as::<_, FolderRow>(
                    "SELECT * FROM folders WHERE owner_user_id = ?1 ORDER BY folder_unique_id",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, FolderRow>("SELECT * FROM folders ORDER BY folder_unique_id")
                    .fetch_all(&self.pool)
                    .await
            }
        };
        rows.map_err(from_sqlx)
    }

    /// Increments a folder's `version` after a successful publish.
    pub async fn bump_folder_version(&self, folder_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE folders SET version = version + 1 WHERE folder_unique_id = ?1 RETURNING version",
        )
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("folder {folder_id}")))?;
        Ok(row.0)
    }

    // ---- files --------------------------------------------------------

    /// Inserts a file, or updates it in place if `(folder_id, relative_path)`
    /// already exists, since that pair is a file's identity.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_file(
        &self,
        folder_id: &str,
        relative_path: &str,
        content_hash: &str,
        size: i64,
        modified_at: &str,
        segment_count: i64,
        state: &str,
    ) -> Result<FileRow> {
        sqlx::query(
            "INSERT INTO files (folder_id, relative_path, content_hash, size, modified_at, version, segment_count, state)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)
             ON CONFLICT (folder_id, relative_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                size = excluded.size,
                modified_at = excluded.modified_at,
                version = files.version + 1,
                segment_count = excluded.segment_count,
                state = excluded.state",
        )
        .bind(folder_id)
        .bind(relative_path)
        .bind(content_hash)
        .bind(size)
        .bind(modified_at)
        .bind(segment_count)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE folder_id = ?1 AND relative_path = ?2",
        )
        .bind(folder_id)
        .bind(relative_path)
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    /// Keyset-paginated file listing, ordered by `relative_path`.
    pub async fn iter_files(&self, folder_id: &str, page: &Page) -> Result<Vec<FileRow>> {
        let rows = match &page.after_relative_path {
            Some(after) => {
                sqlx::query_as::<_, FileRow>(
                    "SELECT * FROM files WHERE folder_id = ?1 AND relative_path > ?2
                     ORDER BY relative_path LIMIT ?3",
                )
                .bind(folder_id)
                .bind(after)
                .bind(page.limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, FileRow>(
                    "SELECT * FROM files WHERE folder_id = ?1 ORDER BY relative_path LIMIT ?2",
                )
                .bind(folder_id)
                .bind(page.limit)
                .fetch_all(&self.pool)
                .await
            }
        };
        rows.map_err(from_sqlx)
    }

    pub async fn get_file(&self, folder_id: &str, relative_path: &str) -> Result<FileRow> {
        sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE folder_id = ?1 AND relative_path = ?2")
            .bind(folder_id)
            .bind(relative_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("file {folder_id}/{relative_path}")))
    }

    pub async fn set_file_state(&self, file_id: i64, state: &str) -> Result<()> {
        sqlx::query("UPDATE files SET state = ?1 WHERE id = ?2")
            .bind(state)
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }

    // ---- segments -------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_segment(
        &self,
        file_id: i64,
        segment_index: i64,
        plaintext_hash: &str,
        ciphertext_hash: &str,
        size: i64,
        newsgroup: &str,
        subject_hash: &str,
        redundancy_index: i64,
        state: &str,
    ) -> Result<SegmentRow> {
        sqlx::query(
            "INSERT INTO segments
                (file_id, segment_index, plaintext_hash, ciphertext_hash, size, newsgroup,
                 subject_hash, redundancy_index, state, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
             ON CONFLICT (file_id, segment_index, redundancy_index) DO UPDATE SET
                plaintext_hash = excluded.plaintext_hash,
                ciphertext_hash = excluded.ciphertext_hash,
                size = excluded.size,
                newsgroup = excluded.newsgroup,
                subject_hash = excluded.subject_hash,
                state = excluded.state",
        )
        .bind(file_id)
        .bind(segment_index)
        .bind(plaintext_hash)
        .bind(ciphertext_hash)
        .bind(size)
        .bind(newsgroup)
        .bind(subject_hash)
        .bind(redundancy_index)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        sqlx::query_as::<_, SegmentRow>(
            "SELECT * FROM segments WHERE file_id = ?1 AND segment_index = ?2 AND redundancy_index = ?3",
        )
        .bind(file_id)
        .bind(segment_index)
        .bind(redundancy_index)
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    /// Records a successful post. The only path that sets `state = 'posted'`
    /// is this one, and it always writes a non-empty `message_id` in the
    /// same statement, so the two can never drift apart.
    pub async fn mark_segment_posted(&self, segment_id: i64, message_id: &str) -> Result<()> {
        if message_id.is_empty() {
            return Err(Error::InvalidInput("message_id must not be empty".into()));
        }
        let posted_at = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE segments SET state = 'posted', message_id = ?1, posted_at = ?2 WHERE id = ?3",
        )
        .bind(message_id)
        .bind(&posted_at)
        .bind(segment_id)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(format!("segment {segment_id}")));
        }
        tracing::debug!(segment_id, message_id, "segment posted");
        Ok(())
    }

    pub async fn mark_segment_failed(&self, segment_id: i64) -> Result<()> {
        sqlx::query("UPDATE segments SET state = 'failed', retry_count = retry_count + 1 WHERE id = ?1")
            .bind(segment_id)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }

    pub async fn requeue_segment(&self, segment_id: i64) -> Result<()> {
        sqlx::query("UPDATE segments SET state = 'pending', retry_count = retry_count + 1 WHERE id = ?1")
            .bind(segment_id)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }

    pub async fn iter_segments(&self, file_id: i64) -> Result<Vec<SegmentRow>> {
        sqlx::query_as::<_, SegmentRow>(
            "SELECT * FROM segments WHERE file_id = ?1 ORDER BY segment_index, redundancy_index",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    /// A file's `segment_count` equals the number of primary
    /// (`redundancy_index = 0`) segments posted for it so far.
    pub async fn posted_primary_count(&self, file_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM segments
             WHERE file_id = ?1 AND redundancy_index = 0 AND state = 'posted'",
        )
        .bind(file_id)
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx)?;
        Ok(count)
    }

    pub async fn count_segments_by_state(&self, file_id: i64) -> Result<Vec<StateCount>> {
        sqlx::query_as::<_, StateCount>(
            "SELECT state, COUNT(*) as count FROM segments WHERE file_id = ?1 GROUP BY state",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    /// Per-state counts of `files` belonging to one folder.
    pub async fn count_files_by_state(&self, folder_id: &str) -> Result<Vec<StateCount>> {
        sqlx::query_as::<_, StateCount>(
            "SELECT state, COUNT(*) as count FROM files WHERE folder_id = ?1 GROUP BY state",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    // ---- shares -----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_share(
        &self,
        share_id: &str,
        folder_id: &str,
        share_mode: &str,
        index_message_id: &str,
        expires_at: Option<&str>,
        password_hint: Option<&str>,
    ) -> Result<ShareRow> {
        let published_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO shares
                (share_id, folder_id, share_mode, index_message_id, published_at,
                 expires_at, password_hint, state, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', 0)",
        )
        .bind(share_id)
        .bind(folder_id)
        .bind(share_mode)
        .bind(index_message_id)
        .bind(&published_at)
        .bind(expires_at)
        .bind(password_hint)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        tracing::info!(share_id, folder_id, "share published");
        self.find_share(share_id)
            .await?
            .ok_or_else(|| Error::Internal("share vanished immediately after insert".into()))
    }

    pub async fn find_share(&self, share_id: &str) -> Result<Option<ShareRow>> {
        sqlx::query_as::<_, ShareRow>("SELECT * FROM shares WHERE share_id = ?1")
            .bind(share_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)
    }

    pub async fn touch_share_access(&self, share_id: &str) -> Result<()> {
        let affected = sqlx::query("UPDATE shares SET access_count = access_count + 1 WHERE share_id = ?1")
            .bind(share_id)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?
            .rows_affected();
        if affected == 0 {
            return Err(Error::NotFound(format!("share {share_id}")));
        }
        Ok(())
    }

    // ---- download sessions --------------------------------------------

    pub async fn open_session(
        &self,
        session_id: &str,
        access_credential: &str,
        destination_path: &str,
        total_files: i64,
        total_size: i64,
    ) -> Result<DownloadSessionRow> {
        let started_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO download_sessions
                (session_id, access_credential, destination_path, total_files, total_size,
                 done_files, done_size, state, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 'pending', ?6)",
        )
        .bind(session_id)
        .bind(access_credential)
        .bind(destination_path)
        .bind(total_files)
        .bind(total_size)
        .bind(&started_at)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        self.get_session(session_id).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<DownloadSessionRow> {
        sqlx::query_as::<_, DownloadSessionRow>("SELECT * FROM download_sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }

    /// Mutates only the caller's own session. Enforced at the orchestration
    /// layer (sv-downloader never holds more than one session_id at a time),
    /// not by a catalog-level lock.
    pub async fn advance_session(
        &self,
        session_id: &str,
        done_files: i64,
        done_size: i64,
        state: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let finished_at = if matches!(state, Some("completed" | "failed" | "cancelled")) {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        sqlx::query(
            "UPDATE download_sessions SET
                done_files = ?1,
                done_size = ?2,
                state = COALESCE(?3, state),
                error = COALESCE(?4, error),
                finished_at = COALESCE(?5, finished_at)
             WHERE session_id = ?6",
        )
        .bind(done_files)
        .bind(done_size)
        .bind(state)
        .bind(error)
        .bind(finished_at)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        Ok(())
    }

    /// Reaps sessions in a terminal state older than `older_than`, for the
    /// background maintenance task. Returns the number of
    /// rows removed.
    pub async fn reap_sessions(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let cutoff = cutoff.to_rfc3339();

        let result = sqlx::query(
            "DELETE FROM download_sessions
             WHERE state IN ('completed', 'failed', 'cancelled')
               AND COALESCE(finished_at, started_at) < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::info!(reaped, "reaped stale download sessions");
        }
        Ok(reaped)
    }

    /// Finds the most recent non-terminal session downloading the same
    /// credential into the same destination, so a re-run of `download`
    /// resumes it instead of starting a duplicate from scratch. `completed`
    /// and `cancelled` sessions are never offered back; a `failed` session
    /// is, since spec.md §7 allows some files of a failed session to have
    /// finished cleanly and only the offending one to need a retry.
    pub async fn find_resumable_session(
        &self,
        access_credential: &str,
        destination_path: &str,
    ) -> Result<Option<DownloadSessionRow>> {
        sqlx::query_as::<_, DownloadSessionRow>(
            "SELECT * FROM download_sessions
             WHERE access_credential = ?1 AND destination_path = ?2
               AND state NOT IN ('completed', 'cancelled')
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(access_credential)
        .bind(destination_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    // ---- download session file/segment progress ------------------------

    /// Registers every file a session will fetch, so progress can be tracked
    /// and resumed per file. Idempotent: re-running against an existing
    /// session leaves already-registered rows (and their state) untouched.
    pub async fn init_session_files(
        &self,
        session_id: &str,
        files: &[(String, i64, String)],
    ) -> Result<()> {
        for (relative_path, size, content_hash) in files {
            sqlx::query(
                "INSERT INTO download_files (session_id, relative_path, size, content_hash, state)
                 VALUES (?1, ?2, ?3, ?4, 'pending')
                 ON CONFLICT (session_id, relative_path) DO NOTHING",
            )
            .bind(session_id)
            .bind(relative_path)
            .bind(size)
            .bind(content_hash)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        }
        Ok(())
    }

    pub async fn list_session_files(&self, session_id: &str) -> Result<Vec<SessionFileRow>> {
        sqlx::query_as::<_, SessionFileRow>(
            "SELECT * FROM download_files WHERE session_id = ?1 ORDER BY relative_path",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)
    }

    pub async fn get_session_file(&self, session_id: &str, relative_path: &str) -> Result<SessionFileRow> {
        sqlx::query_as::<_, SessionFileRow>(
            "SELECT * FROM download_files WHERE session_id = ?1 AND relative_path = ?2",
        )
        .bind(session_id)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("session file {session_id}/{relative_path}")))
    }

    pub async fn set_session_file_state(
        &self,
        session_id: &str,
        relative_path: &str,
        state: &str,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE download_files SET state = ?1, error = ?2 WHERE session_id = ?3 AND relative_path = ?4",
        )
        .bind(state)
        .bind(error)
        .bind(session_id)
        .bind(relative_path)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;
        Ok(())
    }

    /// Records that `segment_index` of a session's file has been fetched,
    /// decrypted, and appended to its staging buffer. `redundancy_index`
    /// names which copy actually succeeded, for diagnostics.
    pub async fn record_fetched_segment(
        &self,
        session_id: &str,
        relative_path: &str,
        segment_index: i64,
        redundancy_index: i64,
        decoded_size: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO download_segments
                (session_id, relative_path, segment_index, redundancy_index, decoded_size)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (session_id, relative_path, segment_index) DO UPDATE SET
                redundancy_index = excluded.redundancy_index,
                decoded_size = excluded.decoded_size",
        )
        .bind(session_id)
        .bind(relative_path)
        .bind(segment_index)
        .bind(redundancy_index)
        .bind(decoded_size)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;
        Ok(())
    }

    /// Every segment already staged for a session/file, ordered by index,
    /// so resume can compute both which index to continue from and how many
    /// plaintext bytes are already sitting in the staging file.
    pub async fn fetched_segments(
        &self,
        session_id: &str,
        relative_path: &str,
    ) -> Result<Vec<SessionSegmentRow>> {
        sqlx::query_as::<_, SessionSegmentRow>(
            "SELECT * FROM download_segments WHERE session_id = ?1 AND relative_path = ?2
             ORDER BY segment_index",
        )
        .bind(session_id)
        .bind(relative_path)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_folder_round_trips() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.create_user("u1", "Alice", None, b"pub", b"wrapped").await.unwrap();
        let folder = cat
            .create_folder("f1", "/tmp/share", "My Folder", "open", Some("u1"), b"sig-pub", b"sig-priv")
            .await
            .unwrap();
        assert_eq!(folder.version, 0);
        assert_eq!(folder.state, "active");

        let fetched = cat.get_folder("f1").await.unwrap();
        assert_eq!(fetched.display_name, "My Folder");
    }

    #[tokio::test]
    async fn file_upsert_increments_version_on_conflict() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.create_user("u1", "Alice", None, b"pub", b"wrapped").await.unwrap();
        cat.create_folder("f1", "/tmp/share", "Folder", "open", Some("u1"), b"p", b"p").await.unwrap();

        let first = cat.upsert_file("f1", "a.txt", "hash1", 5, "2026-01-01T00:00:00Z", 1, "indexed").await.unwrap();
        assert_eq!(first.version, 0);

        let second = cat.upsert_file("f1", "a.txt", "hash2", 6, "2026-01-02T00:00:00Z", 1, "modified").await.unwrap();
        assert_eq!(second.version, 1);
        assert_eq!(second.content_hash, "hash2");
    }

    #[tokio::test]
    async fn mark_segment_posted_requires_nonempty_message_id() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.create_user("u1", "Alice", None, b"p", b"p").await.unwrap();
        cat.create_folder("f1", "/tmp/share", "Folder", "open", Some("u1"), b"p", b"p").await.unwrap();
        let file = cat.upsert_file("f1", "a.txt", "h", 5, "2026-01-01T00:00:00Z", 1, "indexed").await.unwrap();
        let seg = cat
            .upsert_segment(file.id, 0, "ph", "ch", 5, "alt.binaries.test", "sh", 0, "pending")
            .await
            .unwrap();

        assert!(cat.mark_segment_posted(seg.id, "").await.is_err());
        cat.mark_segment_posted(seg.id, "<abc@news.example>").await.unwrap();

        let segments = cat.iter_segments(file.id).await.unwrap();
        assert!(segments[0].is_posted());
    }

    #[tokio::test]
    async fn file_is_uploaded_only_once_every_primary_segment_is_posted() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.create_user("u1", "Alice", None, b"p", b"p").await.unwrap();
        cat.create_folder("f1", "/tmp/share", "Folder", "open", Some("u1"), b"p", b"p").await.unwrap();
        let file = cat.upsert_file("f1", "b.bin", "h", 10, "2026-01-01T00:00:00Z", 2, "uploading").await.unwrap();

        let s0 = cat.upsert_segment(file.id, 0, "p0", "c0", 5, "ng", "sh0", 0, "pending").await.unwrap();
        let s1 = cat.upsert_segment(file.id, 1, "p1", "c1", 5, "ng", "sh1", 0, "pending").await.unwrap();

        assert_eq!(cat.posted_primary_count(file.id).await.unwrap(), 0);
        cat.mark_segment_posted(s0.id, "<m0@news>").await.unwrap();
        assert_eq!(cat.posted_primary_count(file.id).await.unwrap(), 1);
        cat.mark_segment_posted(s1.id, "<m1@news>").await.unwrap();
        assert_eq!(cat.posted_primary_count(file.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn iter_files_pagination_is_keyset_ordered() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.create_user("u1", "Alice", None, b"p", b"p").await.unwrap();
        cat.create_folder("f1", "/tmp/share", "Folder", "open", Some("u1"), b"p", b"p").await.unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            cat.upsert_file("f1", name, "h", 1, "2026-01-01T00:00:00Z", 1, "indexed").await.unwrap();
        }

        let page1 = cat.iter_files("f1", &Page::first(2)).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].relative_path, "a.txt");

        let page2 = cat
            .iter_files("f1", &Page::after(&page1.last().unwrap().relative_path, 2))
            .await
            .unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].relative_path, "c.txt");
    }

    #[tokio::test]
    async fn share_ids_and_accesses_round_trip() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.create_user("u1", "Alice", None, b"p", b"p").await.unwrap();
        cat.create_folder("f1", "/tmp/share", "Folder", "open", Some("u1"), b"p", b"p").await.unwrap();
        cat.create_share("SHARE1", "f1", "open", "<idx@news>", None, None).await.unwrap();

        assert!(cat.find_share("NOPE").await.unwrap().is_none());
        let found = cat.find_share("SHARE1").await.unwrap().unwrap();
        assert_eq!(found.access_count, 0);

        cat.touch_share_access("SHARE1").await.unwrap();
        let found = cat.find_share("SHARE1").await.unwrap().unwrap();
        assert_eq!(found.access_count, 1);
    }

    #[tokio::test]
    async fn reap_sessions_only_removes_terminal_and_stale() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.open_session("s1", "CRED1", "/tmp/dst", 3, 100).await.unwrap();
        cat.advance_session("s1", 3, 100, Some("completed"), None).await.unwrap();

        // Freshly-completed sessions survive a zero-duration cutoff... unless the clock
        // has already ticked past "now"; use a generous window to avoid flakiness.
        let reaped = cat.reap_sessions(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(reaped, 0);
    }

    #[tokio::test]
    async fn resumable_session_excludes_completed_and_cancelled() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.open_session("s1", "CRED1", "/tmp/dst", 2, 100).await.unwrap();
        assert!(cat.find_resumable_session("CRED1", "/tmp/dst").await.unwrap().is_some());

        cat.advance_session("s1", 2, 100, Some("completed"), None).await.unwrap();
        assert!(cat.find_resumable_session("CRED1", "/tmp/dst").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_file_progress_round_trips_and_resumes() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.open_session("s1", "CRED1", "/tmp/dst", 2, 100).await.unwrap();
        cat.init_session_files(
            "s1",
            &[("a.txt".to_string(), 5, "hash-a".to_string()), ("b.bin".to_string(), 95, "hash-b".to_string())],
        )
        .await
        .unwrap();

        let files = cat.list_session_files("s1").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].state, "pending");

        cat.record_fetched_segment("s1", "b.bin", 0, 0, 40).await.unwrap();
        cat.record_fetched_segment("s1", "b.bin", 1, 0, 40).await.unwrap();
        let fetched = cat.fetched_segments("s1", "b.bin").await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched.iter().map(|s| s.decoded_size).sum::<i64>(), 80);

        cat.set_session_file_state("s1", "a.txt", "completed", None).await.unwrap();
        let a = cat.get_session_file("s1", "a.txt").await.unwrap();
        assert_eq!(a.state, "completed");

        // Re-initializing (as a resumed run would) must not clobber progress.
        cat.init_session_files("s1", &[("a.txt".to_string(), 5, "hash-a".to_string())]).await.unwrap();
        let a_again = cat.get_session_file("s1", "a.txt").await.unwrap();
        assert_eq!(a_again.state, "completed");
    }

    #[tokio::test]
    async fn deleting_a_session_cascades_its_file_and_segment_progress() {
        let cat = Catalog::open_in_memory().await.unwrap();
        cat.open_session("s1", "CRED1", "/tmp/dst", 1, 10).await.unwrap();
        cat.init_session_files("s1", &[("a.txt".to_string(), 10, "hash".to_string())]).await.unwrap();
        cat.record_fetched_segment("s1", "a.txt", 0, 0, 10).await.unwrap();
        cat.advance_session("s1", 0, 0, Some("failed"), Some("boom")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reaped = cat.reap_sessions(Duration::from_millis(1)).await.unwrap();
        assert_eq!(reaped, 1);
        assert!(cat.list_session_files("s1").await.unwrap().is_empty());
    }
}
