use serde::{Deserialize, Serialize};

/// Row shape for `users`.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub public_key: Vec<u8>,
    pub wrapped_private_key: Vec<u8>,
    pub created_at: String,
}

/// Row shape for `folders`.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct FolderRow {
    pub folder_unique_id: String,
    pub local_path: String,
    pub display_name: String,
    pub share_mode: String,
    pub owner_user_id: Option<String>,
    pub version: i64,
    pub total_files: i64,
    pub total_size: i64,
    pub state: String,
    pub signing_public_key: Vec<u8>,
    pub wrapped_signing_private_key: Vec<u8>,
}

/// Row shape for `files`. Identity is `(folder_id,
/// relative_path)`; `id` is the catalog's internal surrogate key used by
/// `segments.file_id`.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub folder_id: String,
    pub relative_path: String,
    pub content_hash: String,
    pub size: i64,
    pub modified_at: String,
    pub version: i64,
    pub segment_count: i64,
    pub state: String,
}

/// Row shape for `segments`.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct SegmentRow {
    pub id: i64,
    pub file_id: i64,
    pub segment_index: i64,
    pub plaintext_hash: String,
    pub ciphertext_hash: String,
    pub size: i64,
    pub newsgroup: String,
    pub subject_hash: String,
    pub redundancy_index: i64,
    pub state: String,
    pub retry_count: i64,
    pub message_id: Option<String>,
    pub posted_at: Option<String>,
}

impl SegmentRow {
    /// True only once `state = 'posted'` and `message_id` is non-empty.
    pub fn is_posted(&self) -> bool {
        self.state == "posted" && self.message_id.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// Row shape for `shares`.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct ShareRow {
    pub share_id: String,
    pub folder_id: String,
    pub share_mode: String,
    pub index_message_id: String,
    pub published_at: String,
    pub expires_at: Option<String>,
    pub password_hint: Option<String>,
    pub state: String,
    pub access_count: i64,
}

/// Row shape for `download_sessions`.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct DownloadSessionRow {
    pub session_id: String,
    pub access_credential: String,
    pub destination_path: String,
    pub total_files: i64,
    pub total_size: i64,
    pub done_files: i64,
    pub done_size: i64,
    pub state: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

/// Row shape for `download_files`: one file's progress within a download
/// session.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionFileRow {
    pub session_id: String,
    pub relative_path: String,
    pub size: i64,
    pub content_hash: String,
    pub state: String,
    pub error: Option<String>,
}

/// Row shape for `download_segments`: one segment already fetched and
/// staged for a session/file pair.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionSegmentRow {
    pub session_id: String,
    pub relative_path: String,
    pub segment_index: i64,
    pub redundancy_index: i64,
    pub decoded_size: i64,
}

/// Counts grouped by a state column, returned by `count_by_state`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateCount {
    pub state: String,
    pub count: i64,
}
