//! Table and index definitions.
//!
//! Applied at startup with plain `CREATE TABLE IF NOT EXISTS` statements
//! rather than a migrations directory: this catalog's shape is fixed up
//! front, not expected to evolve release-to-release the way a product
//! database would, so a single idempotent script is the simpler idiom here.

pub const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS users (
    user_id               TEXT PRIMARY KEY,
    display_name          TEXT NOT NULL,
    email                 TEXT,
    public_key            BLOB NOT NULL,
    wrapped_private_key   BLOB NOT NULL,
    created_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS folders (
    folder_unique_id              TEXT PRIMARY KEY,
    local_path                    TEXT NOT NULL,
    display_name                  TEXT NOT NULL,
    share_mode                    TEXT NOT NULL CHECK (share_mode IN ('open','identity','password')),
    owner_user_id                 TEXT REFERENCES users(user_id),
    version                       INTEGER NOT NULL DEFAULT 0,
    total_files                   INTEGER NOT NULL DEFAULT 0,
    total_size                    INTEGER NOT NULL DEFAULT 0,
    state                         TEXT NOT NULL CHECK (state IN ('active','archived','deleted')),
    signing_public_key            BLOB NOT NULL,
    wrapped_signing_private_key   BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_id      TEXT NOT NULL REFERENCES folders(folder_unique_id) ON DELETE CASCADE,
    relative_path  TEXT NOT NULL,
    content_hash   TEXT NOT NULL,
    size           INTEGER NOT NULL,
    modified_at    TEXT NOT NULL,
    version        INTEGER NOT NULL DEFAULT 0,
    segment_count  INTEGER NOT NULL DEFAULT 0,
    state          TEXT NOT NULL CHECK (state IN ('indexed','modified','segmenting','uploading','uploaded','deleted')),
    UNIQUE (folder_id, relative_path)
);

CREATE INDEX IF NOT EXISTS idx_files_folder_path ON files (folder_id, relative_path);

CREATE TABLE IF NOT EXISTS segments (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id           INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    segment_index     INTEGER NOT NULL,
    plaintext_hash    TEXT NOT NULL,
    ciphertext_hash   TEXT NOT NULL,
    size              INTEGER NOT NULL,
    newsgroup         TEXT NOT NULL,
    subject_hash      TEXT NOT NULL,
    redundancy_index  INTEGER NOT NULL DEFAULT 0,
    state             TEXT NOT NULL CHECK (state IN ('pending','posting','posted','failed')),
    retry_count       INTEGER NOT NULL DEFAULT 0,
    message_id        TEXT,
    posted_at         TEXT,
    UNIQUE (file_id, segment_index, redundancy_index)
);

CREATE INDEX IF NOT EXISTS idx_segments_file_index_redundancy ON segments (file_id, segment_index, redundancy_index);
CREATE INDEX IF NOT EXISTS idx_segments_message_id ON segments (message_id);

CREATE TABLE IF NOT EXISTS shares (
    share_id            TEXT PRIMARY KEY,
    folder_id           TEXT NOT NULL REFERENCES folders(folder_unique_id) ON DELETE CASCADE,
    share_mode          TEXT NOT NULL,
    index_message_id    TEXT NOT NULL,
    published_at        TEXT NOT NULL,
    expires_at          TEXT,
    password_hint       TEXT,
    state               TEXT NOT NULL CHECK (state IN ('active','expired','revoked')),
    access_count         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_shares_folder ON shares (folder_id);

CREATE TABLE IF NOT EXISTS download_sessions (
    session_id          TEXT PRIMARY KEY,
    access_credential    TEXT NOT NULL,
    destination_path     TEXT NOT NULL,
    total_files          INTEGER NOT NULL,
    total_size           INTEGER NOT NULL,
    done_files           INTEGER NOT NULL DEFAULT 0,
    done_size            INTEGER NOT NULL DEFAULT 0,
    state                TEXT NOT NULL CHECK (state IN ('pending','fetching','paused','completed','failed','cancelled')),
    started_at           TEXT NOT NULL,
    finished_at          TEXT,
    error                TEXT
);

CREATE INDEX IF NOT EXISTS idx_download_sessions_resume
    ON download_sessions (access_credential, destination_path);

-- Per-file progress within a download session, so a restarted process can
-- skip files already verified and resume a partial one instead of
-- redownloading the whole share. Rows survive only as long as their parent
-- session (cascades on delete with it, including through `reap_sessions`).
CREATE TABLE IF NOT EXISTS download_files (
    session_id      TEXT NOT NULL REFERENCES download_sessions(session_id) ON DELETE CASCADE,
    relative_path   TEXT NOT NULL,
    size            INTEGER NOT NULL,
    content_hash    TEXT NOT NULL,
    state           TEXT NOT NULL CHECK (state IN ('pending','fetching','completed','failed')),
    error           TEXT,
    PRIMARY KEY (session_id, relative_path)
);

-- One row per segment already fetched, decrypted, and appended to a file's
-- staging buffer, so resume can skip straight to the first unfetched index
-- instead of re-deriving which bytes are already on disk.
CREATE TABLE IF NOT EXISTS download_segments (
    session_id        TEXT NOT NULL,
    relative_path     TEXT NOT NULL,
    segment_index     INTEGER NOT NULL,
    redundancy_index  INTEGER NOT NULL,
    decoded_size      INTEGER NOT NULL,
    PRIMARY KEY (session_id, relative_path, segment_index),
    FOREIGN KEY (session_id, relative_path)
        REFERENCES download_files (session_id, relative_path) ON DELETE CASCADE
);
"#;
