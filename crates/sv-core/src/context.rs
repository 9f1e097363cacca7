use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Process-wide configuration, assembled once at startup and threaded through
/// every subsystem as an explicit `Arc<Config>` argument. Nothing in this
/// crate, or any crate built on top of it, reaches for ambient global state —
/// every function that needs configuration takes it as a parameter.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory holding the catalog database, staged segments, and
    /// cached keys.
    pub data_dir: PathBuf,

    /// Target plaintext size of a segment before encryption and framing,
    /// in bytes. Clamped to the 512 KiB - 1 MiB range at construction time.
    pub segment_size: usize,

    /// Number of redundant copies to post for each segment.
    pub redundancy: u32,

    /// Maximum number of concurrent connections to open against a single
    /// configured server.
    pub max_connections_per_server: usize,

    /// Maximum number of segments held in memory awaiting upload before
    /// producers apply backpressure.
    pub upload_queue_capacity: usize,

    /// Argon2id cost parameter (memory cost, KiB) used for password-derived
    /// keys. Never below 65536 (64 MiB).
    pub argon2_memory_kib: u32,

    pub log_filter: String,
}

pub const MIN_SEGMENT_SIZE: usize = 512 * 1024;
pub const MAX_SEGMENT_SIZE: usize = 1024 * 1024;
pub const DEFAULT_SEGMENT_SIZE: usize = 768 * 1024;
pub const MIN_ARGON2_MEMORY_KIB: u32 = 65536;

impl Config {
    /// Builds a configuration rooted at `data_dir`, applying the defaults
    /// documented on each field.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            redundancy: 1,
            max_connections_per_server: 8,
            upload_queue_capacity: 64,
            argon2_memory_kib: MIN_ARGON2_MEMORY_KIB,
            log_filter: "info".to_string(),
        }
    }

    /// Default data directory under the user's platform-appropriate data
    /// home, mirroring how the teacher locates its signer and trust store.
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("sharevault"))
            .ok_or_else(|| Error::internal("no platform data directory available"))
    }

    pub fn with_segment_size(mut self, bytes: usize) -> Self {
        self.segment_size = bytes.clamp(MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE);
        self
    }

    pub fn with_redundancy(mut self, redundancy: u32) -> Self {
        self.redundancy = redundancy.max(1);
        self
    }

    pub fn with_argon2_memory_kib(mut self, kib: u32) -> Self {
        self.argon2_memory_kib = kib.max(MIN_ARGON2_MEMORY_KIB);
        self
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.sqlite3")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_size < MIN_SEGMENT_SIZE || self.segment_size > MAX_SEGMENT_SIZE {
            return Err(Error::InvalidInput(format!(
                "segment_size {} outside [{}, {}]",
                self.segment_size, MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE
            )));
        }
        if self.argon2_memory_kib < MIN_ARGON2_MEMORY_KIB {
            return Err(Error::InvalidInput(format!(
                "argon2_memory_kib {} below minimum {}",
                self.argon2_memory_kib, MIN_ARGON2_MEMORY_KIB
            )));
        }
        Ok(())
    }

    /// Ensures the directories this configuration points at exist, creating
    /// them with restrictive permissions on unix where supported.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.data_dir.as_path(), self.staging_dir().as_path() as &Path] {
            std::fs::create_dir_all(dir)?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&self.data_dir, perms)?;
        }
        Ok(())
    }
}

/// Initializes the global `tracing` subscriber from `RUST_LOG`, falling back
/// to `config.log_filter`. Idempotent: a second call is a no-op rather than
/// a panic, so tests and multiple CLI invocations in-process don't collide.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_size_clamps_to_range() {
        let cfg = Config::new("/tmp/sv-test").with_segment_size(16);
        assert_eq!(cfg.segment_size, MIN_SEGMENT_SIZE);

        let cfg = Config::new("/tmp/sv-test").with_segment_size(10 * 1024 * 1024);
        assert_eq!(cfg.segment_size, MAX_SEGMENT_SIZE);
    }

    #[test]
    fn argon2_memory_floor_is_enforced() {
        let cfg = Config::new("/tmp/sv-test").with_argon2_memory_kib(1024);
        assert_eq!(cfg.argon2_memory_kib, MIN_ARGON2_MEMORY_KIB);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_config_validates() {
        let cfg = Config::new("/tmp/sv-test");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.redundancy, 1);
    }
}
