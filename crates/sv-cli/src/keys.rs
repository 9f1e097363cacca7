//! Local-only key custody for the CLI: the owner's master secret, and the
//! per-folder session keys an upload needs again at publish time. Neither
//! ever touches the catalog schema, mirroring the teacher's posture that a
//! content/session key "never stores in the clear" — these sidecars hold
//! only AEAD-wrapped bytes on disk, restricted to owner-only permissions the
//! way `sv_core::Config::ensure_directories` restricts the data directory
//! itself.

use std::path::{Path, PathBuf};

use sv_core::{Config, Error, Result};
use sv_crypto::kdf::{hkdf_expand, unwrap_key, wrap_key};
use sv_crypto::ContentKey;

fn master_secret_path(config: &Config) -> PathBuf {
    config.data_dir.join("master.key")
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// Loads the owner's 32-byte master secret, generating and persisting one
/// on first use. Every folder signing key and every published identity
/// share's owner grant is wrapped under a key derived from this secret, so
/// losing it strands every folder this installation owns.
pub fn load_or_create_master_secret(config: &Config) -> Result<[u8; 32]> {
    let path = master_secret_path(config);
    if let Ok(bytes) = std::fs::read(&path) {
        return bytes.try_into().map_err(|_| Error::internal("master.key has the wrong length"));
    }

    use rand_core::RngCore;
    let mut secret = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    std::fs::write(&path, secret)?;
    restrict_to_owner(&path)?;
    tracing::info!(path = %path.display(), "generated new owner master secret");
    Ok(secret)
}

/// Derives the key-encryption key a given local secret-material id (a
/// user id or folder id) is wrapped under, scoping each KEK to exactly one
/// id so no wrapped blob unwraps under another id's key by accident.
fn derive_local_kek(master_secret: &[u8; 32], id: &str, label: &[u8]) -> Result<ContentKey> {
    let mut key = [0u8; 32];
    hkdf_expand(master_secret, id.as_bytes(), label, &mut key)?;
    Ok(ContentKey::from_bytes(key))
}

pub fn wrap_user_signing_key(master_secret: &[u8; 32], user_id: &str, signing_key: &[u8; 32]) -> Result<Vec<u8>> {
    let kek = derive_local_kek(master_secret, user_id, b"sharevault/cli/user-key-wrap/v1")?;
    wrap_key(&kek, signing_key)
}

pub fn unwrap_user_signing_key(master_secret: &[u8; 32], user_id: &str, wrapped: &[u8]) -> Result<[u8; 32]> {
    let kek = derive_local_kek(master_secret, user_id, b"sharevault/cli/user-key-wrap/v1")?;
    unwrap_key(&kek, wrapped)
}

pub fn wrap_folder_signing_key(master_secret: &[u8; 32], folder_id: &str, signing_key: &[u8; 32]) -> Result<Vec<u8>> {
    let kek = derive_local_kek(master_secret, folder_id, b"sharevault/cli/folder-key-wrap/v1")?;
    wrap_key(&kek, signing_key)
}

pub fn unwrap_folder_signing_key(master_secret: &[u8; 32], folder_id: &str, wrapped: &[u8]) -> Result<[u8; 32]> {
    let kek = derive_local_kek(master_secret, folder_id, b"sharevault/cli/folder-key-wrap/v1")?;
    unwrap_key(&kek, wrapped)
}

fn folder_sessions_dir(config: &Config) -> PathBuf {
    config.data_dir.join("folder-sessions")
}

fn folder_session_path(config: &Config, folder_id: &str) -> PathBuf {
    folder_sessions_dir(config).join(format!("{folder_id}.key"))
}

/// Persists a folder's session key, wrapped under the master secret, so a
/// `publish` invocation run in a later process can recover the exact key
/// that every already-posted segment was encrypted under. This sidecar is
/// the only place the session key survives between CLI invocations; the
/// catalog schema deliberately has no column for it.
pub fn save_folder_session_key(config: &Config, master_secret: &[u8; 32], folder_id: &str, session_key: &ContentKey) -> Result<()> {
    std::fs::create_dir_all(folder_sessions_dir(config))?;
    let wrapped = wrap_folder_signing_key(master_secret, folder_id, session_key.expose())?;
    let path = folder_session_path(config, folder_id);
    std::fs::write(&path, wrapped)?;
    restrict_to_owner(&path)?;
    Ok(())
}

pub fn load_folder_session_key(config: &Config, master_secret: &[u8; 32], folder_id: &str) -> Result<ContentKey> {
    let path = folder_session_path(config, folder_id);
    let wrapped = std::fs::read(&path).map_err(|_| {
        Error::NotFound(format!("no session key on file for folder {folder_id}; was it created on this machine?"))
    })?;
    let bytes = unwrap_folder_signing_key(master_secret, folder_id, &wrapped)?;
    Ok(ContentKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        config.ensure_directories().unwrap();
        (dir, config)
    }

    #[test]
    fn master_secret_persists_across_loads() {
        let (_dir, config) = test_config();
        let a = load_or_create_master_secret(&config).unwrap();
        let b = load_or_create_master_secret(&config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn folder_signing_key_round_trips_through_wrap() {
        let (_dir, config) = test_config();
        let master = load_or_create_master_secret(&config).unwrap();
        let key = [9u8; 32];
        let wrapped = wrap_folder_signing_key(&master, "folder-1", &key).unwrap();
        let unwrapped = unwrap_folder_signing_key(&master, "folder-1", &wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn folder_session_key_round_trips_through_sidecar() {
        let (_dir, config) = test_config();
        let master = load_or_create_master_secret(&config).unwrap();
        let session_key = ContentKey::random();
        save_folder_session_key(&config, &master, "folder-1", &session_key).unwrap();
        let loaded = load_folder_session_key(&config, &master, "folder-1").unwrap();
        assert_eq!(loaded.expose(), session_key.expose());
    }

    #[test]
    fn missing_session_key_is_reported_as_not_found() {
        let (_dir, config) = test_config();
        let master = load_or_create_master_secret(&config).unwrap();
        assert!(load_folder_session_key(&config, &master, "never-created").is_err());
    }
}
