use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use humansize::{format_size, BINARY};

use sv_catalog::Catalog;
use sv_core::Config;
use sv_crypto::keys::FolderSigningKey;
use sv_crypto::ContentKey;
use sv_downloader::{DownloadOptions, Downloader};
use sv_publisher::{Publisher, UnlockSecret};
use sv_uploader::{UploadOptions, Uploader};

use crate::keys;
use crate::servers::build_transport;

pub async fn create_user(config: &Config, display_name: &str, email: Option<&str>) -> Result<()> {
    let catalog = Catalog::open(&config.catalog_path(), config.max_connections_per_server as u32).await?;
    let master = keys::load_or_create_master_secret(config)?;

    let user_id = sv_core::ids::random_id(16);
    let signing_key = FolderSigningKey::generate();
    let wrapped = keys::wrap_user_signing_key(&master, &user_id, &signing_key.to_bytes())?;

    catalog
        .create_user(&user_id, display_name, email, &signing_key.verifying_key().to_bytes(), &wrapped)
        .await?;

    println!("created user {user_id} ({display_name})");
    println!(
        "identity secret: {}\n\
         keep this private; give it to folder owners out of band when they grant you \
         identity-mode access. it never leaves this machine on its own.",
        hex::encode(signing_key.to_bytes())
    );
    Ok(())
}

pub async fn create_folder(
    config: &Config,
    path: &str,
    name: &str,
    share_mode: &str,
    owner_user_id: Option<&str>,
) -> Result<()> {
    if !matches!(share_mode, "open" | "identity" | "password") {
        bail!("share_mode must be one of open, identity, password");
    }

    let root = PathBuf::from(path);
    if !root.is_dir() {
        bail!("{path} is not a directory");
    }

    let catalog = Catalog::open(&config.catalog_path(), config.max_connections_per_server as u32).await?;
    let master = keys::load_or_create_master_secret(config)?;

    let folder_id = sv_core::ids::random_id(16);
    let signing_key = FolderSigningKey::generate();
    let wrapped_signing = keys::wrap_folder_signing_key(&master, &folder_id, &signing_key.to_bytes())?;

    let folder = catalog
        .create_folder(&folder_id, path, name, share_mode, owner_user_id, &signing_key.verifying_key().to_bytes(), &wrapped_signing)
        .await?;

    let session_key = ContentKey::random();
    keys::save_folder_session_key(config, &master, &folder_id, &session_key)?;

    let transport = Arc::new(build_transport(config)?);
    let uploader = Uploader::new(catalog, transport, Arc::new(config.clone()));
    let summary = uploader.upload_folder(&folder, &session_key, &UploadOptions::default()).await?;

    println!("created folder {folder_id} ({name}, {share_mode})");
    println!(
        "uploaded {} new/changed file(s), {} unchanged, {} segment posting(s)",
        summary.files_uploaded, summary.files_unchanged, summary.segments_posted
    );
    Ok(())
}

pub struct PublishArgs<'a> {
    pub folder_id: &'a str,
    pub mode: &'a str,
    pub owner_identity_secret: Option<[u8; 32]>,
    pub users: Vec<(String, [u8; 32])>,
    pub password: Option<String>,
    pub password_hint: Option<String>,
    pub newsgroup: String,
}

pub async fn publish(config: &Config, args: PublishArgs<'_>) -> Result<()> {
    let catalog = Catalog::open(&config.catalog_path(), config.max_connections_per_server as u32).await?;
    let master = keys::load_or_create_master_secret(config)?;

    let folder = catalog.get_folder(args.folder_id).await.context("folder not found")?;
    let wrapped = folder.wrapped_signing_private_key.clone();
    let signing_bytes = keys::unwrap_folder_signing_key(&master, args.folder_id, &wrapped)?;
    let signing_key = FolderSigningKey::from_bytes(&signing_bytes);

    let session_key = keys::load_folder_session_key(config, &master, args.folder_id)?;

    let transport = Arc::new(build_transport(config)?);
    let publisher = Publisher::new(catalog, transport);

    let credential = match args.mode {
        "open" => publisher.publish_open(&folder, &signing_key, &session_key, &args.newsgroup, None).await?,
        "identity" => {
            if args.users.is_empty() {
                bail!("identity mode requires at least one --user user_id:identity_secret");
            }
            let owner_identity_secret = args
                .owner_identity_secret
                .context("identity mode requires the owner's own --identity-secret so the owner can decrypt their own share")?;
            publisher
                .publish_identity(&folder, &signing_key, &session_key, &owner_identity_secret, &args.users, &args.newsgroup, None)
                .await?
        }
        "password" => {
            let password = args.password.clone().context("password mode requires --password")?;
            publisher
                .publish_password(
                    &folder,
                    &signing_key,
                    &session_key,
                    password.as_bytes(),
                    config.argon2_memory_kib,
                    args.password_hint.as_deref(),
                    &args.newsgroup,
                    None,
                )
                .await?
        }
        other => bail!("unknown share mode {other}"),
    };

    println!("published folder {}: {credential}", args.folder_id);
    Ok(())
}

pub struct DownloadArgs {
    pub credential: String,
    pub destination: PathBuf,
    pub newsgroup: String,
    pub user_id: Option<String>,
    pub identity_secret: Option<String>,
    pub password: Option<String>,
}

pub async fn download(config: &Config, args: DownloadArgs) -> Result<()> {
    let catalog = Catalog::open(&config.catalog_path(), config.max_connections_per_server as u32).await?;
    let transport = Arc::new(build_transport(config)?);

    let secret = match (&args.user_id, &args.identity_secret, &args.password) {
        (Some(user_id), Some(identity_secret_hex), None) => {
            let bytes = hex::decode(identity_secret_hex).context("identity secret must be hex")?;
            let identity_secret: [u8; 32] =
                bytes.try_into().map_err(|_| anyhow::anyhow!("identity secret must be 32 bytes"))?;
            UnlockSecret::Identity { user_id: user_id.clone(), identity_secret }
        }
        (None, None, Some(password)) => UnlockSecret::Password(password.clone().into_bytes()),
        (None, None, None) => UnlockSecret::None,
        _ => bail!("pass either --user-id with --identity-secret, --password, or neither"),
    };

    let downloader = Downloader::new(catalog, transport);
    let opts = DownloadOptions { newsgroup: args.newsgroup, ..DownloadOptions::default() };
    let summary = downloader.download(&args.credential, &args.destination, secret, &opts).await?;

    println!(
        "session {}: {} file(s) completed, {} failed, {} written",
        summary.session_id,
        summary.files_completed,
        summary.files_failed,
        format_size(summary.bytes_written, BINARY)
    );
    if summary.files_failed > 0 {
        bail!("{} file(s) failed verification or retrieval; see catalog session {} for detail", summary.files_failed, summary.session_id);
    }
    Ok(())
}

pub async fn session_status(config: &Config, session_id: &str) -> Result<()> {
    let catalog = Catalog::open(&config.catalog_path(), config.max_connections_per_server as u32).await?;
    let session = catalog.get_session(session_id).await?;

    println!("session {}", session.session_id);
    println!("  destination: {}", session.destination_path);
    println!("  state:       {}", session.state);
    println!(
        "  files:       {}/{}",
        session.done_files, session.total_files
    );
    println!(
        "  bytes:       {} / {}",
        format_size(session.done_size.max(0) as u64, BINARY),
        format_size(session.total_size.max(0) as u64, BINARY)
    );
    if let Some(error) = session.error {
        println!("  error:       {error}");
    }

    let files = catalog.list_session_files(session_id).await?;
    for file in files {
        println!("    {} [{}]", file.relative_path, file.state);
    }
    Ok(())
}

pub async fn system_status(config: &Config) -> Result<()> {
    let catalog = Catalog::open(&config.catalog_path(), config.max_connections_per_server as u32).await?;
    let pool = catalog.pool();
    println!("catalog: {} connection(s) open, {} idle", pool.size(), pool.num_idle());

    match build_transport(config) {
        Ok(transport) => {
            let servers = transport.enabled_server_names();
            println!("transport: {} enabled server(s)", servers.len());
            for name in servers {
                println!("  - {name}");
            }
        }
        Err(e) => println!("transport: unavailable ({e})"),
    }
    Ok(())
}
