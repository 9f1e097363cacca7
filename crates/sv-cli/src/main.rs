//! `sv`: a command-line front end over the sharevault engine, exposing the
//! collaborator-facing operations (`create-user`, `create-folder`, `publish`,
//! `download`, `session-status`, `system-status`) as subcommands, in the
//! spirit of the teacher's own `clap`-derived `qsfs` binary.

mod commands;
mod keys;
mod servers;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sv_core::Config;

#[derive(Parser)]
#[command(name = "sv", about = "Content-addressed file sharing over a news-network transport", version)]
struct Cli {
    /// Directory holding the catalog database, master secret, and staged
    /// keys. Defaults to the platform data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Registers a new local user and prints their identity secret.
    CreateUser {
        display_name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Indexes a local directory as a new folder and uploads its contents.
    CreateFolder {
        /// Local path to the directory to share.
        path: String,
        /// Display name for the folder.
        name: String,
        /// Share mode: open, identity, or password.
        #[arg(long, default_value = "open")]
        share_mode: String,
        /// Local user id recorded as the folder's owner.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Publishes a folder's current index, producing an access credential.
    Publish {
        folder_id: String,
        #[arg(long, default_value = "open")]
        mode: String,
        /// The owner's own identity secret (hex), required for identity mode
        /// so the owner can unlock their own share.
        #[arg(long)]
        identity_secret: Option<String>,
        /// Grants for identity mode: user_id:identity_secret_hex, repeatable.
        #[arg(long = "user", value_name = "USER_ID:SECRET_HEX")]
        users: Vec<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        password_hint: Option<String>,
        #[arg(long, default_value = "alt.binaries.sharevault")]
        newsgroup: String,
    },
    /// Resolves an access credential and fetches its folder into `destination`.
    Download {
        credential: String,
        destination: PathBuf,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        identity_secret: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, default_value = "alt.binaries.sharevault")]
        newsgroup: String,
    },
    /// Reports progress for a previously started download session.
    SessionStatus { session_id: String },
    /// Reports catalog and transport health.
    SystemStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_data_dir().context("could not determine a default data directory; pass --data-dir")?,
    };
    let config = Config::new(data_dir);
    config.validate().context("invalid configuration")?;
    config.ensure_directories()?;
    sv_core::init_tracing(&config);

    match cli.command {
        Command::CreateUser { display_name, email } => {
            commands::create_user(&config, &display_name, email.as_deref()).await
        }
        Command::CreateFolder { path, name, share_mode, owner } => {
            commands::create_folder(&config, &path, &name, &share_mode, owner.as_deref()).await
        }
        Command::Publish { folder_id, mode, identity_secret, users, password, password_hint, newsgroup } => {
            let owner_identity_secret = identity_secret
                .map(|hex_secret| parse_secret(&hex_secret))
                .transpose()?;
            let users = users
                .iter()
                .map(|spec| parse_user_grant(spec))
                .collect::<Result<Vec<_>>>()?;
            commands::publish(
                &config,
                commands::PublishArgs {
                    folder_id: &folder_id,
                    mode: &mode,
                    owner_identity_secret,
                    users,
                    password,
                    password_hint,
                    newsgroup,
                },
            )
            .await
        }
        Command::Download { credential, destination, user_id, identity_secret, password, newsgroup } => {
            commands::download(
                &config,
                commands::DownloadArgs { credential, destination, newsgroup, user_id, identity_secret, password },
            )
            .await
        }
        Command::SessionStatus { session_id } => commands::session_status(&config, &session_id).await,
        Command::SystemStatus => commands::system_status(&config).await,
    }
}

fn parse_secret(hex_secret: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_secret).context("identity secret must be hex")?;
    bytes.try_into().map_err(|_| anyhow::anyhow!("identity secret must be 32 bytes"))
}

fn parse_user_grant(spec: &str) -> Result<(String, [u8; 32])> {
    let (user_id, secret_hex) = spec
        .split_once(':')
        .with_context(|| format!("grant '{spec}' must be USER_ID:SECRET_HEX"))?;
    Ok((user_id.to_string(), parse_secret(secret_hex)?))
}
