//! Reads the set of upstream servers `sv-transport` should dial from a
//! small JSON file under the data directory, rather than baking connection
//! details into the binary. This is local CLI plumbing, not a core engine
//! concern — the core crates only ever see the resulting `ServerConfig`s.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use sv_core::{Config, Error, Result};
use sv_transport::{ServerConfig, Transport};

#[derive(Deserialize)]
struct ServerSpec {
    name: String,
    host: String,
    port: u16,
    #[serde(default = "default_true")]
    tls: bool,
    username: Option<String>,
    password: Option<String>,
    max_connections: Option<usize>,
    #[serde(default)]
    priority: u32,
    #[serde(default = "default_group")]
    default_group: String,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_group() -> String {
    "alt.binaries.sharevault".to_string()
}

fn servers_path(config: &Config) -> PathBuf {
    config.data_dir.join("servers.json")
}

/// Loads the configured server list. Fails with a pointer to the expected
/// file rather than silently running with zero servers, since every
/// command that reaches this is about to need the network.
pub fn load_server_configs(config: &Config) -> Result<Vec<ServerConfig>> {
    let path = servers_path(config);
    let bytes = std::fs::read(&path).map_err(|_| {
        Error::InvalidInput(format!(
            "no server list at {}; create it with entries like \
             [{{\"name\":\"primary\",\"host\":\"news.example.org\",\"port\":563}}]",
            path.display()
        ))
    })?;
    let specs: Vec<ServerSpec> = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidInput(format!("{} is not valid: {e}", path.display())))?;

    if specs.is_empty() {
        return Err(Error::InvalidInput(format!("{} lists no servers", path.display())));
    }

    Ok(specs
        .into_iter()
        .map(|s| {
            let max_connections = s.max_connections.unwrap_or(config.max_connections_per_server);
            let mut cfg = ServerConfig::new(s.name, s.host, s.port)
                .with_priority(s.priority)
                .with_max_connections(max_connections);
            cfg.tls = s.tls;
            cfg.default_group = s.default_group;
            cfg.enabled = s.enabled;
            if let (Some(username), Some(password)) = (s.username, s.password) {
                cfg = cfg.with_credentials(username, password);
            }
            cfg
        })
        .collect())
}

/// Builds a `Transport` from the configured server list, using
/// `config.max_connections_per_server` as the per-server connection cap and
/// a 5-minute idle rotation, matching the defaults `sv-uploader` and
/// `sv-downloader` are exercised against in their own tests.
pub fn build_transport(config: &Config) -> Result<Transport> {
    let servers = load_server_configs(config)?;
    Ok(Transport::new(servers, Duration::from_secs(300), None, 3))
}
