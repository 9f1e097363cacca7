/// One configured upstream server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_connections: usize,
    /// Lower values are tried first. Ties broken by configuration order.
    pub priority: u32,
    pub default_group: String,
    pub enabled: bool,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            tls: true,
            username: None,
            password: None,
            max_connections: 4,
            priority: 100,
            default_group: "alt.binaries.sharevault".to_string(),
            enabled: true,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_connections(mut self, n: usize) -> Self {
        self.max_connections = n.max(1);
        self
    }
}
