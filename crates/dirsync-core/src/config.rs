//! Configuration types
//!
//! Directory server entries, sync settings and the YAML configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::ids::ServerId;
use crate::operation::SearchScope;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DIRSYNC_CONFIG";

/// Environment variable supplying a bind password for servers without one.
pub const BIND_PASSWORD_ENV: &str = "DIRSYNC_BIND_PASSWORD";

/// Configuration of one directory server.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Stable id. Derived from `name` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,

    /// Human readable description of the server.
    pub name: String,

    /// LDAP server hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind DN. Absent or empty means anonymous bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,

    /// Bind password. May instead be supplied per session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Root node for all searches and new entries (e.g., "ou=people,dc=example,dc=com").
    pub base_dn: String,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// How deep account searches reach below `base_dn`: "subtree" (default) or "one_level".
    #[serde(default)]
    pub search_scope: SearchScope,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("base_dn", &self.base_dn)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("search_scope", &self.search_scope)
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    389
}

impl ServerConfig {
    /// Create a new server config with the required fields and default host/port.
    pub fn new(name: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            host: default_host(),
            port: default_port(),
            bind_dn: None,
            bind_password: None,
            base_dn: base_dn.into(),
            use_ssl: false,
            use_starttls: false,
            search_scope: SearchScope::default(),
        }
    }

    /// Set host and port.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the bind DN.
    pub fn with_bind_dn(mut self, bind_dn: impl Into<String>) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self
    }

    /// Set the bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Pin an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: ServerId) -> Self {
        self.id = Some(id);
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Set the account search scope.
    #[must_use]
    pub fn with_search_scope(mut self, scope: SearchScope) -> Self {
        self.search_scope = scope;
        self
    }

    /// The stable id of this server.
    #[must_use]
    pub fn id(&self) -> ServerId {
        self.id.unwrap_or_else(|| ServerId::from_name(&self.name))
    }

    /// The bind DN, empty for anonymous bind.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        self.bind_dn.as_deref().unwrap_or("")
    }

    /// Whether binds against this server are anonymous.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.bind_dn().is_empty()
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::invalid_config("server name cannot be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(SyncError::invalid_config(format!(
                "server '{}': host cannot be empty",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(SyncError::invalid_config(format!(
                "server '{}': port cannot be 0",
                self.name
            )));
        }
        if self.base_dn.trim().is_empty() {
            return Err(SyncError::invalid_config(format!(
                "server '{}': base DN cannot be empty",
                self.name
            )));
        }
        if self.use_ssl && self.use_starttls {
            return Err(SyncError::invalid_config(format!(
                "server '{}': use_ssl and use_starttls are mutually exclusive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Transport settings applied to every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds. `None` leaves the transport default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,
}

fn default_connection_timeout() -> u64 {
    30
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            operation_timeout_secs: None,
        }
    }
}

impl ConnectionSettings {
    /// Get connection timeout as Duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the operation timeout as Duration, if any.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

/// Settings of the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// First uid number handed out when the local store holds none.
    #[serde(default)]
    pub uid_floor: u32,

    /// How many consecutive candidates the allocator probes before giving up.
    #[serde(default = "default_max_allocation_attempts")]
    pub max_allocation_attempts: u32,

    /// Primary group of every created account.
    #[serde(default = "default_gid_number")]
    pub gid_number: String,

    /// Parent of every created home directory.
    #[serde(default = "default_home_directory_prefix")]
    pub home_directory_prefix: String,

    /// Transport settings.
    #[serde(default)]
    pub connection: ConnectionSettings,
}

fn default_max_allocation_attempts() -> u32 {
    16
}

fn default_gid_number() -> String {
    "100".to_string()
}

fn default_home_directory_prefix() -> String {
    "/home".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            uid_floor: 0,
            max_allocation_attempts: default_max_allocation_attempts(),
            gid_number: default_gid_number(),
            home_directory_prefix: default_home_directory_prefix(),
            connection: ConnectionSettings::default(),
        }
    }
}

impl SyncSettings {
    /// Set the uid floor.
    #[must_use]
    pub fn with_uid_floor(mut self, floor: u32) -> Self {
        self.uid_floor = floor;
        self
    }

    /// Set the allocation attempt limit.
    #[must_use]
    pub fn with_max_allocation_attempts(mut self, attempts: u32) -> Self {
        self.max_allocation_attempts = attempts;
        self
    }

    /// Validate the settings.
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_allocation_attempts == 0 {
            return Err(SyncError::invalid_config(
                "max_allocation_attempts must be at least 1",
            ));
        }
        if self.gid_number.parse::<u32>().is_err() {
            return Err(SyncError::invalid_config(format!(
                "gid_number '{}' is not numeric",
                self.gid_number
            )));
        }
        Ok(())
    }
}

/// Root configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirsyncConfig {
    /// Engine settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Configured directory servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl DirsyncConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SyncError::invalid_config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> SyncResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| SyncError::invalid_config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration file path from environment or default.
    pub fn config_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "./config/dirsync.yaml".to_string())
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(BIND_PASSWORD_ENV) {
            for server in self.servers.iter_mut().filter(|s| s.bind_password.is_none()) {
                debug!(server = %server.name, "Using bind password from {}", BIND_PASSWORD_ENV);
                server.bind_password = Some(password.clone());
            }
        }
    }

    /// Validate every server and the sync settings.
    pub fn validate(&self) -> SyncResult<()> {
        self.sync.validate()?;
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !seen.insert(server.id()) {
                return Err(SyncError::invalid_config(format!(
                    "duplicate server id {} ('{}')",
                    server.id(),
                    server.name
                )));
            }
        }
        Ok(())
    }

    /// Find a server by name.
    pub fn find_server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}
