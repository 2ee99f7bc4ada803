//! Server registry
//!
//! Holds the configured directory servers and hands out bound connections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use dirsync_core::config::{ConnectionSettings, DirsyncConfig, ServerConfig};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::ids::ServerId;
use dirsync_core::traits::{DirectoryConnection, DirectoryConnector};

/// Registry of directory servers and factory for bound connections.
pub struct ServerRegistry {
    connector: Arc<dyn DirectoryConnector>,
    settings: ConnectionSettings,
    servers: RwLock<HashMap<ServerId, ServerConfig>>,
    /// Passwords entered interactively, kept for the life of the process.
    session_passwords: RwLock<HashMap<ServerId, String>>,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new(connector: Arc<dyn DirectoryConnector>, settings: ConnectionSettings) -> Self {
        Self {
            connector,
            settings,
            servers: RwLock::new(HashMap::new()),
            session_passwords: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding every server of a loaded configuration.
    pub async fn from_config(
        connector: Arc<dyn DirectoryConnector>,
        config: &DirsyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;

        let registry = Self::new(connector, config.sync.connection.clone());
        for server in &config.servers {
            registry.register(server.clone()).await?;
        }
        Ok(registry)
    }

    /// Register or replace a server configuration.
    pub async fn register(&self, server: ServerConfig) -> SyncResult<ServerId> {
        server.validate()?;

        let id = server.id();
        debug!(server_id = %id, server = %server.name, "Registering directory server");
        self.servers.write().await.insert(id, server);
        Ok(id)
    }

    /// Get a server configuration.
    pub async fn get(&self, server_id: ServerId) -> SyncResult<ServerConfig> {
        self.servers
            .read()
            .await
            .get(&server_id)
            .cloned()
            .ok_or(SyncError::ServerNotFound { server_id })
    }

    /// All registered servers, ordered by name.
    pub async fn list(&self) -> Vec<ServerConfig> {
        let mut servers: Vec<ServerConfig> = self.servers.read().await.values().cloned().collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// Cache a working password for the rest of the session.
    pub async fn set_session_password(&self, server_id: ServerId, password: impl Into<String>) {
        self.session_passwords
            .write()
            .await
            .insert(server_id, password.into());
    }

    /// Forget a cached session password.
    pub async fn clear_session_password(&self, server_id: ServerId) {
        self.session_passwords.write().await.remove(&server_id);
    }

    /// Whether a bind against this server would have a password to offer.
    ///
    /// Anonymous servers never need one.
    pub async fn has_credentials(&self, server_id: ServerId) -> SyncResult<bool> {
        let server = self.get(server_id).await?;
        if server.is_anonymous() {
            return Ok(true);
        }
        Ok(self.resolve_password(&server, None).await.is_some())
    }

    /// Password used for a bind: configured, then explicit override, then
    /// the session cache.
    async fn resolve_password(
        &self,
        server: &ServerConfig,
        password_override: Option<&str>,
    ) -> Option<String> {
        if let Some(ref configured) = server.bind_password {
            if !configured.is_empty() {
                return Some(configured.clone());
            }
        }
        if let Some(password) = password_override.filter(|p| !p.is_empty()) {
            return Some(password.to_string());
        }
        self.session_passwords
            .read()
            .await
            .get(&server.id())
            .cloned()
    }

    /// Open a connection to a server and bind it.
    ///
    /// A server with a bind DN but no password anywhere fails before
    /// connecting. The connection is closed again when the bind fails.
    #[instrument(skip(self, password_override))]
    pub async fn connect(
        &self,
        server_id: ServerId,
        password_override: Option<&str>,
    ) -> SyncResult<Box<dyn DirectoryConnection>> {
        let server = self.get(server_id).await?;

        let password = if server.is_anonymous() {
            String::new()
        } else {
            self.resolve_password(&server, password_override)
                .await
                .ok_or_else(|| {
                    SyncError::auth(format!("no password available for '{}'", server.bind_dn()))
                })?
        };

        let mut conn = self.connector.open(&server, &self.settings).await?;

        if let Err(e) = conn.bind(server.bind_dn(), &password).await {
            warn!(server = %server.name, error = %e, "Bind failed");
            conn.close().await;
            return Err(e);
        }

        info!(server = %server.name, anonymous = server.is_anonymous(), "Directory connection bound");
        Ok(conn)
    }
}
