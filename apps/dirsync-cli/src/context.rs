//! Wiring shared by every command.

use std::sync::Arc;

use anyhow::{anyhow, Context as _};

use dirsync_core::config::DirsyncConfig;
use dirsync_core::ids::ServerId;
use dirsync_engine::{AccountService, MemoryAccountStore, ServerRegistry, SyncEngine};
use dirsync_ldap::LdapConnector;

/// Loaded configuration plus a ready service.
pub struct Context {
    pub config: DirsyncConfig,
    pub service: AccountService,
}

impl Context {
    /// Load the configuration and build the service on the LDAP transport.
    pub async fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let path = path
            .map(str::to_string)
            .unwrap_or_else(DirsyncConfig::config_path);

        let mut config = DirsyncConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?;
        config.apply_env_overrides();

        tracing::debug!(path = %path, servers = config.servers.len(), "Configuration loaded");

        let registry =
            ServerRegistry::from_config(Arc::new(LdapConnector::new()), &config).await?;
        let engine = SyncEngine::new(
            Arc::new(registry),
            Arc::new(MemoryAccountStore::new()),
            &config.sync,
        );

        Ok(Self {
            config,
            service: AccountService::new(engine),
        })
    }

    /// Resolve a server by name or id.
    pub fn resolve_server(&self, reference: &str) -> anyhow::Result<ServerId> {
        if let Some(server) = self.config.find_server(reference) {
            return Ok(server.id());
        }
        if let Ok(id) = ServerId::parse(reference) {
            if self.config.servers.iter().any(|s| s.id() == id) {
                return Ok(id);
            }
        }
        Err(anyhow!("no server named '{reference}' is configured"))
    }
}
