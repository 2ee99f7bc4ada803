//! Account service
//!
//! The entry points a UI or CLI drives. Every mutation states whether it is
//! mirrored to the directory or stays local.

use serde::Serialize;
use tracing::{info, instrument, warn};

use dirsync_core::account::{AccountFilter, AccountPatch, DirectoryAccount, Propagation};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::ids::{AccountId, ServerId};

use crate::engine::SyncEngine;
use crate::validation::{self, ValidationWarning};

/// Outcome of a connection test, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestReport {
    /// Whether the bind succeeded.
    pub success: bool,
    /// Short title.
    pub title: String,
    /// Details, with the underlying error appended on failure.
    pub message: String,
    /// Stable error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl ConnectionTestReport {
    fn succeeded() -> Self {
        Self {
            success: true,
            title: "Connection Test Succeeded!".to_string(),
            message: "Everything seems properly set up!".to_string(),
            error_code: None,
        }
    }

    fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            title: "Connection Test Failed!".to_string(),
            message: format!("Here is what we got instead:\n {}", error),
            error_code: Some(error.error_code()),
        }
    }
}

impl std::fmt::Display for ConnectionTestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.title, self.message)
    }
}

/// What the UI should do after a server was picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerSelection {
    /// No working credentials: ask the user for the bind password.
    ShowPasswordPrompt,
    /// Credentials work and the accounts were imported.
    OpenManagerView {
        server_id: ServerId,
        server_name: String,
        imported: usize,
    },
}

/// Propagation-aware account operations.
#[derive(Debug)]
pub struct AccountService {
    engine: SyncEngine,
}

impl AccountService {
    /// Create a service around an engine.
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Insert a new account, optionally creating it on the directory.
    ///
    /// Whitespace is stripped from the username and an empty display name
    /// falls back to it. The local record is written first. When the
    /// directory rejects it, the record stays local-only and the error
    /// propagates. On `DuplicateEntry` the username is already taken
    /// remotely: delete or rename the local record before pushing it again.
    #[instrument(skip(self, account), fields(account = %account.name))]
    pub async fn create(
        &self,
        mut account: DirectoryAccount,
        propagation: Propagation,
    ) -> SyncResult<DirectoryAccount> {
        account.name = validation::normalize_username(&account.name);
        account.display_name = validation::default_display_name(&account.name, &account.display_name);
        if account.name.is_empty() {
            return Err(SyncError::invalid_config("username cannot be empty"));
        }

        let store = self.engine.store();
        let existing = store
            .find(&AccountFilter::server(account.server_id).named(&account.name))
            .await?;
        if !existing.is_empty() {
            return Err(SyncError::DuplicateEntry {
                name: account.name,
            });
        }

        store.insert(account.clone()).await?;

        if propagation.is_mirror() {
            self.engine.sync(&account).await
        } else {
            Ok(account)
        }
    }

    /// Apply a patch, optionally mirroring the result to the directory.
    ///
    /// Records never created remotely are created on a mirrored update. A
    /// mirrored edit is stored only once the directory accepted it.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: AccountId,
        patch: &AccountPatch,
        propagation: Propagation,
    ) -> SyncResult<DirectoryAccount> {
        let mut account = self.load(id).await?;

        if let Some(ref name) = patch.name {
            if *name != account.name {
                if !account.is_local_only {
                    return Err(SyncError::operation_failed(format!(
                        "account '{}' exists on the directory, its username cannot change",
                        account.name
                    )));
                }
                let store = self.engine.store().as_ref();
                if let Some(warning) =
                    validation::check_duplicate(store, account.server_id, name, Some(id)).await?
                {
                    warn!(%warning, "Rename rejected");
                    return Err(SyncError::DuplicateEntry { name: name.clone() });
                }
            }
        }

        account.apply(patch);
        if !propagation.is_mirror() {
            self.engine.store().update(id, patch).await?;
            return Ok(account);
        }

        let synced = self.engine.sync(&account).await?;
        self.engine
            .store()
            .update(id, &AccountPatch::from(&synced))
            .await?;
        Ok(synced)
    }

    /// Delete an account, optionally removing it from the directory first.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: AccountId, propagation: Propagation) -> SyncResult<()> {
        let account = self.load(id).await?;

        if propagation.is_mirror() {
            self.engine.delete(&account).await
        } else {
            self.engine.store().delete(&[id]).await
        }
    }

    /// Retry propagation of a stored record, e.g. after a failed create.
    #[instrument(skip(self))]
    pub async fn push(&self, id: AccountId) -> SyncResult<DirectoryAccount> {
        let account = self.load(id).await?;
        self.engine.sync(&account).await
    }

    /// Advisory warnings for an account about to be written.
    pub async fn validate(&self, account: &DirectoryAccount) -> SyncResult<Vec<ValidationWarning>> {
        validation::validate_account(self.engine.store().as_ref(), account).await
    }

    /// Accounts of one server, ordered by name.
    pub async fn list(&self, server_id: ServerId) -> SyncResult<Vec<DirectoryAccount>> {
        self.engine.store().find(&AccountFilter::server(server_id)).await
    }

    /// Test the configured credentials of a server.
    ///
    /// Never fails: the outcome is part of the report.
    pub async fn test_connection(
        &self,
        server_id: ServerId,
        password_override: Option<&str>,
    ) -> ConnectionTestReport {
        match self.engine.test_connection(server_id, password_override).await {
            Ok(()) => {
                info!(server_id = %server_id, "Connection test succeeded");
                ConnectionTestReport::succeeded()
            }
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Connection test failed");
                ConnectionTestReport::failed(&e)
            }
        }
    }

    /// Rebuild the local accounts of a server and return how many were loaded.
    pub async fn fetch_and_import(&self, server_id: ServerId) -> SyncResult<usize> {
        Ok(self.engine.reconcile(server_id).await?.len())
    }

    /// Decide what follows picking a server.
    ///
    /// A working password (configured, entered or cached) is kept for the
    /// session and the accounts are imported. Anonymous servers need none.
    #[instrument(skip(self, entered_password))]
    pub async fn select_server(
        &self,
        server_id: ServerId,
        entered_password: Option<&str>,
    ) -> SyncResult<ServerSelection> {
        let registry = self.engine.registry();
        let server = registry.get(server_id).await?;

        let entered_password = entered_password.filter(|p| !p.is_empty());
        if entered_password.is_none() && !registry.has_credentials(server_id).await? {
            return Ok(ServerSelection::ShowPasswordPrompt);
        }

        if let Err(e) = self.engine.test_connection(server_id, entered_password).await {
            warn!(server = %server.name, error = %e, "Selected server rejected the credentials");
            return Ok(ServerSelection::ShowPasswordPrompt);
        }

        if let Some(password) = entered_password {
            if server.bind_password.as_deref().map_or(true, str::is_empty) {
                registry.set_session_password(server_id, password).await;
            }
        }

        let imported = self.fetch_and_import(server_id).await?;
        Ok(ServerSelection::OpenManagerView {
            server_id,
            server_name: server.name,
            imported,
        })
    }

    async fn load(&self, id: AccountId) -> SyncResult<DirectoryAccount> {
        self.engine
            .store()
            .get(id)
            .await?
            .ok_or(SyncError::AccountNotFound { account_id: id })
    }
}
