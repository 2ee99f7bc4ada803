//! Sync engine
//!
//! Pushes local account mutations to the directory and pulls the directory
//! back into the local store.
//!
//! Every public operation opens a fresh bound connection, runs its remote
//! calls and closes the connection before looking at the outcome. Sync
//! metadata is written straight to the store, never through a propagating
//! entry point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use tracing::{debug, info, instrument, warn};

use dirsync_core::account::{AccountPatch, DirectoryAccount};
use dirsync_core::config::{ServerConfig, SyncSettings};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::ids::ServerId;
use dirsync_core::mapping::{AttributeMapper, IMPORT_ATTRIBUTES, MODIFY_TIMESTAMP};
use dirsync_core::operation::DirectoryEntry;
use dirsync_core::timestamp::parse_generalized_time;
use dirsync_core::traits::{AccountStore, DirectoryConnection};

use crate::allocator::IdentifierAllocator;
use crate::registry::ServerRegistry;

/// Reject a write when the remote entry changed after the last confirmed sync.
///
/// A record that was never stamped loses against any remote timestamp.
pub fn check_concurrent_modification(
    dn: &str,
    last_sync: Option<DateTime<Utc>>,
    remote_modified: DateTime<Utc>,
) -> SyncResult<()> {
    match last_sync {
        Some(last_sync) if last_sync >= remote_modified => Ok(()),
        _ => Err(SyncError::ConcurrentModification {
            dn: dn.to_string(),
            remote_modified,
            last_sync,
        }),
    }
}

/// Orchestrates create/update/delete propagation and reconciliation.
pub struct SyncEngine {
    registry: Arc<ServerRegistry>,
    store: Arc<dyn AccountStore>,
    mapper: AttributeMapper,
    allocator: IdentifierAllocator,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("registry", &self.registry)
            .field("mapper", &self.mapper)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine.
    pub fn new(
        registry: Arc<ServerRegistry>,
        store: Arc<dyn AccountStore>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            registry,
            store,
            mapper: AttributeMapper::new(settings),
            allocator: IdentifierAllocator::new(settings),
        }
    }

    /// The server registry.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// The local store.
    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    /// Propagate a record: local-only records are created, others updated.
    pub async fn sync(&self, account: &DirectoryAccount) -> SyncResult<DirectoryAccount> {
        if account.is_local_only {
            self.create(account).await
        } else {
            self.update(account).await
        }
    }

    /// Create a local-only record on the directory.
    ///
    /// The allocated uid number is persisted before the add; when the add
    /// fails it stays in place and the error propagates.
    #[instrument(skip(self, account), fields(account = %account.name, server_id = %account.server_id))]
    pub async fn create(&self, account: &DirectoryAccount) -> SyncResult<DirectoryAccount> {
        let server = self.registry.get(account.server_id).await?;
        let mut conn = self.registry.connect(server.id(), None).await?;

        let result = self.create_entry(conn.as_mut(), &server, account).await;
        conn.close().await;
        let uid_number = result?;

        let synced = AccountPatch::created_remotely(Utc::now());
        self.store.update(account.id, &synced).await?;

        let mut account = account.clone();
        account.apply(&AccountPatch::allocated(uid_number));
        account.apply(&synced);

        info!(
            account = %account.name,
            uid_number,
            server = %server.name,
            "Account created on directory"
        );
        Ok(account)
    }

    async fn create_entry(
        &self,
        conn: &mut dyn DirectoryConnection,
        server: &ServerConfig,
        account: &DirectoryAccount,
    ) -> SyncResult<u32> {
        let existing = conn
            .search(
                &server.base_dn,
                server.search_scope,
                &AttributeMapper::username_filter(&account.name),
                &["uidNumber"],
            )
            .await?;
        if !existing.is_empty() {
            return Err(SyncError::DuplicateEntry {
                name: account.name.clone(),
            });
        }

        let uid_number = self
            .allocator
            .next_id(&mut *conn, server, self.store.as_ref())
            .await?;
        self.store
            .update(account.id, &AccountPatch::allocated(uid_number))
            .await?;

        let entry = self
            .mapper
            .to_create_entry(account, uid_number, &server.base_dn);
        debug!(dn = %entry.dn, uid_number, "Adding account entry");
        conn.add(&entry).await?;

        Ok(uid_number)
    }

    /// Push local changes of an already created record.
    #[instrument(skip(self, account), fields(account = %account.name, server_id = %account.server_id))]
    pub async fn update(&self, account: &DirectoryAccount) -> SyncResult<DirectoryAccount> {
        self.apply_remote(account, false).await?;

        let synced = AccountPatch::synced_at(Utc::now());
        self.store.update(account.id, &synced).await?;

        let mut account = account.clone();
        account.apply(&synced);

        info!(account = %account.name, "Account updated on directory");
        Ok(account)
    }

    /// Remove a record remotely, then locally.
    ///
    /// A local-only record has nothing to remove remotely.
    #[instrument(skip(self, account), fields(account = %account.name, server_id = %account.server_id))]
    pub async fn delete(&self, account: &DirectoryAccount) -> SyncResult<()> {
        if account.is_local_only {
            debug!("Account was never created remotely, deleting locally only");
        } else {
            self.apply_remote(account, true).await?;
            info!(account = %account.name, "Account deleted from directory");
        }

        self.store.delete(&[account.id]).await
    }

    async fn apply_remote(&self, account: &DirectoryAccount, remove: bool) -> SyncResult<()> {
        let uid_number = account.numeric_id.ok_or_else(|| {
            SyncError::operation_failed(format!(
                "account '{}' is marked as created remotely but has no uid number",
                account.name
            ))
        })?;

        let server = self.registry.get(account.server_id).await?;
        let mut conn = self.registry.connect(server.id(), None).await?;

        let result = self
            .modify_entry(conn.as_mut(), &server, account, uid_number, remove)
            .await;
        conn.close().await;
        result
    }

    async fn modify_entry(
        &self,
        conn: &mut dyn DirectoryConnection,
        server: &ServerConfig,
        account: &DirectoryAccount,
        uid_number: u32,
        remove: bool,
    ) -> SyncResult<()> {
        let entry = conn
            .search(
                &server.base_dn,
                server.search_scope,
                &AttributeMapper::uid_number_filter(uid_number),
                &[MODIFY_TIMESTAMP],
            )
            .await?
            .into_iter()
            .next()
            .ok_or(SyncError::EntryMissingRemotely { uid_number })?;

        let remote_modified = remote_modified(&entry)?;
        if let Err(e) = check_concurrent_modification(&entry.dn, account.last_sync, remote_modified) {
            warn!(
                dn = %entry.dn,
                remote_modified = %remote_modified,
                last_sync = ?account.last_sync,
                "Entry changed on the directory since last sync"
            );
            return Err(e);
        }

        if remove {
            debug!(dn = %entry.dn, "Deleting account entry");
            conn.delete(&entry.dn).await
        } else {
            let changes = self.mapper.to_update_changes(account);
            debug!(dn = %entry.dn, changes = changes.len(), "Replacing account attributes");
            conn.modify(&entry.dn, &changes).await
        }
    }

    /// Rebuild a server's local records from a live directory search.
    ///
    /// The pulled set replaces the old records in one store call, so a
    /// failed pull leaves them untouched.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, server_id: ServerId) -> SyncResult<Vec<DirectoryAccount>> {
        let server = self.registry.get(server_id).await?;
        let mut conn = self.registry.connect(server_id, None).await?;

        let result = self.pull_accounts(conn.as_mut(), &server).await;
        conn.close().await;
        let accounts = result?;

        self.store
            .replace_server_accounts(server_id, accounts.clone())
            .await?;

        info!(server = %server.name, count = accounts.len(), "Reconciled accounts from directory");
        Ok(accounts)
    }

    async fn pull_accounts(
        &self,
        conn: &mut dyn DirectoryConnection,
        server: &ServerConfig,
    ) -> SyncResult<Vec<DirectoryAccount>> {
        let synced_at = Utc::now();
        let mut entries = conn
            .search_stream(
                &server.base_dn,
                server.search_scope,
                &AttributeMapper::all_accounts_filter(),
                &IMPORT_ATTRIBUTES,
            )
            .await?;

        let mut accounts = Vec::new();
        while let Some(entry) = entries.try_next().await? {
            accounts.push(self.mapper.from_entry(&entry, server.id(), synced_at)?);
        }
        Ok(accounts)
    }

    /// Open, bind and close a connection.
    #[instrument(skip(self, password_override))]
    pub async fn test_connection(
        &self,
        server_id: ServerId,
        password_override: Option<&str>,
    ) -> SyncResult<()> {
        let mut conn = self.registry.connect(server_id, password_override).await?;
        conn.close().await;
        Ok(())
    }
}

/// The `modifyTimestamp` of an entry as a UTC instant.
fn remote_modified(entry: &DirectoryEntry) -> SyncResult<DateTime<Utc>> {
    let raw = entry
        .first(MODIFY_TIMESTAMP)
        .ok_or_else(|| SyncError::malformed(&entry.dn, "missing modifyTimestamp"))?;

    parse_generalized_time(raw).ok_or_else(|| {
        SyncError::malformed(&entry.dn, format!("unparseable modifyTimestamp '{raw}'"))
    })
}
