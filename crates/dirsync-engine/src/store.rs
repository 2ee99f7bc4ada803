//! In-memory account store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use dirsync_core::account::{AccountFilter, AccountPatch, DirectoryAccount};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::ids::{AccountId, ServerId};
use dirsync_core::traits::AccountStore;

/// `AccountStore` held in process memory.
///
/// Every call takes the lock once, so each call is atomic on its own.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, DirectoryAccount>>,
}

impl MemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn max_numeric_id(&self, server_id: ServerId) -> SyncResult<Option<u32>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.server_id == server_id)
            .filter_map(|a| a.numeric_id)
            .max())
    }

    async fn insert(&self, account: DirectoryAccount) -> SyncResult<AccountId> {
        let id = account.id;
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&id) {
            return Err(SyncError::store(format!("account {} already stored", id)));
        }
        accounts.insert(id, account);
        Ok(id)
    }

    async fn update(&self, id: AccountId, patch: &AccountPatch) -> SyncResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or(SyncError::AccountNotFound { account_id: id })?;
        account.apply(patch);
        Ok(())
    }

    async fn delete(&self, ids: &[AccountId]) -> SyncResult<()> {
        let mut accounts = self.accounts.write().await;
        for id in ids {
            accounts.remove(id);
        }
        Ok(())
    }

    async fn find(&self, filter: &AccountFilter) -> SyncResult<Vec<DirectoryAccount>> {
        let mut found: Vec<DirectoryAccount> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn get(&self, id: AccountId) -> SyncResult<Option<DirectoryAccount>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn replace_server_accounts(
        &self,
        server_id: ServerId,
        accounts: Vec<DirectoryAccount>,
    ) -> SyncResult<()> {
        let mut held = self.accounts.write().await;
        let before = held.len();
        held.retain(|_, a| a.server_id != server_id);
        let removed = before - held.len();

        let inserted = accounts.len();
        for account in accounts {
            held.insert(account.id, account);
        }

        debug!(server_id = %server_id, removed, inserted, "Replaced server accounts");
        Ok(())
    }
}
