//! Collaborator traits
//!
//! The seams of the sync engine: the directory transport and the local store.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::account::{AccountFilter, AccountPatch, DirectoryAccount};
use crate::config::{ConnectionSettings, ServerConfig};
use crate::error::SyncResult;
use crate::ids::{AccountId, ServerId};
use crate::operation::{AttributeChange, DirectoryEntry, Filter, SearchScope};

/// Lazy, finite, non-restartable sequence of search results.
///
/// The stream borrows its connection mutably: the connection cannot issue
/// another call until the stream is drained or dropped.
pub type EntryStream<'a> = BoxStream<'a, SyncResult<DirectoryEntry>>;

/// Factory for directory connections.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Open an unbound connection to a server.
    async fn open(
        &self,
        server: &ServerConfig,
        settings: &ConnectionSettings,
    ) -> SyncResult<Box<dyn DirectoryConnection>>;
}

/// One open connection to a directory server.
///
/// Callers must call [`DirectoryConnection::close`] on every exit path.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind. An empty DN binds anonymously.
    async fn bind(&mut self, dn: &str, password: &str) -> SyncResult<()>;

    /// Search and collect every result.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> SyncResult<Vec<DirectoryEntry>>;

    /// Search and yield results as they arrive.
    async fn search_stream<'a>(
        &'a mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> SyncResult<EntryStream<'a>>;

    /// Add a new entry.
    async fn add(&mut self, entry: &DirectoryEntry) -> SyncResult<()>;

    /// Replace attributes of an existing entry.
    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> SyncResult<()>;

    /// Delete an entry.
    async fn delete(&mut self, dn: &str) -> SyncResult<()>;

    /// Close the connection. Idempotent; close-time errors are swallowed.
    async fn close(&mut self);
}

/// Local persistent record store.
///
/// Each call is transactional on its own. Nothing here propagates to the
/// directory; propagation is decided by the caller.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Highest uid number held by accounts of a server.
    async fn max_numeric_id(&self, server_id: ServerId) -> SyncResult<Option<u32>>;

    /// Insert a record and return its id.
    async fn insert(&self, account: DirectoryAccount) -> SyncResult<AccountId>;

    /// Apply a partial update.
    async fn update(&self, id: AccountId, patch: &AccountPatch) -> SyncResult<()>;

    /// Delete records. Unknown ids are ignored.
    async fn delete(&self, ids: &[AccountId]) -> SyncResult<()>;

    /// Find records matching a filter.
    async fn find(&self, filter: &AccountFilter) -> SyncResult<Vec<DirectoryAccount>>;

    /// Fetch one record.
    async fn get(&self, id: AccountId) -> SyncResult<Option<DirectoryAccount>>;

    /// Atomically replace every record of a server with the given set.
    async fn replace_server_accounts(
        &self,
        server_id: ServerId,
        accounts: Vec<DirectoryAccount>,
    ) -> SyncResult<()>;
}
