//! Shared fixtures for engine integration tests.
//!
//! `FakeDirectory` is an in-memory directory with call counters and
//! injectable failures. Filters are evaluated structurally.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};

use dirsync_core::prelude::*;
use dirsync_core::timestamp::format_generalized_time;
use dirsync_engine::{AccountService, MemoryAccountStore, ServerRegistry, SyncEngine};

pub const BASE_DN: &str = "ou=people,dc=example,dc=com";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_PASSWORD: &str = "secret";

// =============================================================================
// Fake directory
// =============================================================================

/// In-memory directory server.
pub struct FakeDirectory {
    entries: Mutex<BTreeMap<String, DirectoryEntry>>,
    credentials: Mutex<BTreeMap<String, String>>,
    search_log: Mutex<Vec<String>>,
    open_behavior: AtomicUsize,   // 0=Success, 1=NetworkError
    add_behavior: AtomicUsize,    // 0=Success, 1=Rejected
    stream_fail_after: AtomicUsize, // usize::MAX=never
    open_count: AtomicUsize,
    bind_count: AtomicUsize,
    close_count: AtomicUsize,
    search_count: AtomicUsize,
    add_count: AtomicUsize,
    modify_count: AtomicUsize,
    delete_count: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        let directory = Self {
            entries: Mutex::new(BTreeMap::new()),
            credentials: Mutex::new(BTreeMap::new()),
            search_log: Mutex::new(Vec::new()),
            open_behavior: AtomicUsize::new(0),
            add_behavior: AtomicUsize::new(0),
            stream_fail_after: AtomicUsize::new(usize::MAX),
            open_count: AtomicUsize::new(0),
            bind_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            search_count: AtomicUsize::new(0),
            add_count: AtomicUsize::new(0),
            modify_count: AtomicUsize::new(0),
            delete_count: AtomicUsize::new(0),
        };
        directory.allow_bind(ADMIN_DN, ADMIN_PASSWORD);
        Arc::new(directory)
    }

    pub fn allow_bind(&self, dn: &str, password: &str) {
        self.credentials
            .lock()
            .unwrap()
            .insert(dn.to_string(), password.to_string());
    }

    pub fn fail_open(&self) {
        self.open_behavior.store(1, Ordering::SeqCst);
    }

    pub fn fail_add(&self) {
        self.add_behavior.store(1, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.open_behavior.store(0, Ordering::SeqCst);
        self.add_behavior.store(0, Ordering::SeqCst);
        self.stream_fail_after.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn fail_stream_after(&self, entries: usize) {
        self.stream_fail_after.store(entries, Ordering::SeqCst);
    }

    /// Seed a posixAccount entry as another tool would have created it.
    pub fn seed_account(&self, name: &str, uid_number: u32) -> String {
        let dn = format!("cn={},{}", name, BASE_DN);
        let entry = DirectoryEntry::new(&dn)
            .with_values("objectClass", ["posixAccount", "inetOrgPerson"])
            .with("uid", name)
            .with("cn", name)
            .with("sn", name)
            .with("uidNumber", uid_number.to_string())
            .with("gidNumber", "100")
            .with("homeDirectory", format!("/home/{}", name))
            .with("loginShell", "/bin/bash")
            .with("modifyTimestamp", format_generalized_time(&Utc::now()));
        self.seed(entry);
        dn
    }

    pub fn seed(&self, entry: DirectoryEntry) {
        self.entries.lock().unwrap().insert(entry.dn.clone(), entry);
    }

    /// Simulate an out-of-band change at a given instant.
    pub fn touch(&self, dn: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(dn) {
            entry.set("modifyTimestamp", vec![format_generalized_time(&at)]);
        }
    }

    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.entries.lock().unwrap().get(dn).cloned()
    }

    pub fn entry_by_uid(&self, name: &str) -> Option<DirectoryEntry> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .find(|e| e.first("uid") == Some(name))
            .cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn searches(&self) -> Vec<String> {
        self.search_log.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn binds(&self) -> usize {
        self.bind_count.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_count.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.add_count.load(Ordering::SeqCst)
    }

    pub fn modify_calls(&self) -> usize {
        self.modify_count.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    fn matching(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Vec<DirectoryEntry> {
        self.search_count.fetch_add(1, Ordering::SeqCst);
        self.search_log
            .lock()
            .unwrap()
            .push(filter.to_ldap_string());

        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| in_scope(&e.dn, base_dn, scope))
            .filter(|e| matches(filter, e))
            .map(|e| project(e, attributes))
            .collect()
    }
}

fn in_scope(dn: &str, base_dn: &str, scope: SearchScope) -> bool {
    let dn = dn.to_lowercase();
    let base = base_dn.to_lowercase();
    match scope {
        SearchScope::Subtree => dn.ends_with(&base),
        SearchScope::OneLevel => dn
            .split_once(',')
            .map_or(false, |(_, parent)| parent == base),
    }
}

fn matches(filter: &Filter, entry: &DirectoryEntry) -> bool {
    match filter {
        Filter::Equals { attribute, value } => entry
            .get(attribute)
            .map_or(false, |values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        Filter::And { filters } => filters.iter().all(|f| matches(f, entry)),
        Filter::Or { filters } => filters.iter().any(|f| matches(f, entry)),
    }
}

fn project(entry: &DirectoryEntry, attributes: &[&str]) -> DirectoryEntry {
    if attributes.is_empty() {
        return entry.clone();
    }
    let mut projected = DirectoryEntry::new(&entry.dn);
    for attribute in attributes {
        if let Some(values) = entry.get(attribute) {
            projected.set(*attribute, values.to_vec());
        }
    }
    projected
}

/// Connector handing out connections to a shared `FakeDirectory`.
pub struct FakeConnector {
    directory: Arc<FakeDirectory>,
}

impl FakeConnector {
    pub fn new(directory: Arc<FakeDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl DirectoryConnector for FakeConnector {
    async fn open(
        &self,
        server: &ServerConfig,
        _settings: &ConnectionSettings,
    ) -> SyncResult<Box<dyn DirectoryConnection>> {
        self.directory.open_count.fetch_add(1, Ordering::SeqCst);
        match self.directory.open_behavior.load(Ordering::SeqCst) {
            0 => Ok(Box::new(FakeConnection {
                directory: self.directory.clone(),
                closed: false,
            })),
            _ => Err(SyncError::network(format!(
                "Failed to connect to LDAP server at {}",
                server.url()
            ))),
        }
    }
}

pub struct FakeConnection {
    directory: Arc<FakeDirectory>,
    closed: bool,
}

#[async_trait]
impl DirectoryConnection for FakeConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> SyncResult<()> {
        self.directory.bind_count.fetch_add(1, Ordering::SeqCst);
        if dn.is_empty() {
            return Ok(());
        }
        let credentials = self.directory.credentials.lock().unwrap();
        match credentials.get(dn) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(SyncError::auth(format!("invalid credentials for '{}'", dn))),
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> SyncResult<Vec<DirectoryEntry>> {
        Ok(self.directory.matching(base_dn, scope, filter, attributes))
    }

    async fn search_stream<'a>(
        &'a mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> SyncResult<EntryStream<'a>> {
        let fail_after = self.directory.stream_fail_after.load(Ordering::SeqCst);
        let mut items: Vec<SyncResult<DirectoryEntry>> = self
            .directory
            .matching(base_dn, scope, filter, attributes)
            .into_iter()
            .map(Ok)
            .collect();
        if fail_after < items.len() {
            items.truncate(fail_after);
            items.push(Err(SyncError::network("connection reset during search")));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn add(&mut self, entry: &DirectoryEntry) -> SyncResult<()> {
        self.directory.add_count.fetch_add(1, Ordering::SeqCst);
        if self.directory.add_behavior.load(Ordering::SeqCst) != 0 {
            return Err(SyncError::operation_failed(format!(
                "LDAP add failed for '{}' with code 65: object class violation",
                entry.dn
            )));
        }

        let mut entries = self.directory.entries.lock().unwrap();
        if entries.contains_key(&entry.dn) {
            return Err(SyncError::DuplicateEntry {
                name: entry.dn.clone(),
            });
        }
        let mut stored = entry.clone();
        stored.set(
            "modifyTimestamp",
            vec![format_generalized_time(&Utc::now())],
        );
        entries.insert(stored.dn.clone(), stored);
        Ok(())
    }

    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> SyncResult<()> {
        self.directory.modify_count.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.directory.entries.lock().unwrap();
        let entry = entries.get_mut(dn).ok_or_else(|| {
            SyncError::operation_failed(format!("LDAP modify failed for '{}': no such object", dn))
        })?;

        for change in changes {
            entry
                .attributes
                .retain(|name, _| !name.eq_ignore_ascii_case(&change.attribute));
            if !change.is_clear() {
                entry.set(change.attribute.clone(), change.values.clone());
            }
        }
        entry.set(
            "modifyTimestamp",
            vec![format_generalized_time(&Utc::now())],
        );
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> SyncResult<()> {
        self.directory.delete_count.fetch_add(1, Ordering::SeqCst);
        self.directory
            .entries
            .lock()
            .unwrap()
            .remove(dn)
            .map(|_| ())
            .ok_or_else(|| {
                SyncError::operation_failed(format!("LDAP delete failed for '{}': no such object", dn))
            })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.directory.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Counting store
// =============================================================================

/// `MemoryAccountStore` wrapper counting every call.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryAccountStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for CountingStore {
    async fn max_numeric_id(&self, server_id: ServerId) -> SyncResult<Option<u32>> {
        self.hit();
        self.inner.max_numeric_id(server_id).await
    }

    async fn insert(&self, account: DirectoryAccount) -> SyncResult<AccountId> {
        self.hit();
        self.inner.insert(account).await
    }

    async fn update(&self, id: AccountId, patch: &AccountPatch) -> SyncResult<()> {
        self.hit();
        self.inner.update(id, patch).await
    }

    async fn delete(&self, ids: &[AccountId]) -> SyncResult<()> {
        self.hit();
        self.inner.delete(ids).await
    }

    async fn find(&self, filter: &AccountFilter) -> SyncResult<Vec<DirectoryAccount>> {
        self.hit();
        self.inner.find(filter).await
    }

    async fn get(&self, id: AccountId) -> SyncResult<Option<DirectoryAccount>> {
        self.hit();
        self.inner.get(id).await
    }

    async fn replace_server_accounts(
        &self,
        server_id: ServerId,
        accounts: Vec<DirectoryAccount>,
    ) -> SyncResult<()> {
        self.hit();
        self.inner.replace_server_accounts(server_id, accounts).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub store: Arc<CountingStore>,
    pub service: AccountService,
    pub server_id: ServerId,
}

impl Harness {
    pub fn engine(&self) -> &SyncEngine {
        self.service.engine()
    }

    pub async fn stored(&self, id: AccountId) -> DirectoryAccount {
        self.store.get(id).await.unwrap().expect("account should be stored")
    }

    /// Insert a local-only record without touching the directory.
    pub async fn insert_local(&self, account: DirectoryAccount) -> DirectoryAccount {
        self.service
            .create(account, Propagation::LocalOnly)
            .await
            .unwrap()
    }
}

pub fn corp_server() -> ServerConfig {
    ServerConfig::new("corp", BASE_DN)
        .with_bind_dn(ADMIN_DN)
        .with_password(ADMIN_PASSWORD)
}

pub async fn harness() -> Harness {
    harness_with(corp_server(), SyncSettings::default()).await
}

pub async fn harness_with(server: ServerConfig, settings: SyncSettings) -> Harness {
    let directory = FakeDirectory::new();
    let connector = Arc::new(FakeConnector::new(directory.clone()));
    let registry = Arc::new(ServerRegistry::new(connector, settings.connection.clone()));
    let server_id = registry.register(server).await.unwrap();

    let store = Arc::new(CountingStore::default());
    let engine = SyncEngine::new(registry, store.clone(), &settings);

    Harness {
        directory,
        store,
        service: AccountService::new(engine),
        server_id,
    }
}
