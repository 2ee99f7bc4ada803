//! LDAP connection implementation
//!
//! Implements the directory connection traits on top of `ldap3`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry, SearchStream,
};
use tracing::{debug, info, instrument, warn};

use dirsync_core::config::{ConnectionSettings, ServerConfig};
use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::operation::{AttributeChange, DirectoryEntry, Filter, SearchScope};
use dirsync_core::traits::{DirectoryConnection, DirectoryConnector, EntryStream};

/// Result code: success.
const RC_SUCCESS: u32 = 0;
/// Result code: noSuchObject.
const RC_NO_SUCH_OBJECT: u32 = 32;
/// Result code: invalidCredentials.
const RC_INVALID_CREDENTIALS: u32 = 49;
/// Result code: entryAlreadyExists.
const RC_ALREADY_EXISTS: u32 = 68;

/// Opens `ldap3` connections.
#[derive(Debug, Clone, Default)]
pub struct LdapConnector;

impl LdapConnector {
    /// Create a new LDAP connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    #[instrument(skip(self, server, settings), fields(server = %server.name))]
    async fn open(
        &self,
        server: &ServerConfig,
        settings: &ConnectionSettings,
    ) -> SyncResult<Box<dyn DirectoryConnection>> {
        let url = server.url();

        debug!(url = %url, "Connecting to LDAP server");

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(settings.connection_timeout())
            .set_starttls(server.use_starttls);

        let (conn, ldap) = LdapConnAsync::with_settings(conn_settings, &url)
            .await
            .map_err(|e| {
                SyncError::network_with_source(
                    format!("Failed to connect to LDAP server at {}", url),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Box::new(LdapConnection {
            ldap,
            url,
            operation_timeout: settings.operation_timeout(),
            closed: false,
        }))
    }
}

/// One open `ldap3` connection.
pub struct LdapConnection {
    ldap: Ldap,
    url: String,
    operation_timeout: Option<Duration>,
    closed: bool,
}

impl std::fmt::Debug for LdapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnection")
            .field("url", &self.url)
            .field("operation_timeout", &self.operation_timeout)
            .field("closed", &self.closed)
            .finish()
    }
}

impl LdapConnection {
    /// Handle for the next operation, with the operation timeout armed.
    fn handle(&mut self) -> SyncResult<&mut Ldap> {
        if self.closed {
            return Err(SyncError::network(format!(
                "connection to {} is closed",
                self.url
            )));
        }
        if let Some(timeout) = self.operation_timeout {
            self.ldap.with_timeout(timeout);
        }
        Ok(&mut self.ldap)
    }
}

/// Convert a search scope to its `ldap3` counterpart.
fn to_ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Convert replace-semantics changes to `ldap3` modifications.
///
/// A change without values becomes a replace with the empty set, which
/// removes the attribute.
fn to_ldap_mods(changes: &[AttributeChange]) -> Vec<Mod<String>> {
    changes
        .iter()
        .map(|change| {
            Mod::Replace(
                change.attribute.clone(),
                change.values.iter().cloned().collect::<HashSet<String>>(),
            )
        })
        .collect()
}

/// Convert an entry to the `ldap3` add payload.
fn to_ldap_attrs(entry: &DirectoryEntry) -> Vec<(String, HashSet<String>)> {
    entry
        .attributes
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| (name.clone(), values.iter().cloned().collect()))
        .collect()
}

/// Convert an `ldap3` search entry to a directory entry.
///
/// Binary values are kept only when they are valid UTF-8.
fn to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut result = DirectoryEntry::new(entry.dn);

    for (name, values) in entry.attrs {
        result.set(name, values);
    }

    for (name, values) in entry.bin_attrs {
        let values: Vec<String> = values
            .into_iter()
            .filter_map(|v| String::from_utf8(v).ok())
            .collect();
        if !values.is_empty() {
            result.set(name, values);
        }
    }

    result
}

/// Map a non-success result code to an error.
fn check_result_code(rc: u32, text: &str, context: &str, dn: &str) -> SyncResult<()> {
    match rc {
        RC_SUCCESS => Ok(()),
        RC_INVALID_CREDENTIALS => Err(SyncError::auth(format!(
            "{} rejected for '{}': invalid credentials",
            context, dn
        ))),
        RC_ALREADY_EXISTS => Err(SyncError::DuplicateEntry {
            name: dn.to_string(),
        }),
        RC_NO_SUCH_OBJECT => Err(SyncError::operation_failed(format!(
            "{} failed for '{}': no such object",
            context, dn
        ))),
        _ => Err(SyncError::operation_failed(format!(
            "{} failed for '{}' with code {}: {}",
            context, dn, rc, text
        ))),
    }
}

/// Map an `ldap3` error to an error.
///
/// Result-code errors are classified by code, everything else is transport.
fn map_ldap_error(err: LdapError, context: &str, dn: &str) -> SyncError {
    match err {
        LdapError::LdapResult { result } => {
            match check_result_code(result.rc, &result.text, context, dn) {
                Err(e) => e,
                Ok(()) => SyncError::operation_failed(format!(
                    "{} failed for '{}' without a result code",
                    context, dn
                )),
            }
        }
        other => SyncError::network_with_source(format!("{} failed for '{}'", context, dn), other),
    }
}

/// Pending streaming search plus its base DN for error context.
type SearchState = (SearchStream<'static, String, Vec<String>>, String);

/// Pull the next entry of a streaming search, skipping referrals and
/// intermediate messages. The final result code is checked once the
/// stream is exhausted.
async fn next_entry(state: SearchState) -> SyncResult<Option<(DirectoryEntry, SearchState)>> {
    let (mut search, base) = state;
    loop {
        let next = search
            .next()
            .await
            .map_err(|e| map_ldap_error(e, "LDAP search", &base))?;

        match next {
            Some(entry) if entry.is_ref() || entry.is_intermediate() => continue,
            Some(entry) => {
                let entry = to_directory_entry(SearchEntry::construct(entry));
                return Ok(Some((entry, (search, base))));
            }
            None => {
                let result = search.finish().await;
                check_result_code(result.rc, &result.text, "LDAP search", &base)?;
                debug!(base = %base, "Streaming LDAP search completed");
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    #[instrument(skip(self, password), fields(url = %self.url))]
    async fn bind(&mut self, dn: &str, password: &str) -> SyncResult<()> {
        debug!(bind_dn = %dn, anonymous = dn.is_empty(), "Performing LDAP bind");

        let result = self
            .handle()?
            .simple_bind(dn, password)
            .await
            .map_err(|e| map_ldap_error(e, "LDAP bind", dn))?;

        if result.rc != RC_SUCCESS {
            if result.rc == RC_INVALID_CREDENTIALS {
                return Err(SyncError::auth(format!("invalid credentials for '{}'", dn)));
            }
            return Err(SyncError::auth(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(url = %self.url, "LDAP bind succeeded");
        Ok(())
    }

    #[instrument(skip(self, filter, attributes))]
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> SyncResult<Vec<DirectoryEntry>> {
        let filter_str = filter.to_ldap_string();

        debug!(base = %base_dn, filter = %filter_str, "Executing LDAP search");

        let (entries, _result) = self
            .handle()?
            .search(base_dn, to_ldap_scope(scope), &filter_str, attributes.to_vec())
            .await
            .map_err(|e| map_ldap_error(e, "LDAP search", base_dn))?
            .success()
            .map_err(|e| map_ldap_error(e, "LDAP search", base_dn))?;

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .filter(|e| !e.is_ref() && !e.is_intermediate())
            .map(|e| to_directory_entry(SearchEntry::construct(e)))
            .collect();

        debug!(count = entries.len(), "LDAP search completed");
        Ok(entries)
    }

    #[instrument(skip(self, filter, attributes))]
    async fn search_stream<'a>(
        &'a mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &Filter,
        attributes: &[&str],
    ) -> SyncResult<EntryStream<'a>> {
        let filter_str = filter.to_ldap_string();
        let attrs: Vec<String> = attributes.iter().map(|a| a.to_string()).collect();
        let base = base_dn.to_string();

        debug!(base = %base, filter = %filter_str, "Starting streaming LDAP search");

        let search = self
            .handle()?
            .streaming_search(&base, to_ldap_scope(scope), &filter_str, attrs)
            .await
            .map_err(|e| map_ldap_error(e, "LDAP search", &base))?;

        let entries = stream::try_unfold((search, base), next_entry);
        Ok(Box::pin(entries))
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn))]
    async fn add(&mut self, entry: &DirectoryEntry) -> SyncResult<()> {
        debug!("Creating LDAP entry");

        let result = self
            .handle()?
            .add(&entry.dn, to_ldap_attrs(entry))
            .await
            .map_err(|e| map_ldap_error(e, "LDAP add", &entry.dn))?;
        check_result_code(result.rc, &result.text, "LDAP add", &entry.dn)?;

        info!(dn = %entry.dn, "LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self, changes))]
    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> SyncResult<()> {
        debug!(changes = changes.len(), "Updating LDAP entry");

        let result = self
            .handle()?
            .modify(dn, to_ldap_mods(changes))
            .await
            .map_err(|e| map_ldap_error(e, "LDAP modify", dn))?;
        check_result_code(result.rc, &result.text, "LDAP modify", dn)?;

        info!(dn = %dn, "LDAP entry updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&mut self, dn: &str) -> SyncResult<()> {
        debug!("Deleting LDAP entry");

        let result = self
            .handle()?
            .delete(dn)
            .await
            .map_err(|e| map_ldap_error(e, "LDAP delete", dn))?;
        check_result_code(result.rc, &result.text, "LDAP delete", dn)?;

        info!(dn = %dn, "LDAP entry deleted");
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.ldap.unbind().await {
            warn!(url = %self.url, error = %e, "Error during LDAP unbind");
        } else {
            debug!(url = %self.url, "LDAP connection closed");
        }
    }
}
