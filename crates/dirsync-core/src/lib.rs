//! # dirsync core
//!
//! Shared abstractions for keeping a local account store and an LDAP
//! directory in agreement.
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe identifiers (`ServerId`, `AccountId`)
//! - [`error`] - `SyncError` taxonomy with transient/permanent classification
//! - [`config`] - Server entries, sync settings and the YAML config file
//! - [`account`] - The local `DirectoryAccount` record, patches and filters
//! - [`operation`] - Directory entries, attribute changes, filters
//! - [`escape`] - RFC 4515 filter and RFC 4514 DN escaping
//! - [`mapping`] - `AttributeMapper` between records and entries
//! - [`crypto`] - `{SSHA}` credential encoding
//! - [`timestamp`] - Generalized time normalization to UTC
//! - [`traits`] - Directory connection and local store seams
//!
//! ## Example
//!
//! ```
//! use dirsync_core::prelude::*;
//!
//! let server = ServerConfig::new("corp", "ou=people,dc=example,dc=com");
//! let account = DirectoryAccount::new(server.id(), "bob").with_login(true);
//! let entry = AttributeMapper::default().to_create_entry(&account, 1000, &server.base_dn);
//! assert_eq!(entry.dn, "cn=bob,ou=people,dc=example,dc=com");
//! ```

pub mod account;
pub mod config;
pub mod crypto;
pub mod error;
pub mod escape;
pub mod ids;
pub mod mapping;
pub mod operation;
pub mod timestamp;
pub mod traits;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::account::{AccountFilter, AccountPatch, DirectoryAccount, Propagation};
    pub use crate::config::{ConnectionSettings, DirsyncConfig, ServerConfig, SyncSettings};
    pub use crate::crypto::CredentialCodec;
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::ids::{AccountId, ServerId};
    pub use crate::mapping::AttributeMapper;
    pub use crate::operation::{AttributeChange, DirectoryEntry, Filter, SearchScope};
    pub use crate::traits::{AccountStore, DirectoryConnection, DirectoryConnector, EntryStream};
}

// Re-export async_trait for collaborator implementors
pub use async_trait::async_trait;
