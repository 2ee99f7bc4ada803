//! # dirsync LDAP transport
//!
//! `ldap3`-backed implementation of the directory connection traits.
//!
//! ## Features
//!
//! - LDAP v3 simple bind, anonymous or authenticated
//! - SSL/TLS and STARTTLS
//! - Collected and streaming subtree searches
//! - Replace-semantics modify, add and delete
//! - Result codes mapped onto the `SyncError` taxonomy
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_core::prelude::*;
//! use dirsync_ldap::LdapConnector;
//!
//! let server = ServerConfig::new("corp", "ou=people,dc=example,dc=com")
//!     .with_address("ldap.example.com", 389)
//!     .with_bind_dn("cn=admin,dc=example,dc=com")
//!     .with_password("secret");
//!
//! let mut conn = LdapConnector::new()
//!     .open(&server, &ConnectionSettings::default())
//!     .await?;
//! conn.bind(server.bind_dn(), "secret").await?;
//! conn.close().await;
//! ```

pub mod connector;

// Re-exports
pub use connector::{LdapConnection, LdapConnector};
