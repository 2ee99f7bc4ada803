//! # dirsync engine
//!
//! Keeps the local account store and an LDAP directory in agreement.
//!
//! ## Crate Organization
//!
//! - [`registry`] - Server configurations and bound-connection factory
//! - [`allocator`] - Collision-free uid number allocation
//! - [`engine`] - Create/update/delete propagation and reconciliation
//! - [`service`] - Propagation-aware entry points, connection tests, server selection
//! - [`validation`] - Advisory input warnings
//! - [`store`] - In-memory `AccountStore`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dirsync_core::prelude::*;
//! use dirsync_engine::{AccountService, MemoryAccountStore, ServerRegistry, SyncEngine};
//! use dirsync_ldap::LdapConnector;
//!
//! let config = DirsyncConfig::from_file(DirsyncConfig::config_path())?;
//! let registry = Arc::new(ServerRegistry::from_config(Arc::new(LdapConnector::new()), &config).await?);
//! let engine = SyncEngine::new(registry, Arc::new(MemoryAccountStore::new()), &config.sync);
//! let service = AccountService::new(engine);
//!
//! let server_id = config.servers[0].id();
//! let imported = service.fetch_and_import(server_id).await?;
//! let bob = DirectoryAccount::new(server_id, "bob").with_login(true).with_password("s3cret");
//! service.create(bob, Propagation::Mirror).await?;
//! ```

pub mod allocator;
pub mod engine;
pub mod registry;
pub mod service;
pub mod store;
pub mod validation;

// Re-exports
pub use allocator::IdentifierAllocator;
pub use engine::SyncEngine;
pub use registry::ServerRegistry;
pub use service::{AccountService, ConnectionTestReport, ServerSelection};
pub use store::MemoryAccountStore;
pub use validation::ValidationWarning;
