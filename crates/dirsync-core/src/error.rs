//! Sync error types
//!
//! Error definitions with transient/permanent classification.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::{AccountId, ServerId};

/// Error that can occur while synchronizing accounts with a directory server.
#[derive(Debug, Error)]
pub enum SyncError {
    // Connection errors (usually transient)
    /// Connection refused, unreachable host or a transport failure mid-call.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Authentication errors (permanent)
    /// The directory rejected the bind credentials.
    #[error("authentication failed: {message}")]
    AuthError { message: String },

    // Synchronization conflicts (permanent)
    /// The username already exists remotely or locally.
    #[error("account '{name}' already exists")]
    DuplicateEntry { name: String },

    /// No free numeric identifier could be confirmed on the directory.
    #[error("uid number {uid_number} is already taken on the server (after {attempts} attempt(s))")]
    IdentifierConflict { uid_number: u32, attempts: u32 },

    /// The update or delete target does not exist on the server.
    #[error("no entry with uid number {uid_number} exists on the server")]
    EntryMissingRemotely { uid_number: u32 },

    /// The remote entry changed since the last confirmed sync.
    #[error("entry {dn} was modified on the server at {remote_modified} (last sync: {last_sync:?})")]
    ConcurrentModification {
        dn: String,
        remote_modified: DateTime<Utc>,
        last_sync: Option<DateTime<Utc>>,
    },

    /// A directory entry lacks a required attribute or carries an unparseable value.
    #[error("malformed entry {dn}: {message}")]
    MalformedEntry { dn: String, message: String },

    // Configuration errors (permanent)
    /// Server configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Server id is not registered.
    #[error("server not found: {server_id}")]
    ServerNotFound { server_id: ServerId },

    /// Local account record not found.
    #[error("account not found: {account_id}")]
    AccountNotFound { account_id: AccountId },

    // Operation errors
    /// The directory answered a call with a non-success result code.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The local store failed.
    #[error("store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SyncError {
    /// Check if this error is transient and a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::NetworkError { .. })
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::NetworkError { .. } => "NETWORK_ERROR",
            SyncError::AuthError { .. } => "AUTH_FAILED",
            SyncError::DuplicateEntry { .. } => "DUPLICATE_ENTRY",
            SyncError::IdentifierConflict { .. } => "IDENTIFIER_CONFLICT",
            SyncError::EntryMissingRemotely { .. } => "ENTRY_MISSING_REMOTELY",
            SyncError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            SyncError::MalformedEntry { .. } => "MALFORMED_ENTRY",
            SyncError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            SyncError::ServerNotFound { .. } => "SERVER_NOT_FOUND",
            SyncError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            SyncError::OperationFailed { .. } => "OPERATION_FAILED",
            SyncError::Store { .. } => "STORE_ERROR",
        }
    }

    // Convenience constructors

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        SyncError::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        SyncError::AuthError {
            message: message.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        SyncError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed entry error.
    pub fn malformed(dn: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::MalformedEntry {
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        SyncError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        SyncError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let err = SyncError::network("connection refused");
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            SyncError::auth("invalid credentials"),
            SyncError::DuplicateEntry {
                name: "bob".to_string(),
            },
            SyncError::IdentifierConflict {
                uid_number: 1000,
                attempts: 1,
            },
            SyncError::EntryMissingRemotely { uid_number: 7 },
            SyncError::malformed("cn=x,dc=example,dc=com", "missing uid"),
            SyncError::invalid_config("host is empty"),
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(SyncError::auth("x").error_code(), "AUTH_FAILED");
        assert_eq!(SyncError::network("x").error_code(), "NETWORK_ERROR");
        assert_eq!(
            SyncError::EntryMissingRemotely { uid_number: 1 }.error_code(),
            "ENTRY_MISSING_REMOTELY"
        );
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::DuplicateEntry {
            name: "alice".to_string(),
        };
        assert_eq!(err.to_string(), "account 'alice' already exists");

        let err = SyncError::EntryMissingRemotely { uid_number: 42 };
        assert_eq!(
            err.to_string(),
            "no entry with uid number 42 exists on the server"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = SyncError::network_with_source("failed to connect", source_err);

        assert!(err.is_transient());
        if let SyncError::NetworkError { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected NetworkError variant");
        }
    }
}
