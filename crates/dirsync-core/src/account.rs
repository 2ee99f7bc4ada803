//! Local directory account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, ServerId};

/// A POSIX-style user account as held in the local store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAccount {
    /// Local record id.
    pub id: AccountId,
    /// Unique username (`uid` / `cn` on the directory).
    pub name: String,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Whether the account gets a login shell.
    pub login_enabled: bool,
    /// Server this account belongs to.
    pub server_id: ServerId,
    /// Directory-assigned `uidNumber`. Read-only after creation.
    #[serde(default)]
    pub numeric_id: Option<u32>,
    /// When the record was last confirmed to agree with the server.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Free-form notes (`description`).
    #[serde(default)]
    pub notes: String,
    /// True until the record is first created on the directory.
    pub is_local_only: bool,
    /// Plaintext password pending propagation.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Password confirmation as typed by the user. Never sent to the server.
    #[serde(default, skip_serializing)]
    pub password_confirmation: Option<String>,
}

impl std::fmt::Debug for DirectoryAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryAccount")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("login_enabled", &self.login_enabled)
            .field("server_id", &self.server_id)
            .field("numeric_id", &self.numeric_id)
            .field("last_sync", &self.last_sync)
            .field("notes", &self.notes)
            .field("is_local_only", &self.is_local_only)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field(
                "password_confirmation",
                &self.password_confirmation.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

impl DirectoryAccount {
    /// Create a new local-only account.
    pub fn new(server_id: ServerId, name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            display_name: String::new(),
            email: String::new(),
            login_enabled: false,
            server_id,
            numeric_id: None,
            last_sync: None,
            notes: String::new(),
            is_local_only: true,
            password: None,
            password_confirmation: None,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Set the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Enable or disable the login shell.
    #[must_use]
    pub fn with_login(mut self, enabled: bool) -> Self {
        self.login_enabled = enabled;
        self
    }

    /// Set the plaintext password (and matching confirmation).
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password_confirmation = Some(password.clone());
        self.password = Some(password);
        self
    }

    /// The password pending propagation, if a non-empty one was supplied.
    pub fn pending_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &AccountPatch) {
        if let Some(ref v) = patch.name {
            self.name.clone_from(v);
        }
        if let Some(ref v) = patch.display_name {
            self.display_name.clone_from(v);
        }
        if let Some(ref v) = patch.email {
            self.email.clone_from(v);
        }
        if let Some(v) = patch.login_enabled {
            self.login_enabled = v;
        }
        if let Some(v) = patch.numeric_id {
            self.numeric_id = v;
        }
        if let Some(v) = patch.last_sync {
            self.last_sync = v;
        }
        if let Some(ref v) = patch.notes {
            self.notes.clone_from(v);
        }
        if let Some(v) = patch.is_local_only {
            self.is_local_only = v;
        }
        if let Some(ref v) = patch.password {
            self.password.clone_from(v);
        }
        if let Some(ref v) = patch.password_confirmation {
            self.password_confirmation.clone_from(v);
        }
    }
}

/// Partial update of an account. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub login_enabled: Option<bool>,
    pub numeric_id: Option<Option<u32>>,
    pub last_sync: Option<Option<DateTime<Utc>>>,
    pub notes: Option<String>,
    pub is_local_only: Option<bool>,
    pub password: Option<Option<String>>,
    pub password_confirmation: Option<Option<String>>,
}

impl AccountPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(mut self, v: impl Into<String>) -> Self {
        self.display_name = Some(v.into());
        self
    }

    pub fn email(mut self, v: impl Into<String>) -> Self {
        self.email = Some(v.into());
        self
    }

    pub fn notes(mut self, v: impl Into<String>) -> Self {
        self.notes = Some(v.into());
        self
    }

    #[must_use]
    pub fn login_enabled(mut self, v: bool) -> Self {
        self.login_enabled = Some(v);
        self
    }

    /// Supply a new plaintext password (and matching confirmation).
    pub fn password(mut self, v: impl Into<String>) -> Self {
        let v = v.into();
        self.password_confirmation = Some(Some(v.clone()));
        self.password = Some(Some(v));
        self
    }

    /// Sync metadata written after the record was created remotely.
    pub fn created_remotely(at: DateTime<Utc>) -> Self {
        Self {
            last_sync: Some(Some(at)),
            is_local_only: Some(false),
            password: Some(None),
            password_confirmation: Some(None),
            ..Self::default()
        }
    }

    /// Sync metadata written after a remote update.
    pub fn synced_at(at: DateTime<Utc>) -> Self {
        Self {
            last_sync: Some(Some(at)),
            password: Some(None),
            password_confirmation: Some(None),
            ..Self::default()
        }
    }

    /// Persist an allocated uid number.
    pub fn allocated(numeric_id: u32) -> Self {
        Self {
            numeric_id: Some(Some(numeric_id)),
            ..Self::default()
        }
    }
}

/// A patch that overwrites every field with the values of `account`.
impl From<&DirectoryAccount> for AccountPatch {
    fn from(account: &DirectoryAccount) -> Self {
        Self {
            name: Some(account.name.clone()),
            display_name: Some(account.display_name.clone()),
            email: Some(account.email.clone()),
            login_enabled: Some(account.login_enabled),
            numeric_id: Some(account.numeric_id),
            last_sync: Some(account.last_sync),
            notes: Some(account.notes.clone()),
            is_local_only: Some(account.is_local_only),
            password: Some(account.password.clone()),
            password_confirmation: Some(account.password_confirmation.clone()),
        }
    }
}

/// Criteria for `AccountStore::find`. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFilter {
    pub server_id: Option<ServerId>,
    pub name: Option<String>,
    pub numeric_id: Option<u32>,
}

impl AccountFilter {
    /// Match every account of one server.
    pub fn server(server_id: ServerId) -> Self {
        Self {
            server_id: Some(server_id),
            ..Self::default()
        }
    }

    /// Narrow to one username.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether an account satisfies the filter.
    pub fn matches(&self, account: &DirectoryAccount) -> bool {
        self.server_id.map_or(true, |id| account.server_id == id)
            && self.name.as_ref().map_or(true, |n| &account.name == n)
            && self
                .numeric_id
                .map_or(true, |n| account.numeric_id == Some(n))
    }
}

/// Whether a local mutation is mirrored to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Apply to the directory exactly once, then locally.
    Mirror,
    /// Local write only.
    LocalOnly,
}

impl Propagation {
    /// Whether the directory is touched.
    pub fn is_mirror(self) -> bool {
        matches!(self, Propagation::Mirror)
    }
}
