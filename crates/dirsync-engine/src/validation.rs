//! Advisory input checks.
//!
//! Warnings never block a mutation; the caller decides whether to proceed.

use serde::Serialize;

use dirsync_core::account::{AccountFilter, DirectoryAccount};
use dirsync_core::error::SyncResult;
use dirsync_core::escape::has_dn_special_chars;
use dirsync_core::ids::{AccountId, ServerId};
use dirsync_core::traits::AccountStore;

/// A non-blocking problem with account input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// The username contains characters special to distinguished names.
    InvalidUsername { name: String },
    /// Another account of the same server already uses the username.
    DuplicateUsername { name: String },
    /// Password and confirmation differ.
    PasswordMismatch,
}

impl ValidationWarning {
    /// Short title for display.
    pub fn title(&self) -> &'static str {
        match self {
            ValidationWarning::InvalidUsername { .. } => "Invalid user name",
            ValidationWarning::DuplicateUsername { .. } => "User already exists",
            ValidationWarning::PasswordMismatch => "Passwords not equal",
        }
    }

    /// Explanation for display.
    pub fn message(&self) -> &'static str {
        match self {
            ValidationWarning::InvalidUsername { .. } => {
                "User name string contains characters special to LDAP."
            }
            ValidationWarning::DuplicateUsername { .. } => {
                "A user with that username already exists on the server."
            }
            ValidationWarning::PasswordMismatch => "The passwords supplied don't match.",
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

/// Strip every whitespace character from a username.
pub fn normalize_username(raw: &str) -> String {
    raw.split_whitespace().collect()
}

/// Warn when a username would change under DN escaping.
pub fn check_username(name: &str) -> Option<ValidationWarning> {
    has_dn_special_chars(name).then(|| ValidationWarning::InvalidUsername {
        name: name.to_string(),
    })
}

/// Warn when password and confirmation differ. Absent and empty are equal.
pub fn check_passwords(
    password: Option<&str>,
    confirmation: Option<&str>,
) -> Option<ValidationWarning> {
    (password.unwrap_or_default() != confirmation.unwrap_or_default())
        .then_some(ValidationWarning::PasswordMismatch)
}

/// The display name to use: the given one, or the username when empty.
pub fn default_display_name(name: &str, display_name: &str) -> String {
    if display_name.is_empty() {
        name.to_string()
    } else {
        display_name.to_string()
    }
}

/// Warn when another account of the server already uses the username.
///
/// `exclude` skips the account being edited.
pub async fn check_duplicate(
    store: &dyn AccountStore,
    server_id: ServerId,
    name: &str,
    exclude: Option<AccountId>,
) -> SyncResult<Option<ValidationWarning>> {
    let existing = store
        .find(&AccountFilter::server(server_id).named(name))
        .await?;

    let duplicate = existing.iter().any(|a| Some(a.id) != exclude);
    Ok(duplicate.then(|| ValidationWarning::DuplicateUsername {
        name: name.to_string(),
    }))
}

/// Run every check against an account about to be written.
pub async fn validate_account(
    store: &dyn AccountStore,
    account: &DirectoryAccount,
) -> SyncResult<Vec<ValidationWarning>> {
    let mut warnings = Vec::new();

    warnings.extend(check_username(&account.name));
    warnings.extend(check_duplicate(store, account.server_id, &account.name, Some(account.id)).await?);
    warnings.extend(check_passwords(
        account.password.as_deref(),
        account.password_confirmation.as_deref(),
    ));

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAccountStore;

    #[test]
    fn test_normalize_username_strips_all_whitespace() {
        assert_eq!(normalize_username("  bob  "), "bob");
        assert_eq!(normalize_username("bob smith"), "bobsmith");
        assert_eq!(normalize_username("b\to\nb"), "bob");
    }

    #[test]
    fn test_check_username() {
        assert_eq!(check_username("bob"), None);
        assert_eq!(
            check_username("bob,admin"),
            Some(ValidationWarning::InvalidUsername {
                name: "bob,admin".to_string()
            })
        );
        assert!(check_username("#bob").is_some());
    }

    #[test]
    fn test_check_passwords() {
        assert_eq!(check_passwords(Some("a"), Some("a")), None);
        assert_eq!(check_passwords(None, Some("")), None);
        assert_eq!(
            check_passwords(Some("a"), Some("b")),
            Some(ValidationWarning::PasswordMismatch)
        );
        assert_eq!(
            check_passwords(Some("a"), None),
            Some(ValidationWarning::PasswordMismatch)
        );
    }

    #[test]
    fn test_default_display_name() {
        assert_eq!(default_display_name("bob", ""), "bob");
        assert_eq!(default_display_name("bob", "Bob Builder"), "Bob Builder");
    }

    #[test]
    fn test_warning_display() {
        let warning = ValidationWarning::PasswordMismatch;
        assert_eq!(
            warning.to_string(),
            "Passwords not equal: The passwords supplied don't match."
        );
    }

    #[tokio::test]
    async fn test_duplicate_excludes_edited_account() {
        let store = MemoryAccountStore::new();
        let server_id = ServerId::from_name("corp");
        let bob = DirectoryAccount::new(server_id, "bob");
        let bob_id = store.insert(bob.clone()).await.unwrap();

        let warning = check_duplicate(&store, server_id, "bob", None).await.unwrap();
        assert!(matches!(warning, Some(ValidationWarning::DuplicateUsername { .. })));

        let warning = check_duplicate(&store, server_id, "bob", Some(bob_id))
            .await
            .unwrap();
        assert_eq!(warning, None);

        let other_server = ServerId::from_name("lab");
        let warning = check_duplicate(&store, other_server, "bob", None)
            .await
            .unwrap();
        assert_eq!(warning, None);
    }

    #[tokio::test]
    async fn test_validate_account_collects_warnings() {
        let store = MemoryAccountStore::new();
        let server_id = ServerId::from_name("corp");
        store
            .insert(DirectoryAccount::new(server_id, "a+b"))
            .await
            .unwrap();

        let mut candidate = DirectoryAccount::new(server_id, "a+b").with_password("one");
        candidate.password_confirmation = Some("two".to_string());

        let warnings = validate_account(&store, &candidate).await.unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(matches!(warnings[0], ValidationWarning::InvalidUsername { .. }));
        assert!(matches!(warnings[1], ValidationWarning::DuplicateUsername { .. }));
        assert_eq!(warnings[2], ValidationWarning::PasswordMismatch);
    }
}
