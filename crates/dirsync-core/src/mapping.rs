//! Attribute mapping between local account records and directory entries.
//!
//! ```text
//! local field     directory attribute
//! -----------     -------------------
//! name            uid, sn, cn, gecos (create only), homeDirectory (create only)
//! display_name    displayName
//! email           mail
//! notes           description
//! login_enabled   loginShell (/bin/bash | /bin/false)
//! numeric_id      uidNumber (create only)
//! password        userPassword ({SSHA})
//! ```

use chrono::{DateTime, Utc};

use crate::account::DirectoryAccount;
use crate::config::SyncSettings;
use crate::crypto::CredentialCodec;
use crate::error::{SyncError, SyncResult};
use crate::escape::escape_dn_value;
use crate::ids::{AccountId, ServerId};
use crate::operation::{AttributeChange, DirectoryEntry, Filter};

/// Structural object class every synchronized account carries.
pub const ACCOUNT_OBJECT_CLASS: &str = "posixAccount";

/// Object classes written on create.
pub const CREATE_OBJECT_CLASSES: [&str; 2] = ["posixAccount", "inetOrgPerson"];

/// Shell of accounts allowed to log in.
pub const LOGIN_SHELL: &str = "/bin/bash";

/// Shell of accounts denied login.
pub const NO_LOGIN_SHELL: &str = "/bin/false";

/// Attributes requested when importing accounts.
pub const IMPORT_ATTRIBUTES: [&str; 6] = [
    "uid",
    "mail",
    "loginShell",
    "uidNumber",
    "description",
    "displayName",
];

/// Operational attribute compared for conflict detection.
pub const MODIFY_TIMESTAMP: &str = "modifyTimestamp";

/// Translates between `DirectoryAccount` and directory attributes.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    gid_number: String,
    home_directory_prefix: String,
}

impl Default for AttributeMapper {
    fn default() -> Self {
        Self::new(&SyncSettings::default())
    }
}

impl AttributeMapper {
    /// Create a mapper using the account defaults of the given settings.
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            gid_number: settings.gid_number.clone(),
            home_directory_prefix: settings.home_directory_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Distinguished name of an account: `cn=<escaped name>,<base dn>`.
    pub fn account_dn(name: &str, base_dn: &str) -> String {
        format!("cn={},{}", escape_dn_value(name), base_dn)
    }

    /// Filter matching an existing account with this username as `uid` or `cn`.
    pub fn username_filter(name: &str) -> Filter {
        Filter::and(vec![
            Filter::eq("objectClass", ACCOUNT_OBJECT_CLASS),
            Filter::or(vec![Filter::eq("uid", name), Filter::eq("cn", name)]),
        ])
    }

    /// Filter matching the account holding a uid number.
    pub fn uid_number_filter(uid_number: u32) -> Filter {
        Filter::and(vec![
            Filter::eq("objectClass", ACCOUNT_OBJECT_CLASS),
            Filter::eq("uidNumber", uid_number.to_string()),
        ])
    }

    /// Filter matching every synchronized account.
    pub fn all_accounts_filter() -> Filter {
        Filter::eq("objectClass", ACCOUNT_OBJECT_CLASS)
    }

    fn login_shell(enabled: bool) -> &'static str {
        if enabled {
            LOGIN_SHELL
        } else {
            NO_LOGIN_SHELL
        }
    }

    /// Build the entry added on create. Empty optional fields are omitted.
    pub fn to_create_entry(
        &self,
        account: &DirectoryAccount,
        uid_number: u32,
        base_dn: &str,
    ) -> DirectoryEntry {
        let name = account.name.as_str();
        let mut entry = DirectoryEntry::new(Self::account_dn(name, base_dn))
            .with_values("objectClass", CREATE_OBJECT_CLASSES)
            .with("uid", name)
            .with("sn", name)
            .with("cn", name)
            .with("gecos", name)
            .with(
                "homeDirectory",
                format!("{}/{}", self.home_directory_prefix, name),
            )
            .with("loginShell", Self::login_shell(account.login_enabled))
            .with("uidNumber", uid_number.to_string())
            .with("gidNumber", self.gid_number.clone());

        for (attribute, value) in [
            ("displayName", &account.display_name),
            ("mail", &account.email),
            ("description", &account.notes),
        ] {
            if !value.is_empty() {
                entry.set(attribute, vec![value.clone()]);
            }
        }

        if let Some(password) = account.pending_password() {
            entry.set("userPassword", vec![CredentialCodec::encode(password)]);
        }

        entry
    }

    /// Build the replace set sent on update.
    ///
    /// `uid`, `sn`, `cn` and `uidNumber` are immutable after creation and never sent.
    pub fn to_update_changes(&self, account: &DirectoryAccount) -> Vec<AttributeChange> {
        let mut changes = vec![AttributeChange::replace(
            "loginShell",
            Self::login_shell(account.login_enabled),
        )];

        for (attribute, value) in [
            ("mail", &account.email),
            ("description", &account.notes),
            ("displayName", &account.display_name),
        ] {
            changes.push(if value.is_empty() {
                AttributeChange::clear(attribute)
            } else {
                AttributeChange::replace(attribute, value.clone())
            });
        }

        if let Some(password) = account.pending_password() {
            changes.push(AttributeChange::replace(
                "userPassword",
                CredentialCodec::encode(password),
            ));
        }

        changes
    }

    /// Map an imported entry to a local record.
    ///
    /// Missing optional attributes become empty strings; a missing `uid` or a
    /// missing or non-numeric `uidNumber` is a malformed entry.
    pub fn from_entry(
        &self,
        entry: &DirectoryEntry,
        server_id: ServerId,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<DirectoryAccount> {
        let name = entry
            .first("uid")
            .ok_or_else(|| SyncError::malformed(&entry.dn, "missing required attribute 'uid'"))?;

        let raw_uid_number = entry.first("uidNumber").ok_or_else(|| {
            SyncError::malformed(&entry.dn, "missing required attribute 'uidNumber'")
        })?;
        let numeric_id = raw_uid_number.trim().parse::<u32>().map_err(|_| {
            SyncError::malformed(
                &entry.dn,
                format!("uidNumber '{raw_uid_number}' is not a valid number"),
            )
        })?;

        let optional = |attribute: &str| entry.first(attribute).unwrap_or_default().to_string();

        Ok(DirectoryAccount {
            id: AccountId::new(),
            name: name.to_string(),
            display_name: optional("displayName"),
            email: optional("mail"),
            login_enabled: entry.first("loginShell") != Some(NO_LOGIN_SHELL),
            server_id,
            numeric_id: Some(numeric_id),
            last_sync: Some(synced_at),
            notes: optional("description"),
            is_local_only: false,
            password: None,
            password_confirmation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_DN: &str = "ou=people,dc=example,dc=com";

    fn sample_account() -> DirectoryAccount {
        DirectoryAccount::new(ServerId::from_name("corp"), "bob")
            .with_display_name("Bob Builder")
            .with_email("bob@example.com")
            .with_notes("on call")
            .with_login(true)
            .with_password("s3cret")
    }

    #[test]
    fn test_account_dn_escapes_name() {
        assert_eq!(
            AttributeMapper::account_dn("bob", BASE_DN),
            "cn=bob,ou=people,dc=example,dc=com"
        );
        assert_eq!(
            AttributeMapper::account_dn("doe,john", BASE_DN),
            "cn=doe\\,john,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_username_filter_escapes_value() {
        assert_eq!(
            AttributeMapper::username_filter("b*b").to_ldap_string(),
            "(&(objectClass=posixAccount)(|(uid=b\\2ab)(cn=b\\2ab)))"
        );
    }

    #[test]
    fn test_uid_number_filter() {
        assert_eq!(
            AttributeMapper::uid_number_filter(1000).to_ldap_string(),
            "(&(objectClass=posixAccount)(uidNumber=1000))"
        );
    }

    #[test]
    fn test_create_entry_attributes() {
        let mapper = AttributeMapper::default();
        let entry = mapper.to_create_entry(&sample_account(), 42, BASE_DN);

        assert_eq!(entry.dn, "cn=bob,ou=people,dc=example,dc=com");
        assert_eq!(
            entry.get("objectClass").unwrap(),
            &["posixAccount".to_string(), "inetOrgPerson".to_string()]
        );
        for attribute in ["uid", "sn", "cn", "gecos"] {
            assert_eq!(entry.first(attribute), Some("bob"));
        }
        assert_eq!(entry.first("homeDirectory"), Some("/home/bob"));
        assert_eq!(entry.first("loginShell"), Some("/bin/bash"));
        assert_eq!(entry.first("uidNumber"), Some("42"));
        assert_eq!(entry.first("gidNumber"), Some("100"));
        assert_eq!(entry.first("displayName"), Some("Bob Builder"));
        assert_eq!(entry.first("mail"), Some("bob@example.com"));
        assert_eq!(entry.first("description"), Some("on call"));
        assert!(entry.first("userPassword").unwrap().starts_with("{SSHA}"));
    }

    #[test]
    fn test_create_entry_omits_empty_optionals() {
        let mapper = AttributeMapper::default();
        let account = DirectoryAccount::new(ServerId::new(), "carol");
        let entry = mapper.to_create_entry(&account, 1, BASE_DN);

        assert!(!entry.has("displayName"));
        assert!(!entry.has("mail"));
        assert!(!entry.has("description"));
        assert!(!entry.has("userPassword"));
        assert_eq!(entry.first("loginShell"), Some("/bin/false"));
    }

    #[test]
    fn test_create_entry_uses_configured_defaults() {
        let settings = SyncSettings {
            gid_number: "500".to_string(),
            home_directory_prefix: "/srv/home/".to_string(),
            ..SyncSettings::default()
        };
        let mapper = AttributeMapper::new(&settings);
        let entry = mapper.to_create_entry(&sample_account(), 1, BASE_DN);

        assert_eq!(entry.first("gidNumber"), Some("500"));
        assert_eq!(entry.first("homeDirectory"), Some("/srv/home/bob"));
    }

    #[test]
    fn test_update_changes_only_mutable_fields() {
        let mapper = AttributeMapper::default();
        let mut account = sample_account();
        account.email.clear();
        account.password = None;

        let changes = mapper.to_update_changes(&account);
        let names: Vec<&str> = changes.iter().map(|c| c.attribute.as_str()).collect();

        assert_eq!(names, ["loginShell", "mail", "description", "displayName"]);
        assert!(changes[1].is_clear());
        assert_eq!(changes[3].values, ["Bob Builder"]);
    }

    #[test]
    fn test_update_changes_include_new_password() {
        let mapper = AttributeMapper::default();
        let changes = mapper.to_update_changes(&sample_account());
        let password = changes
            .iter()
            .find(|c| c.attribute == "userPassword")
            .unwrap();
        assert!(password.values[0].starts_with("{SSHA}"));
    }

    #[test]
    fn test_from_entry_maps_attributes() {
        let mapper = AttributeMapper::default();
        let server = ServerId::new();
        let now = Utc::now();
        let entry = DirectoryEntry::new("cn=alice,ou=people,dc=example,dc=com")
            .with("uid", "alice")
            .with("uidNumber", "1000")
            .with("displayName", "Alice")
            .with("mail", "alice@example.com")
            .with("description", "admin")
            .with("loginShell", "/bin/false");

        let account = mapper.from_entry(&entry, server, now).unwrap();
        assert_eq!(account.name, "alice");
        assert_eq!(account.numeric_id, Some(1000));
        assert_eq!(account.display_name, "Alice");
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.notes, "admin");
        assert!(!account.login_enabled);
        assert!(!account.is_local_only);
        assert_eq!(account.last_sync, Some(now));
        assert_eq!(account.server_id, server);
    }

    #[test]
    fn test_from_entry_defaults_missing_optionals() {
        let mapper = AttributeMapper::default();
        let entry = DirectoryEntry::new("cn=x,dc=example,dc=com")
            .with("uid", "x")
            .with("uidNumber", "5");

        let account = mapper.from_entry(&entry, ServerId::new(), Utc::now()).unwrap();
        assert_eq!(account.display_name, "");
        assert_eq!(account.email, "");
        assert_eq!(account.notes, "");
        assert!(account.login_enabled);
    }

    #[test]
    fn test_from_entry_rejects_missing_uid_or_number() {
        let mapper = AttributeMapper::default();
        let no_uid = DirectoryEntry::new("cn=x,dc=example,dc=com").with("uidNumber", "5");
        let no_number = DirectoryEntry::new("cn=x,dc=example,dc=com").with("uid", "x");
        let bad_number = DirectoryEntry::new("cn=x,dc=example,dc=com")
            .with("uid", "x")
            .with("uidNumber", "five");

        for entry in [no_uid, no_number, bad_number] {
            let err = mapper
                .from_entry(&entry, ServerId::new(), Utc::now())
                .unwrap_err();
            assert_eq!(err.error_code(), "MALFORMED_ENTRY");
        }
    }

    #[test]
    fn test_round_trip_preserves_account_fields() {
        let mapper = AttributeMapper::default();
        let account = sample_account();
        let entry = mapper.to_create_entry(&account, 77, BASE_DN);
        let back = mapper
            .from_entry(&entry, account.server_id, Utc::now())
            .unwrap();

        assert_eq!(back.name, account.name);
        assert_eq!(back.display_name, account.display_name);
        assert_eq!(back.email, account.email);
        assert_eq!(back.notes, account.notes);
        assert_eq!(back.login_enabled, account.login_enabled);
        assert_eq!(back.numeric_id, Some(77));
    }
}
