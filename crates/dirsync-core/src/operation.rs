//! Directory operation types
//!
//! Types exchanged with a directory connection: entries, attribute changes,
//! search scopes and filters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::escape::escape_filter_value;

/// A directory entry: a distinguished name plus multi-valued attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute name to values.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute's values, replacing any previous ones.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.attributes.insert(name.into(), values);
    }

    /// Set a single-valued attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, vec![value.into()]);
        self
    }

    /// Set a multi-valued attribute using builder pattern.
    pub fn with_values<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Get all values of an attribute. Attribute names are case-insensitive (RFC 4512).
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// Get the first value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Check if an attribute is present with at least one value.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|values| !values.is_empty())
    }
}

/// Replace all values of one attribute. An empty value list removes the attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute to replace.
    pub attribute: String,
    /// New values.
    pub values: Vec<String>,
}

impl AttributeChange {
    /// Replace with a single value.
    pub fn replace(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Remove every value of the attribute.
    pub fn clear(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            values: Vec::new(),
        }
    }

    /// Whether this change removes the attribute.
    pub fn is_clear(&self) -> bool {
        self.values.is_empty()
    }
}

/// Depth of an account search below the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Immediate children of the base object.
    OneLevel,
    /// The base object and all of its descendants.
    #[default]
    Subtree,
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Render as an RFC 4515 filter string. Every value is escaped.
    pub fn to_ldap_string(&self) -> String {
        match self {
            Filter::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_filter_value(value))
            }
            Filter::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap_string).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Or { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap_string).collect();
                format!("(|{})", inner.join(""))
            }
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_ldap_string())
    }
}
