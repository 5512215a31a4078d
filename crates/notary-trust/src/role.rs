//! TUF role identifiers.
//!
//! Valid roles are `root`, `snapshot`, `timestamp`, `targets` and delegated
//! targets roles of the form `targets/<name>`, where `<name>` contains neither
//! `/` nor whitespace.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TrustError, TrustResult};

lazy_static! {
    static ref ROLE_PATTERN: Regex =
        Regex::new(r"^(root|(targets(/[^/\s]+)?)|snapshot|timestamp)$").expect("valid role regex");
}

const DELEGATION_PREFIX: &str = "targets/";

/// A trust role within the delegation hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Root,
    Snapshot,
    Timestamp,
    Targets,
    /// Delegated targets role; holds the name after `targets/`.
    Delegated(String),
}

impl Role {
    /// Parse a role string.
    ///
    /// ```
    /// use notary_trust::Role;
    ///
    /// assert_eq!(Role::parse("root").unwrap(), Role::Root);
    /// let releases = Role::parse("targets/releases").unwrap();
    /// assert_eq!(releases.to_string(), "targets/releases");
    /// assert!(Role::parse("targets/a/b").is_err());
    /// ```
    pub fn parse(value: &str) -> TrustResult<Self> {
        if !ROLE_PATTERN.is_match(value) {
            return Err(TrustError::InvalidFormat {
                value: value.to_string(),
            });
        }

        Ok(match value {
            "root" => Self::Root,
            "snapshot" => Self::Snapshot,
            "timestamp" => Self::Timestamp,
            "targets" => Self::Targets,
            delegated => Self::Delegated(delegated[DELEGATION_PREFIX.len()..].to_string()),
        })
    }

    /// Build a delegated role from its bare name (`releases` → `targets/releases`).
    pub fn delegated(name: &str) -> TrustResult<Self> {
        Self::parse(&format!("{}{}", DELEGATION_PREFIX, name))
    }

    /// Whether this is a `targets` role (top-level or delegated).
    pub fn is_targets(&self) -> bool {
        matches!(self, Self::Targets | Self::Delegated(_))
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self, Self::Delegated(_))
    }

    /// Metadata file name in the TUF repository layout.
    pub fn metadata_file(&self) -> String {
        format!("{}.json", self)
    }

    /// Value of the `_type` field expected in documents signed by this role.
    pub fn document_type(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Snapshot => "Snapshot",
            Self::Timestamp => "Timestamp",
            Self::Targets | Self::Delegated(_) => "Targets",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Targets => write!(f, "targets"),
            Self::Delegated(name) => write!(f, "{}{}", DELEGATION_PREFIX, name),
        }
    }
}

impl FromStr for Role {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}
