use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use globset::Glob;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use super::Payload;
use crate::digest::{decode_declared_hash, SHA256_PREFIX};
use crate::error::{TrustError, TrustResult};
use crate::keys::TufKey;
use crate::keystore::RoleKeys;
use crate::role::Role;

/// Payload of `targets.json` and of every delegated targets document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Targets {
    #[serde(rename = "_type")]
    pub document_type: String,

    pub version: u64,

    pub expires: DateTime<Utc>,

    /// Tag -> entry
    #[serde(default)]
    pub targets: BTreeMap<String, TargetEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

/// A `targets` map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetEntry {
    /// The tag is signed by a delegated role.
    Delegation { delegation: Role },

    /// The tag is signed here.
    Artifact(TargetFile),
}

/// Signed description of an image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    /// Algorithm -> base64 hash
    pub hashes: BTreeMap<String, String>,

    pub length: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<JsonValue>,
}

impl TargetFile {
    /// `sha256:<hex>` digest of the manifest, if a well-formed SHA-256 hash is
    /// declared.
    pub fn digest(&self) -> Option<String> {
        let raw = decode_declared_hash(self.hashes.get("sha256")?, 32)?;
        Some(format!("{}{}", SHA256_PREFIX, hex::encode(raw)))
    }
}

/// Delegations declared by a targets document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delegations {
    /// Key ID -> key object
    #[serde(default)]
    pub keys: BTreeMap<String, TufKey>,

    /// Delegated roles, in priority order.
    #[serde(default)]
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    /// Look up a delegated role by name.
    pub fn get(&self, role: &Role) -> Option<&DelegatedRole> {
        self.roles.iter().find(|d| &d.name == role)
    }

    /// Resolve the keys this document authorizes for `delegation`.
    pub fn role_keys(&self, delegation: &DelegatedRole) -> TrustResult<RoleKeys> {
        if !delegation.name.is_delegated() {
            return Err(TrustError::TrustChain {
                role: delegation.name.clone(),
                reason: "only targets/<name> roles can be delegated to".to_string(),
            });
        }
        RoleKeys::from_declaration(
            &delegation.name,
            &delegation.key_ids,
            delegation.threshold,
            &self.keys,
        )
    }
}

/// A delegation to a `targets/<name>` role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: Role,

    #[serde(rename = "keyids")]
    pub key_ids: Vec<String>,

    pub threshold: u64,

    /// Tag patterns the delegate may sign for.
    #[serde(default)]
    pub paths: Vec<String>,

    /// Stop searching further delegations once this one has been visited.
    #[serde(default)]
    pub terminating: bool,
}

impl DelegatedRole {
    /// Whether any of the delegation's path patterns covers `tag`.
    ///
    /// A pattern containing `*`, `?` or `[` is a glob; any other pattern is a
    /// prefix, so `""` covers every tag.
    pub fn covers(&self, tag: &str) -> bool {
        self.paths.iter().any(|pattern| path_matches(&self.name, pattern, tag))
    }
}

fn path_matches(role: &Role, pattern: &str, tag: &str) -> bool {
    if !pattern.contains(['*', '?', '[']) {
        return tag.starts_with(pattern);
    }

    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(tag),
        Err(e) => {
            warn!(role = %role, pattern = %pattern, error = %e, "invalid delegation path pattern");
            false
        }
    }
}

impl Targets {
    /// The entry for `tag`, if this document lists it.
    pub fn entry(&self, tag: &str) -> Option<&TargetEntry> {
        self.targets.get(tag)
    }

    /// Declared delegations, in priority order.
    pub fn delegated_roles(&self) -> &[DelegatedRole] {
        self.delegations
            .as_ref()
            .map(|d| d.roles.as_slice())
            .unwrap_or_default()
    }

    /// Look up a delegation declared by this document.
    pub fn delegation(&self, role: &Role) -> Option<&DelegatedRole> {
        self.delegations.as_ref()?.get(role)
    }

    /// Resolve the keys for a delegation declared by this document.
    pub fn delegation_keys(&self, delegation: &DelegatedRole) -> TrustResult<RoleKeys> {
        match &self.delegations {
            Some(delegations) => delegations.role_keys(delegation),
            None => Err(TrustError::TrustChain {
                role: delegation.name.clone(),
                reason: "parent declares no delegations".to_string(),
            }),
        }
    }

    /// Tags whose artifact digest equals `digest`, in tag order.
    pub fn tags_with_digest<'a>(&'a self, digest: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.targets.iter().filter_map(move |(tag, entry)| match entry {
            TargetEntry::Artifact(file) if file.digest().as_deref() == Some(digest) => {
                Some(tag.as_str())
            }
            _ => None,
        })
    }
}

impl Payload for Targets {
    fn document_type(&self) -> &str {
        &self.document_type
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}
