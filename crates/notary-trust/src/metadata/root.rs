use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Payload;
use crate::error::{TrustError, TrustResult};
use crate::keys::TufKey;
use crate::keystore::RoleKeys;
use crate::role::Role;

/// Payload of `root.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    #[serde(rename = "_type")]
    pub document_type: String,

    pub version: u64,

    pub expires: DateTime<Utc>,

    #[serde(default)]
    pub consistent_snapshot: bool,

    /// Key ID -> key object
    #[serde(default)]
    pub keys: BTreeMap<String, TufKey>,

    /// Role name -> authorized keys and threshold
    #[serde(default)]
    pub roles: BTreeMap<String, RoleDeclaration>,
}

/// Keys authorized for a top-level role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    #[serde(rename = "keyids")]
    pub key_ids: Vec<String>,

    pub threshold: u64,
}

impl Root {
    /// Declaration for a top-level role, if the root lists it.
    pub fn declaration(&self, role: &Role) -> Option<&RoleDeclaration> {
        self.roles.get(&role.to_string())
    }

    /// Resolve the keys the root authorizes for `role`.
    ///
    /// Fails with `TrustChain` when the role is not declared or its
    /// declaration cannot meet its own threshold.
    pub fn role_keys(&self, role: &Role) -> TrustResult<RoleKeys> {
        let declaration = self
            .declaration(role)
            .ok_or_else(|| TrustError::TrustChain {
                role: role.clone(),
                reason: "role not declared in root metadata".to_string(),
            })?;
        RoleKeys::from_declaration(role, &declaration.key_ids, declaration.threshold, &self.keys)
    }
}

impl Payload for Root {
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
