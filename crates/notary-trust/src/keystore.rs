//! Role → key mapping with signature thresholds.
//!
//! A [`KeyStore`] is an immutable snapshot. Extending it with a newly
//! discovered delegation returns a new snapshot that shares the existing
//! entries; holders of the old snapshot never observe the change.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::warn;

use crate::error::{TrustError, TrustResult};
use crate::keys::{PublicKey, TufKey};
use crate::role::Role;

/// Keys authorized for one role, and how many of them must sign.
#[derive(Debug, Clone)]
pub struct RoleKeys {
    /// Key ID -> key
    keys: BTreeMap<String, PublicKey>,

    threshold: usize,
}

impl RoleKeys {
    /// Create a key set. Fails unless `1 <= threshold <= keys.len()`.
    pub fn new(role: &Role, keys: BTreeMap<String, PublicKey>, threshold: usize) -> TrustResult<Self> {
        if threshold == 0 {
            return Err(TrustError::TrustChain {
                role: role.clone(),
                reason: "threshold must be at least 1".to_string(),
            });
        }
        if threshold > keys.len() {
            return Err(TrustError::TrustChain {
                role: role.clone(),
                reason: format!(
                    "threshold {} exceeds the {} usable keys",
                    threshold,
                    keys.len()
                ),
            });
        }
        Ok(Self { keys, threshold })
    }

    /// Resolve a role declaration (`keyids` + `threshold`) against the key
    /// objects published next to it.
    ///
    /// Keys that are missing, undecodable, of an unsupported type, or whose
    /// computed ID differs from the declared one are skipped, as is a second
    /// encoding of a key already accepted. The declaration
    /// still fails if the remaining keys cannot meet the threshold.
    pub fn from_declaration(
        role: &Role,
        key_ids: &[String],
        threshold: u64,
        published: &BTreeMap<String, TufKey>,
    ) -> TrustResult<Self> {
        let mut keys = BTreeMap::new();

        for key_id in key_ids {
            let Some(tuf_key) = published.get(key_id) else {
                warn!(role = %role, key_id = %key_id, "authorized key not published, skipping");
                continue;
            };

            match tuf_key.key_id() {
                Ok(computed) if &computed == key_id => {}
                Ok(computed) => {
                    warn!(
                        role = %role,
                        claimed = %key_id,
                        computed = %computed,
                        "key_id mismatch, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(role = %role, key_id = %key_id, error = %e, "failed to compute key id");
                    continue;
                }
            }

            match tuf_key.to_public_key() {
                Ok(key) if keys.values().any(|accepted| accepted == &key) => {
                    warn!(
                        role = %role,
                        key_id = %key_id,
                        "same public key already authorized, skipping"
                    );
                }
                Ok(key) => {
                    keys.insert(key_id.clone(), key);
                }
                Err(e) => {
                    warn!(role = %role, key_id = %key_id, error = %e, "failed to decode key");
                }
            }
        }

        let threshold = usize::try_from(threshold).map_err(|_| TrustError::TrustChain {
            role: role.clone(),
            reason: format!("threshold {} out of range", threshold),
        })?;

        Self::new(role, keys, threshold)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Get a key by ID.
    pub fn get(&self, key_id: &str) -> Option<&PublicKey> {
        self.keys.get(key_id)
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Snapshot of role keys for one resolution.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    roles: Arc<HashMap<Role, Arc<RoleKeys>>>,
}

impl KeyStore {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new snapshot with `role` bound to `keys`.
    ///
    /// `self` is left untouched.
    pub fn with_role(&self, role: Role, keys: RoleKeys) -> Self {
        let mut roles: HashMap<Role, Arc<RoleKeys>> = self.roles.as_ref().clone();
        roles.insert(role, Arc::new(keys));
        Self {
            roles: Arc::new(roles),
        }
    }

    /// Get the keys for a role.
    pub fn get(&self, role: &Role) -> Option<&RoleKeys> {
        self.roles.get(role).map(Arc::as_ref)
    }

    /// Get the keys for a role, failing if no parent role delegated to it.
    pub fn require(&self, role: &Role) -> TrustResult<&RoleKeys> {
        self.get(role).ok_or_else(|| TrustError::TrustChain {
            role: role.clone(),
            reason: "no keys delegated to this role".to_string(),
        })
    }

    pub fn contains(&self, role: &Role) -> bool {
        self.roles.contains_key(role)
    }

    /// All roles with keys, sorted.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.keys().cloned().collect();
        roles.sort();
        roles
    }
}
