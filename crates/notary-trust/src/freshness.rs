//! Expiry and rollback enforcement.
//!
//! The checks are pure. Last-seen versions come from a [`VersionStore`] the
//! caller injects into the resolver; without one, each resolution starts with
//! no known versions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{TrustError, TrustResult};
use crate::role::Role;

/// Fail if `expires` is not strictly after `now`.
pub fn check_freshness(role: &Role, expires: DateTime<Utc>, now: DateTime<Utc>) -> TrustResult<()> {
    if expires <= now {
        return Err(TrustError::ExpiredMetadata {
            role: role.clone(),
            expires,
        });
    }
    Ok(())
}

/// Fail if `version` is older than `last_seen`.
///
/// Re-serving the same version is allowed.
pub fn check_monotonic(role: &Role, version: u64, last_seen: Option<u64>) -> TrustResult<()> {
    match last_seen {
        Some(last_seen) if version < last_seen => Err(TrustError::Rollback {
            role: role.clone(),
            last_seen,
            actual: version,
        }),
        _ => Ok(()),
    }
}

/// Last-seen metadata versions, per trust repository and role.
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn last_version(&self, repository: &str, role: &Role) -> Option<u64>;

    /// Record `version` as seen. Implementations never lower a stored version.
    async fn record_version(&self, repository: &str, role: &Role, version: u64);
}

/// In-memory version store.
#[derive(Debug, Clone, Default)]
pub struct SessionVersions {
    inner: Arc<RwLock<HashMap<(String, Role), u64>>>,
}

impl SessionVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (repository, role) pairs recorded.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl VersionStore for SessionVersions {
    async fn last_version(&self, repository: &str, role: &Role) -> Option<u64> {
        self.inner
            .read()
            .await
            .get(&(repository.to_string(), role.clone()))
            .copied()
    }

    async fn record_version(&self, repository: &str, role: &Role, version: u64) {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entry((repository.to_string(), role.clone()))
            .or_insert(version);
        if *entry < version {
            *entry = version;
        }
    }
}
