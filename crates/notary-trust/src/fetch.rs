//! Metadata retrieval seam.
//!
//! Transport is supplied by the host: anything that can return the bytes of
//! `<role>.json` for a trust repository implements [`MetadataFetcher`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{FetchError, TrustError, TrustResult};
use crate::role::Role;

/// Fetches raw metadata documents in the TUF repository layout.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Return the served bytes of `role.metadata_file()` in `repository`.
    async fn fetch_metadata(&self, role: &Role, repository: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<F: MetadataFetcher + ?Sized> MetadataFetcher for Arc<F> {
    async fn fetch_metadata(&self, role: &Role, repository: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_metadata(role, repository).await
    }
}

/// Fetch one document, bounded by `timeout`.
pub(crate) async fn fetch_with_timeout(
    fetcher: &dyn MetadataFetcher,
    role: &Role,
    repository: &str,
    timeout: Duration,
) -> TrustResult<Vec<u8>> {
    debug!(role = %role, repo = %repository, "fetching metadata");

    match tokio::time::timeout(timeout, fetcher.fetch_metadata(role, repository)).await {
        Ok(Ok(bytes)) => {
            debug!(role = %role, repo = %repository, size = bytes.len(), "fetched metadata");
            Ok(bytes)
        }
        Ok(Err(source)) => Err(TrustError::MetadataFetch {
            role: role.clone(),
            source,
        }),
        Err(_) => Err(TrustError::Timeout {
            role: role.clone(),
            after: timeout,
        }),
    }
}

/// Fetcher serving documents from memory.
///
/// Useful for air-gapped setups that sync metadata out of band, and in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    documents: Arc<RwLock<HashMap<(String, Role), Vec<u8>>>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `role` in `repository`, replacing any previous document.
    pub async fn insert(&self, repository: &str, role: Role, bytes: Vec<u8>) {
        self.documents
            .write()
            .await
            .insert((repository.to_string(), role), bytes);
    }

    /// Stop serving a document.
    pub async fn remove(&self, repository: &str, role: &Role) -> Option<Vec<u8>> {
        self.documents
            .write()
            .await
            .remove(&(repository.to_string(), role.clone()))
    }
}

#[async_trait]
impl MetadataFetcher for InMemoryFetcher {
    async fn fetch_metadata(&self, role: &Role, repository: &str) -> Result<Vec<u8>, FetchError> {
        self.documents
            .read()
            .await
            .get(&(repository.to_string(), role.clone()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                path: format!("{}/{}", repository, role.metadata_file()),
            })
    }
}
