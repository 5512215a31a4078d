//! Resolver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TrustError, TrustResult};
use crate::image::DEFAULT_REGISTRY;
use crate::keys::{load_key, PublicKey};

/// Pinned root keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// PEM-encoded public keys.
    #[serde(default)]
    pub keys: Vec<String>,

    /// How many of `keys` must have signed the root document.
    #[serde(default = "default_anchor_threshold")]
    pub threshold: u64,
}

fn default_anchor_threshold() -> u64 {
    1
}

impl Default for TrustAnchor {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            threshold: default_anchor_threshold(),
        }
    }
}

impl TrustAnchor {
    /// Anchor with a single pinned key.
    pub fn single(pem: impl Into<String>) -> Self {
        Self {
            keys: vec![pem.into()],
            threshold: 1,
        }
    }

    /// Anchor with several pinned keys, `threshold` of which must sign.
    pub fn with_threshold(keys: Vec<String>, threshold: u64) -> Self {
        Self { keys, threshold }
    }

    /// Decode the pinned keys and validate the threshold.
    ///
    /// Each key must be distinct, so the threshold counts distinct signers.
    pub fn load(&self) -> TrustResult<(Vec<PublicKey>, usize)> {
        if self.keys.is_empty() {
            return Err(config_error("trust anchor has no keys"));
        }

        let keys = self
            .keys
            .iter()
            .map(|pem| load_key(pem))
            .collect::<TrustResult<Vec<_>>>()?;

        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(config_error(format!(
                    "trust anchor key {} duplicates an earlier key",
                    i + 1
                )));
            }
        }

        let threshold = usize::try_from(self.threshold).unwrap_or(usize::MAX);
        if threshold == 0 || threshold > keys.len() {
            return Err(config_error(format!(
                "trust anchor threshold {} must be between 1 and {}",
                self.threshold,
                keys.len()
            )));
        }

        Ok((keys, threshold))
    }
}

/// Trust resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Pinned root keys.
    #[serde(default)]
    pub trust_anchor: TrustAnchor,

    /// Per-document fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Maximum depth of nested delegations below `targets`.
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: usize,

    /// Registry assumed for references that name none.
    #[serde(default = "default_registry")]
    pub default_registry: String,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_delegation_depth() -> usize {
    8
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trust_anchor: TrustAnchor::default(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_delegation_depth: default_max_delegation_depth(),
            default_registry: default_registry(),
        }
    }
}

impl TrustConfig {
    /// Config with the given anchor and default settings.
    pub fn new(trust_anchor: TrustAnchor) -> Self {
        Self {
            trust_anchor,
            ..Self::default()
        }
    }

    /// Set the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the maximum delegation depth.
    pub fn with_max_delegation_depth(mut self, depth: usize) -> Self {
        self.max_delegation_depth = depth;
        self
    }

    /// Set the default registry.
    pub fn with_default_registry(mut self, registry: impl Into<String>) -> Self {
        self.default_registry = registry.into();
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn config_error(message: impl Into<String>) -> TrustError {
    TrustError::Config {
        message: message.into(),
    }
}
