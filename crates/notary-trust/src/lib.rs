//! Notary trust-metadata resolution for container images.
//!
//! This crate decides whether an image tag is signed by a delegated trust
//! hierarchy (TUF/Notary v1) before the image is allowed to run, providing:
//!
//! - Role parsing and key stores with signature thresholds
//! - ECDSA P-256 and RSA signature verification over canonical JSON
//! - Root, snapshot, timestamp and targets metadata models
//! - Expiry and rollback enforcement
//! - Delegation walks with path scoping, cycle and depth bounds
//!
//! Metadata transport is supplied by the host through [`MetadataFetcher`].
//!
//! # Quick Start
//!
//! ```no_run
//! use notary_trust::{InMemoryFetcher, TrustAnchor, TrustConfig, TrustResolver};
//!
//! # async fn example(root_key_pem: &str) -> notary_trust::TrustResult<()> {
//! let config = TrustConfig::new(TrustAnchor::single(root_key_pem));
//! let fetcher = InMemoryFetcher::new();
//! let resolver = TrustResolver::new(&config, fetcher)?;
//!
//! let result = resolver.resolve_trusted_digest("docker.io/acme/api:v1.0").await?;
//! println!("{} is signed as {}", result.image, result.verified_digest);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Field | Description |
//! |-------|-------------|
//! | `trust_anchor.keys` | PEM public keys pinned for the root role |
//! | `trust_anchor.threshold` | Pinned keys that must sign the root (default: 1) |
//! | `fetch_timeout_secs` | Per-document fetch timeout (default: 30) |
//! | `max_delegation_depth` | Nested delegations followed below `targets` (default: 8) |
//! | `default_registry` | Registry for references that name none (default: `docker.io`) |

mod canonical;
pub mod config;
pub mod crypto;
mod digest;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod image;
pub mod keys;
pub mod keystore;
pub mod metadata;
pub mod resolver;
pub mod role;

// Re-export main types
pub use config::{TrustAnchor, TrustConfig};
pub use crypto::{verify, DefaultVerifier, SignatureEnvelope, SignatureVerifier, METHOD_RSA_PSS};
pub use error::{FetchError, TrustError, TrustResult};
pub use fetch::{InMemoryFetcher, MetadataFetcher};
pub use freshness::{check_freshness, check_monotonic, SessionVersions, VersionStore};
pub use image::ImageRef;
pub use keys::{load_key, KeyAlgorithm, PublicKey, TufKey};
pub use keystore::{KeyStore, RoleKeys};
pub use metadata::{MetadataDocument, Signature};
pub use resolver::{TrustResolver, VerificationResult};
pub use role::Role;
