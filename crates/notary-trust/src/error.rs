//! Error types for trust resolution.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::role::Role;

/// Trust resolution errors.
///
/// Every variant that is caused by a specific metadata document carries the
/// [`Role`] of that document.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// Role string does not match the role grammar.
    #[error("{value} is not a valid TUF role")]
    InvalidFormat { value: String },

    /// Key material could not be parsed as a verification key.
    #[error("invalid key material: {reason}")]
    KeyFormat { reason: String },

    /// Signature is not valid base64.
    #[error("invalid base64 signature: {reason}")]
    Encoding { reason: String },

    /// Signature does not verify against the key and message.
    #[error("signature validation failed: {reason}")]
    Validation { reason: String },

    /// Signature threshold not met or trust anchor not among the signers.
    #[error("trust chain broken at {role}: {reason}")]
    TrustChain { role: Role, reason: String },

    /// Document version is older than the last one seen.
    #[error("rollback detected for {role}: version {actual} is older than last seen {last_seen}")]
    Rollback {
        role: Role,
        last_seen: u64,
        actual: u64,
    },

    /// Document has expired.
    #[error("metadata for {role} expired at {expires}")]
    ExpiredMetadata { role: Role, expires: DateTime<Utc> },

    /// Document does not match the hash/length/version declared for it.
    #[error("integrity check failed for {role}: {reason}")]
    Integrity { role: Role, reason: String },

    /// Delegate is not permitted to sign for the requested tag.
    #[error("{role} is not delegated to sign for {tag}")]
    DelegationScope { role: Role, tag: String },

    /// No trusted entry could be found for the requested image.
    #[error("no trusted data for {target}: {reason}")]
    UnresolvedTrust { target: String, reason: String },

    /// Document could not be fetched.
    #[error("failed to fetch {role} metadata: {source}")]
    MetadataFetch {
        role: Role,
        #[source]
        source: FetchError,
    },

    /// Fetch did not complete within the configured timeout.
    #[error("fetching {role} metadata timed out after {after:?}")]
    Timeout { role: Role, after: Duration },

    /// Document is not well-formed trust metadata.
    #[error("malformed {role} metadata: {reason}")]
    MalformedMetadata { role: Role, reason: String },

    /// Image reference could not be parsed.
    #[error("invalid image reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl TrustError {
    /// Whether the caller may retry the same request.
    ///
    /// Only transport-level failures are retryable; trust violations require
    /// fresh metadata.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MetadataFetch { .. } | Self::Timeout { .. })
    }

    /// Whether the error is a trust violation that ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::TrustChain { .. }
                | Self::Rollback { .. }
                | Self::ExpiredMetadata { .. }
                | Self::Integrity { .. }
                | Self::DelegationScope { .. }
                | Self::UnresolvedTrust { .. }
                | Self::MalformedMetadata { .. }
        )
    }

    /// The role whose document caused the failure, if any.
    pub fn role(&self) -> Option<&Role> {
        match self {
            Self::TrustChain { role, .. }
            | Self::Rollback { role, .. }
            | Self::ExpiredMetadata { role, .. }
            | Self::Integrity { role, .. }
            | Self::DelegationScope { role, .. }
            | Self::MetadataFetch { role, .. }
            | Self::Timeout { role, .. }
            | Self::MalformedMetadata { role, .. } => Some(role),
            _ => None,
        }
    }
}

/// Errors reported by a [`MetadataFetcher`](crate::fetch::MetadataFetcher).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The repository has no document for the role.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Transport failure (connection, TLS, HTTP status).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Anything else the collaborator wants to report.
    #[error("{message}")]
    Other { message: String },
}

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustError>;
