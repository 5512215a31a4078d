//! Trust metadata documents.
//!
//! Every document is a signature envelope around a role-specific payload:
//!
//! ```json
//! {
//!   "signed": {"_type": "Targets", "version": 3, "expires": "2030-01-01T00:00:00Z", ...},
//!   "signatures": [{"keyid": "...", "method": "ecdsa", "sig": "<base64>"}]
//! }
//! ```
//!
//! Signatures cover the canonical JSON of `signed`. A parsed
//! [`MetadataDocument`] keeps both that canonical message and the served bytes;
//! the latter are what snapshot and timestamp hashes refer to.

mod meta;
mod root;
mod targets;

pub use meta::{FileMeta, Snapshot, Timestamp};
pub use root::{Root, RoleDeclaration};
pub use targets::{DelegatedRole, Delegations, TargetEntry, TargetFile, Targets};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::canonical::to_canonical_string;
use crate::crypto::{SignatureEnvelope, SignatureVerifier};
use crate::error::{TrustError, TrustResult};
use crate::keys::PublicKey;
use crate::keystore::RoleKeys;
use crate::role::Role;

/// A signature over a document's canonical payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Key ID.
    #[serde(rename = "keyid")]
    pub key_id: String,

    /// Signature method (`ecdsa`, `rsapss`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Base64-encoded signature.
    #[serde(rename = "sig")]
    pub signature: String,
}

/// Role-specific signed payload.
pub trait Payload: DeserializeOwned {
    /// Value of the `_type` field.
    fn document_type(&self) -> &str;

    fn version(&self) -> u64;

    fn expires(&self) -> DateTime<Utc>;
}

#[derive(Deserialize)]
struct Envelope {
    signed: JsonValue,

    #[serde(default)]
    signatures: Vec<Signature>,
}

/// A fetched, parsed, not-yet-trusted metadata document.
#[derive(Debug, Clone)]
pub struct MetadataDocument<T> {
    role: Role,
    signed: T,
    signatures: Vec<Signature>,
    canonical: String,
    raw: Vec<u8>,
}

pub type RootDocument = MetadataDocument<Root>;
pub type TargetsDocument = MetadataDocument<Targets>;
pub type SnapshotDocument = MetadataDocument<Snapshot>;
pub type TimestampDocument = MetadataDocument<Timestamp>;

impl<T: Payload> MetadataDocument<T> {
    /// Parse a document served for `role`.
    ///
    /// Fails with `MalformedMetadata` when the JSON does not have the expected
    /// shape, the `_type` does not belong to `role`, or the version is 0.
    pub fn from_slice(role: &Role, bytes: &[u8]) -> TrustResult<Self> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| malformed(role, e.to_string()))?;

        let canonical = to_canonical_string(&envelope.signed)
            .map_err(|e| malformed(role, format!("failed to canonicalize: {}", e)))?;

        let signed: T = serde_json::from_value(envelope.signed)
            .map_err(|e| malformed(role, e.to_string()))?;

        if signed.document_type() != role.document_type() {
            return Err(malformed(
                role,
                format!(
                    "expected _type {}, got {}",
                    role.document_type(),
                    signed.document_type()
                ),
            ));
        }

        if signed.version() == 0 {
            return Err(malformed(role, "version must be at least 1"));
        }

        Ok(Self {
            role: role.clone(),
            signed,
            signatures: envelope.signatures,
            canonical,
            raw: bytes.to_vec(),
        })
    }
}

impl<T> MetadataDocument<T> {
    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn signed(&self) -> &T {
        &self.signed
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Canonical message the signatures cover.
    pub fn canonical_message(&self) -> &str {
        &self.canonical
    }

    /// Bytes as served by the repository.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn envelope<'a>(&'a self, sig: &'a Signature) -> SignatureEnvelope<'a> {
        SignatureEnvelope {
            signer_key_id: &sig.key_id,
            signature: &sig.signature,
            method: sig.method.as_deref(),
            message: &self.canonical,
        }
    }

    /// Key IDs from `keys` that produced a valid signature.
    ///
    /// Signatures from unknown keys are ignored; invalid signatures from
    /// authorized keys are logged and not counted.
    pub fn valid_signers(
        &self,
        keys: &RoleKeys,
        verifier: &dyn SignatureVerifier,
    ) -> BTreeSet<String> {
        let mut signers = BTreeSet::new();

        for sig in &self.signatures {
            let Some(key) = keys.get(&sig.key_id) else {
                debug!(role = %self.role, key_id = %sig.key_id, "signature from unknown key ignored");
                continue;
            };
            if signers.contains(&sig.key_id) {
                continue;
            }

            match verifier.verify(key, &self.envelope(sig)) {
                Ok(()) => {
                    signers.insert(sig.key_id.clone());
                }
                Err(e) => {
                    warn!(role = %self.role, key_id = %sig.key_id, error = %e, "invalid signature");
                }
            }
        }

        signers
    }

    /// Require at least `keys.threshold()` distinct valid signatures.
    pub fn verify_threshold(
        &self,
        keys: &RoleKeys,
        verifier: &dyn SignatureVerifier,
    ) -> TrustResult<BTreeSet<String>> {
        let signers = self.valid_signers(keys, verifier);
        if signers.len() < keys.threshold() {
            return Err(TrustError::TrustChain {
                role: self.role.clone(),
                reason: format!(
                    "threshold not met: {} of {} required valid signatures",
                    signers.len(),
                    keys.threshold()
                ),
            });
        }
        Ok(signers)
    }

    /// Whether any signature on the document verifies with `key`, regardless
    /// of the key ID it claims.
    pub fn is_signed_by(&self, key: &PublicKey, verifier: &dyn SignatureVerifier) -> bool {
        self.signatures
            .iter()
            .any(|sig| verifier.verify(key, &self.envelope(sig)).is_ok())
    }
}

impl<T: Payload> MetadataDocument<T> {
    pub fn version(&self) -> u64 {
        self.signed.version()
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.signed.expires()
    }
}

fn malformed(role: &Role, reason: impl Into<String>) -> TrustError {
    TrustError::MalformedMetadata {
        role: role.clone(),
        reason: reason.into(),
    }
}
