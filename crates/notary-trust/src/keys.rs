//! Verification keys.
//!
//! A [`PublicKey`] is tagged by algorithm; signature checks dispatch on the tag
//! (see [`crate::crypto`]). Keys arrive either as PEM text (trust anchors) or as
//! TUF key objects embedded in root and targets metadata.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pkcs8::DecodePublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use crate::canonical::canonicalize;
use crate::digest::sha256_hex;
use crate::error::{TrustError, TrustResult};

/// Signature algorithm of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// ECDSA over NIST P-256 with SHA-256.
    EcdsaP256Sha256,
    /// RSA with SHA-256 (PKCS#1 v1.5, or PSS when the signature says so).
    RsaSha256,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EcdsaP256Sha256 => write!(f, "ecdsa-p256-sha256"),
            Self::RsaSha256 => write!(f, "rsa-sha256"),
        }
    }
}

/// An opaque verification key.
#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Load a key from PEM text.
    ///
    /// Accepts SPKI `PUBLIC KEY` blocks for ECDSA P-256 and RSA, and PKCS#1
    /// `RSA PUBLIC KEY` blocks.
    pub fn from_pem(pem: &str) -> TrustResult<Self> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(key_format("empty PEM input"));
        }

        let ecdsa_err = match p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            Ok(key) => return Ok(Self::EcdsaP256(key)),
            Err(e) => e,
        };
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(key));
        }

        Err(key_format(format!(
            "not an ECDSA P-256 or RSA public key: {}",
            ecdsa_err
        )))
    }

    /// Load a key from DER bytes (SPKI, or PKCS#1 for RSA).
    pub fn from_der(der: &[u8]) -> TrustResult<Self> {
        let ecdsa_err = match p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            Ok(key) => return Ok(Self::EcdsaP256(key)),
            Err(e) => e,
        };
        if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_der(der) {
            return Ok(Self::Rsa(key));
        }

        Err(key_format(format!(
            "not an ECDSA P-256 or RSA public key: {}",
            ecdsa_err
        )))
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::EcdsaP256(_) => KeyAlgorithm::EcdsaP256Sha256,
            Self::Rsa(_) => KeyAlgorithm::RsaSha256,
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// Load a verification key from PEM text.
pub fn load_key(pem: &str) -> TrustResult<PublicKey> {
    PublicKey::from_pem(pem)
}

/// Key object as it appears in root and delegation metadata.
///
/// ```json
/// {"keytype": "ecdsa", "keyval": {"private": null, "public": "<base64>"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TufKey {
    #[serde(rename = "keytype")]
    pub key_type: String,

    #[serde(rename = "keyval")]
    pub key_val: KeyValue,
}

/// Public (and, never populated here, private) key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub public: String,

    #[serde(default)]
    pub private: Option<String>,
}

impl TufKey {
    /// Build a key object from public key material.
    pub fn new(key_type: impl Into<String>, public: impl Into<String>) -> Self {
        Self {
            key_type: key_type.into(),
            key_val: KeyValue {
                public: public.into(),
                private: None,
            },
        }
    }

    /// Key ID: lowercase hex SHA-256 of the canonical JSON of this object.
    pub fn key_id(&self) -> TrustResult<String> {
        let bytes = canonicalize(self).map_err(|e| TrustError::KeyFormat {
            reason: format!("failed to canonicalize key: {}", e),
        })?;
        Ok(sha256_hex(&bytes))
    }

    /// Decode into a verification key.
    ///
    /// The `public` value may be base64 DER or base64 PEM; the decoded
    /// algorithm must agree with `keytype`.
    pub fn to_public_key(&self) -> TrustResult<PublicKey> {
        let expected = match self.key_type.as_str() {
            "ecdsa" => KeyAlgorithm::EcdsaP256Sha256,
            "rsa" => KeyAlgorithm::RsaSha256,
            other => return Err(key_format(format!("unsupported key type: {}", other))),
        };

        let raw = BASE64
            .decode(self.key_val.public.trim())
            .map_err(|e| key_format(format!("invalid base64 public key: {}", e)))?;

        let key = match std::str::from_utf8(&raw) {
            Ok(text) if text.trim_start().starts_with("-----BEGIN") => PublicKey::from_pem(text)?,
            _ => PublicKey::from_der(&raw)?,
        };

        if key.algorithm() != expected {
            return Err(key_format(format!(
                "keytype {} does not match {} key material",
                self.key_type,
                key.algorithm()
            )));
        }

        Ok(key)
    }
}

fn key_format(reason: impl Into<String>) -> TrustError {
    TrustError::KeyFormat {
        reason: reason.into(),
    }
}
