//! Signature verification.
//!
//! One capability for every key algorithm: callers hand over a [`PublicKey`]
//! and the verifier dispatches on its algorithm tag.
//!
//! # Verification Steps
//!
//! 1. Decode the signature from base64 (`Encoding` error on failure)
//! 2. Take the message as UTF-8 bytes, exactly as given
//! 3. ECDSA P-256: SHA-256 over the message; signature is fixed-width `r||s`
//!    or ASN.1 DER
//! 4. RSA: SHA-256 over the message; PKCS#1 v1.5, or PSS when the signature
//!    method is `rsapss`

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::Verifier;
use rsa::sha2::Sha256;

use crate::error::{TrustError, TrustResult};
use crate::keys::PublicKey;

/// Signature method marking an RSASSA-PSS signature.
pub const METHOD_RSA_PSS: &str = "rsapss";

/// Length of a fixed-width P-256 `r||s` signature.
const ECDSA_P256_FIXED_LEN: usize = 64;

/// A single signature ready to be checked.
#[derive(Debug, Clone, Copy)]
pub struct SignatureEnvelope<'a> {
    /// Key ID the signature claims to be made with.
    pub signer_key_id: &'a str,

    /// Base64-encoded signature.
    pub signature: &'a str,

    /// Signature method declared next to the signature, if any.
    pub method: Option<&'a str>,

    /// Canonical message the signature covers.
    pub message: &'a str,
}

/// Cryptographic verification capability.
pub trait SignatureVerifier: Send + Sync + std::fmt::Debug {
    /// Verify one signature. Returns `Ok(())` only if it is valid.
    fn verify(&self, key: &PublicKey, envelope: &SignatureEnvelope<'_>) -> TrustResult<()>;
}

/// Verifier backed by the RustCrypto `p256` and `rsa` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVerifier;

impl SignatureVerifier for DefaultVerifier {
    fn verify(&self, key: &PublicKey, envelope: &SignatureEnvelope<'_>) -> TrustResult<()> {
        let signature = decode_signature(envelope.signature)?;
        let message = envelope.message.as_bytes();

        match key {
            PublicKey::EcdsaP256(key) => verify_ecdsa(key, &signature, message),
            PublicKey::Rsa(key) => {
                if envelope.method == Some(METHOD_RSA_PSS) {
                    verify_rsa_pss(key, &signature, message)
                } else {
                    verify_rsa_pkcs1v15(key, &signature, message)
                }
            }
        }
    }
}

/// Verify a base64 signature over `message` with `key`.
///
/// `message` must already be canonically serialized; it is hashed byte for
/// byte.
pub fn verify(key: &PublicKey, signature_b64: &str, message: &str) -> TrustResult<()> {
    DefaultVerifier.verify(
        key,
        &SignatureEnvelope {
            signer_key_id: "",
            signature: signature_b64,
            method: None,
            message,
        },
    )
}

fn decode_signature(signature_b64: &str) -> TrustResult<Vec<u8>> {
    BASE64
        .decode(signature_b64.trim())
        .map_err(|e| TrustError::Encoding {
            reason: e.to_string(),
        })
}

fn verify_ecdsa(
    key: &p256::ecdsa::VerifyingKey,
    signature: &[u8],
    message: &[u8],
) -> TrustResult<()> {
    let parsed = if signature.len() == ECDSA_P256_FIXED_LEN {
        p256::ecdsa::Signature::from_slice(signature)
    } else {
        p256::ecdsa::Signature::from_der(signature)
    }
    .map_err(|e| validation(format!("malformed ECDSA signature: {}", e)))?;

    key.verify(message, &parsed)
        .map_err(|_| validation("ecdsa verification failed"))
}

fn verify_rsa_pkcs1v15(
    key: &rsa::RsaPublicKey,
    signature: &[u8],
    message: &[u8],
) -> TrustResult<()> {
    let parsed = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| validation(format!("malformed RSA signature: {}", e)))?;

    rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
        .verify(message, &parsed)
        .map_err(|_| validation("rsa pkcs1v15 verification failed"))
}

fn verify_rsa_pss(key: &rsa::RsaPublicKey, signature: &[u8], message: &[u8]) -> TrustResult<()> {
    let parsed = rsa::pss::Signature::try_from(signature)
        .map_err(|e| validation(format!("malformed RSA-PSS signature: {}", e)))?;

    rsa::pss::VerifyingKey::<Sha256>::new(key.clone())
        .verify(message, &parsed)
        .map_err(|_| validation("rsa pss verification failed"))
}

fn validation(reason: impl Into<String>) -> TrustError {
    TrustError::Validation {
        reason: reason.into(),
    }
}
