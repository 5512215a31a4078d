//! Canonical JSON for signed metadata payloads.
//!
//! Signatures cover the canonical form of the `signed` object: keys sorted,
//! no insignificant whitespace (RFC 8785). The payload is re-serialized from
//! the parsed JSON value, so formatting of the served document does not
//! affect verification.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Canonicalize any serializable value.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_jcs::to_vec(value)
}

/// Canonical form as a string, for the `message` argument of signature checks.
pub fn to_canonical_string(value: &JsonValue) -> Result<String, serde_json::Error> {
    serde_jcs::to_string(value)
}
