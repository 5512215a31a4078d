use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256, Sha512};

/// Prefix used for artifact digests.
pub const SHA256_PREFIX: &str = "sha256:";

pub(crate) fn sha256_bytes(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

pub(crate) fn sha512_bytes(bytes: &[u8]) -> Vec<u8> {
    Sha512::digest(bytes).to_vec()
}

/// Decode a declared hash value, written either as base64 (Notary) or hex
/// (TUF), into raw bytes of the expected length.
pub(crate) fn decode_declared_hash(value: &str, expected_len: usize) -> Option<Vec<u8>> {
    if let Ok(raw) = BASE64.decode(value) {
        if raw.len() == expected_len {
            return Some(raw);
        }
    }
    match hex::decode(value) {
        Ok(raw) if raw.len() == expected_len => Some(raw),
        _ => None,
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256_bytes(bytes))
}

/// Base64 SHA-256 of `bytes`, as Notary writes it into `hashes.sha256`.
#[cfg(test)]
pub(crate) fn sha256_base64(bytes: &[u8]) -> String {
    BASE64.encode(sha256_bytes(bytes))
}

/// Normalize a `sha256:<hex>` digest to lowercase, validating its shape.
pub(crate) fn normalize_digest(value: &str) -> Option<String> {
    let hex_part = value.strip_prefix(SHA256_PREFIX)?;
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("{}{}", SHA256_PREFIX, hex_part.to_ascii_lowercase()))
}
