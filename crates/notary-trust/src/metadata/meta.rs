use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Payload;
use crate::digest::{decode_declared_hash, sha256_bytes, sha512_bytes};
use crate::error::{TrustError, TrustResult};
use crate::role::Role;

/// What a snapshot or timestamp declares about another document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Algorithm -> hash (base64 or hex)
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl FileMeta {
    /// Check a fetched document against this declaration.
    ///
    /// Every declared field must match. Hashes in algorithms other than
    /// SHA-256 and SHA-512 are ignored, but at least one supported hash or a
    /// version must be declared.
    pub fn check(&self, role: &Role, raw: &[u8], version: u64) -> TrustResult<()> {
        let integrity = |reason: String| TrustError::Integrity {
            role: role.clone(),
            reason,
        };

        if let Some(expected) = self.length {
            if expected != raw.len() as u64 {
                return Err(integrity(format!(
                    "length mismatch: declared {}, got {}",
                    expected,
                    raw.len()
                )));
            }
        }

        let mut checked_hash = false;
        for (algorithm, declared) in &self.hashes {
            let (actual, len) = match algorithm.as_str() {
                "sha256" => (sha256_bytes(raw), 32),
                "sha512" => (sha512_bytes(raw), 64),
                _ => continue,
            };
            let expected = decode_declared_hash(declared, len).ok_or_else(|| {
                integrity(format!("declared {} hash is not well-formed", algorithm))
            })?;
            if expected != actual {
                return Err(integrity(format!("{} hash mismatch", algorithm)));
            }
            checked_hash = true;
        }

        if let Some(expected) = self.version {
            if expected != version {
                return Err(integrity(format!(
                    "version mismatch: declared {}, got {}",
                    expected, version
                )));
            }
        } else if !checked_hash {
            return Err(integrity(
                "declaration carries neither a supported hash nor a version".to_string(),
            ));
        }

        Ok(())
    }
}

/// Payload of `snapshot.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "_type")]
    pub document_type: String,

    pub version: u64,

    pub expires: DateTime<Utc>,

    /// Role name -> declared meta
    #[serde(default)]
    pub meta: BTreeMap<String, FileMeta>,
}

impl Snapshot {
    /// Declared meta for `role`, keyed either by role name or by file name.
    pub fn meta_for(&self, role: &Role) -> Option<&FileMeta> {
        self.meta
            .get(&role.to_string())
            .or_else(|| self.meta.get(&role.metadata_file()))
    }
}

impl Payload for Snapshot {
    fn document_type(&self) -> &str {
        &self.document_type
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

/// Payload of `timestamp.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "_type")]
    pub document_type: String,

    pub version: u64,

    pub expires: DateTime<Utc>,

    #[serde(default)]
    pub meta: BTreeMap<String, FileMeta>,
}

impl Timestamp {
    /// Declared meta for the snapshot document.
    pub fn snapshot_meta(&self) -> Option<&FileMeta> {
        self.meta
            .get("snapshot")
            .or_else(|| self.meta.get("snapshot.json"))
    }
}

impl Payload for Timestamp {
    fn document_type(&self) -> &str {
        &self.document_type
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{sha256_base64, sha256_hex};
    use serde_json::json;

    const DOC: &[u8] = br#"{"signed":{},"signatures":[]}"#;

    fn meta(hashes: &[(&str, String)], length: Option<u64>, version: Option<u64>) -> FileMeta {
        FileMeta {
            hashes: hashes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            length,
            version,
        }
    }

    #[test]
    fn test_matching_meta_passes() {
        let declared = meta(
            &[("sha256", sha256_base64(DOC))],
            Some(DOC.len() as u64),
            Some(3),
        );
        assert!(declared.check(&Role::Targets, DOC, 3).is_ok());

        // Hex-encoded hashes are accepted too.
        let hex_declared = meta(&[("sha256", sha256_hex(DOC))], None, None);
        assert!(hex_declared.check(&Role::Targets, DOC, 3).is_ok());
    }

    #[test]
    fn test_hash_mismatch() {
        let declared = meta(&[("sha256", sha256_base64(b"other"))], None, Some(1));
        let err = declared.check(&Role::Snapshot, DOC, 1).unwrap_err();
        assert!(matches!(err, TrustError::Integrity { role: Role::Snapshot, .. }));
        assert!(err.to_string().contains("sha256 hash mismatch"));
    }

    #[test]
    fn test_length_and_version_mismatch() {
        let declared = meta(&[], Some(1), Some(1));
        assert!(declared.check(&Role::Targets, DOC, 1).is_err());

        let declared = meta(&[], None, Some(2));
        let err = declared.check(&Role::Targets, DOC, 1).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_empty_declaration_rejected() {
        let declared = meta(&[("md5", "AAAA".to_string())], Some(DOC.len() as u64), None);
        assert!(matches!(
            declared.check(&Role::Targets, DOC, 1),
            Err(TrustError::Integrity { .. })
        ));
    }

    #[test]
    fn test_malformed_declared_hash() {
        let declared = meta(&[("sha256", "not-a-hash".to_string())], None, Some(1));
        assert!(declared.check(&Role::Targets, DOC, 1).is_err());
    }

    #[test]
    fn test_snapshot_meta_lookup_by_role_or_file_name() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "_type": "Snapshot",
            "version": 1,
            "expires": "2099-01-01T00:00:00Z",
            "meta": {
                "targets": {"version": 4},
                "targets/releases.json": {"version": 2}
            }
        }))
        .unwrap();

        assert_eq!(snapshot.meta_for(&Role::Targets).unwrap().version, Some(4));
        let releases = Role::parse("targets/releases").unwrap();
        assert_eq!(snapshot.meta_for(&releases).unwrap().version, Some(2));
        assert!(snapshot.meta_for(&Role::Root).is_none());
    }
}
