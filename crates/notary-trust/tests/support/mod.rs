//! In-memory signed trust repository for resolver tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use notary_trust::{InMemoryFetcher, Role, TrustAnchor, TrustConfig, TrustResolver, TufKey};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::SigningKey;
use pkcs8::{EncodePublicKey, LineEnding};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Trust repository (GUN) of [`IMAGE`].
pub const REPO: &str = "docker.io/acme/app";

pub const IMAGE: &str = "acme/app";

pub const FAR_FUTURE: &str = "2099-01-01T00:00:00Z";

pub const LONG_AGO: &str = "2000-01-01T00:00:00Z";

/// A freshly generated ECDSA P-256 key.
pub struct Key {
    pub signing: SigningKey,
    pub tuf: TufKey,
    pub id: String,
}

impl Key {
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut rand::thread_rng());
        let der = signing
            .verifying_key()
            .to_public_key_der()
            .expect("encode public key");
        let tuf = TufKey::new("ecdsa", BASE64.encode(der.as_bytes()));
        let id = tuf.key_id().expect("key id");
        Self { signing, tuf, id }
    }

    pub fn pem(&self) -> String {
        self.signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode pem")
    }
}

pub fn sha256_base64(bytes: &[u8]) -> String {
    BASE64.encode(&Sha256::digest(bytes)[..])
}

/// `sha256:<hex>` digest of a manifest.
pub fn digest_of(manifest: &[u8]) -> String {
    format!("sha256:{}", hex::encode(&Sha256::digest(manifest)[..]))
}

/// Wrap `signed` in an envelope signed by `keys`.
pub fn sign_document(signed: Value, keys: &[&Key]) -> Vec<u8> {
    let message = serde_jcs::to_string(&signed).expect("canonical json");
    let signatures: Vec<Value> = keys
        .iter()
        .map(|key| {
            let sig: p256::ecdsa::Signature = key.signing.sign(message.as_bytes());
            json!({"keyid": key.id, "method": "ecdsa", "sig": BASE64.encode(sig.to_bytes())})
        })
        .collect();
    serde_json::to_vec_pretty(&json!({"signed": signed, "signatures": signatures}))
        .expect("serialize envelope")
}

fn file_meta(bytes: &[u8], version: Option<u64>) -> Value {
    let mut meta = json!({
        "hashes": {"sha256": sha256_base64(bytes)},
        "length": bytes.len()
    });
    if let Some(version) = version {
        meta["version"] = json!(version);
    }
    meta
}

/// A targets or delegated targets role.
pub struct TargetsRole {
    pub key: Key,
    pub targets: Map<String, Value>,
    pub delegations: Vec<DelegationEntry>,
}

impl TargetsRole {
    fn new() -> Self {
        Self {
            key: Key::generate(),
            targets: Map::new(),
            delegations: Vec::new(),
        }
    }
}

pub struct DelegationEntry {
    pub role: Role,
    pub paths: Vec<String>,
    pub terminating: bool,
}

/// Mutable description of a repository; [`TestRepo::publish`] signs it.
pub struct TestRepo {
    /// Three keys; all are pinned by [`TestRepo::resolver`].
    pub root_keys: Vec<Key>,
    pub root_threshold: u64,
    /// Indexes into `root_keys` that sign root.json.
    pub root_signers: Vec<usize>,
    pub snapshot_key: Key,
    pub timestamp_key: Key,
    pub roles: BTreeMap<Role, TargetsRole>,
    pub versions: BTreeMap<Role, u64>,
    pub expires: BTreeMap<Role, String>,
    pub fetcher: InMemoryFetcher,
}

impl TestRepo {
    pub fn new() -> Self {
        Self {
            root_keys: (0..3).map(|_| Key::generate()).collect(),
            root_threshold: 2,
            root_signers: vec![0, 1],
            snapshot_key: Key::generate(),
            timestamp_key: Key::generate(),
            roles: BTreeMap::from([(Role::Targets, TargetsRole::new())]),
            versions: BTreeMap::new(),
            expires: BTreeMap::new(),
            fetcher: InMemoryFetcher::new(),
        }
    }

    pub fn version(&self, role: &Role) -> u64 {
        self.versions.get(role).copied().unwrap_or(1)
    }

    pub fn set_version(&mut self, role: Role, version: u64) {
        self.versions.insert(role, version);
    }

    pub fn set_expires(&mut self, role: Role, expires: &str) {
        self.expires.insert(role, expires.to_string());
    }

    fn expiry(&self, role: &Role) -> String {
        self.expires
            .get(role)
            .cloned()
            .unwrap_or_else(|| FAR_FUTURE.to_string())
    }

    /// Sign `tag` -> `manifest` in `role`.
    pub fn sign_tag(&mut self, role: &Role, tag: &str, manifest: &[u8]) {
        let entry = json!({
            "hashes": {"sha256": sha256_base64(manifest)},
            "length": manifest.len()
        });
        self.role_mut(role).targets.insert(tag.to_string(), entry);
    }

    /// Point `tag` in `role` at the delegated role `child`.
    pub fn point(&mut self, role: &Role, tag: &str, child: &Role) {
        let entry = json!({"delegation": child.to_string()});
        self.role_mut(role).targets.insert(tag.to_string(), entry);
    }

    /// Delegate `paths` from `parent` to `targets/<child>`, creating the child
    /// role if needed.
    pub fn delegate(&mut self, parent: &Role, child: &str, paths: &[&str], terminating: bool) -> Role {
        let child = Role::delegated(child).expect("valid delegate name");
        self.roles.entry(child.clone()).or_insert_with(TargetsRole::new);
        self.role_mut(parent).delegations.push(DelegationEntry {
            role: child.clone(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            terminating,
        });
        child
    }

    fn role_mut(&mut self, role: &Role) -> &mut TargetsRole {
        self.roles.get_mut(role).expect("role exists in test repo")
    }

    /// Sign every document.
    pub fn build(&self) -> BTreeMap<Role, Vec<u8>> {
        let mut docs = BTreeMap::new();

        let targets_key = &self.roles[&Role::Targets].key;
        let mut keys = Map::new();
        for key in self
            .root_keys
            .iter()
            .chain([&self.snapshot_key, &self.timestamp_key, targets_key])
        {
            keys.insert(key.id.clone(), json!(key.tuf));
        }
        let root_ids: Vec<&str> = self.root_keys.iter().map(|k| k.id.as_str()).collect();
        let root = json!({
            "_type": "Root",
            "version": self.version(&Role::Root),
            "expires": self.expiry(&Role::Root),
            "consistent_snapshot": false,
            "keys": keys,
            "roles": {
                "root": {"keyids": root_ids, "threshold": self.root_threshold},
                "snapshot": {"keyids": [self.snapshot_key.id], "threshold": 1},
                "timestamp": {"keyids": [self.timestamp_key.id], "threshold": 1},
                "targets": {"keyids": [targets_key.id], "threshold": 1}
            }
        });
        let signers: Vec<&Key> = self
            .root_signers
            .iter()
            .map(|&i| &self.root_keys[i])
            .collect();
        docs.insert(Role::Root, sign_document(root, &signers));

        for (role, entry) in &self.roles {
            let mut signed = json!({
                "_type": "Targets",
                "version": self.version(role),
                "expires": self.expiry(role),
                "targets": entry.targets
            });
            if !entry.delegations.is_empty() {
                let mut keys = Map::new();
                let mut roles = Vec::new();
                for delegation in &entry.delegations {
                    let child = &self.roles[&delegation.role].key;
                    keys.insert(child.id.clone(), json!(child.tuf));
                    roles.push(json!({
                        "name": delegation.role.to_string(),
                        "keyids": [child.id],
                        "threshold": 1,
                        "paths": delegation.paths,
                        "terminating": delegation.terminating
                    }));
                }
                signed["delegations"] = json!({"keys": keys, "roles": roles});
            }
            docs.insert(role.clone(), sign_document(signed, &[&entry.key]));
        }

        let mut meta = Map::new();
        meta.insert("root".to_string(), file_meta(&docs[&Role::Root], None));
        for role in self.roles.keys() {
            meta.insert(role.to_string(), file_meta(&docs[role], Some(self.version(role))));
        }
        let snapshot = sign_document(
            json!({
                "_type": "Snapshot",
                "version": self.version(&Role::Snapshot),
                "expires": self.expiry(&Role::Snapshot),
                "meta": meta
            }),
            &[&self.snapshot_key],
        );

        let timestamp = sign_document(
            json!({
                "_type": "Timestamp",
                "version": self.version(&Role::Timestamp),
                "expires": self.expiry(&Role::Timestamp),
                "meta": {"snapshot": file_meta(&snapshot, Some(self.version(&Role::Snapshot)))}
            }),
            &[&self.timestamp_key],
        );

        docs.insert(Role::Snapshot, snapshot);
        docs.insert(Role::Timestamp, timestamp);
        docs
    }

    /// Sign every document and serve it from `fetcher`.
    pub async fn publish(&self) {
        for (role, bytes) in self.build() {
            self.fetcher.insert(REPO, role, bytes).await;
        }
    }

    /// Anchor pinning all three root keys.
    pub fn anchor(&self, threshold: u64) -> TrustAnchor {
        TrustAnchor::with_threshold(self.root_keys.iter().map(Key::pem).collect(), threshold)
    }

    /// Resolver pinning all three root keys with a threshold of two.
    pub fn resolver(&self) -> TrustResolver {
        self.resolver_with(TrustConfig::new(self.anchor(2)))
    }

    pub fn resolver_with(&self, config: TrustConfig) -> TrustResolver {
        TrustResolver::new(&config, self.fetcher.clone()).expect("build resolver")
    }
}
