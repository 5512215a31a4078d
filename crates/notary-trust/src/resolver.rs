//! Trust resolution.
//!
//! Resolves an image reference to a signed manifest digest by walking the
//! trust hierarchy of its repository:
//!
//! 1. Root, checked against the pinned trust anchor and its own `root` role
//! 2. Snapshot and timestamp, fetched together and cross-checked
//! 3. Targets, then delegated targets roles until the tag is found
//!
//! Each step moves the session's `ResolutionState` forward. Any failure
//! moves it to `Failed` and ends the resolution; nothing is recorded in the
//! version store unless the whole walk succeeds.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::TrustConfig;
use crate::crypto::{DefaultVerifier, SignatureVerifier};
use crate::error::{TrustError, TrustResult};
use crate::fetch::{fetch_with_timeout, MetadataFetcher};
use crate::freshness::{check_freshness, check_monotonic, VersionStore};
use crate::image::ImageRef;
use crate::keys::PublicKey;
use crate::keystore::KeyStore;
use crate::metadata::{
    DelegatedRole, RootDocument, Snapshot, SnapshotDocument, TargetEntry, TargetFile,
    TargetsDocument, TimestampDocument,
};
use crate::role::Role;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// The reference that was resolved.
    pub image: ImageRef,

    /// Signed `sha256:<hex>` manifest digest.
    pub verified_digest: String,

    /// Tag the digest is signed under.
    pub tag: String,

    /// Signed manifest length in bytes.
    pub length: u64,

    /// Whether every document on the chain met its signature threshold.
    pub satisfied_threshold: bool,

    /// Roles walked, from root to the role that signed the digest.
    pub role_chain: Vec<Role>,
}

/// Progress of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolutionState {
    Start,
    RootVerified,
    SnapshotVerified,
    TimestampVerified,
    TargetsResolved,
    Done,
    Failed(String),
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::RootVerified => write!(f, "root-verified"),
            Self::SnapshotVerified => write!(f, "snapshot-verified"),
            Self::TimestampVerified => write!(f, "timestamp-verified"),
            Self::TargetsResolved => write!(f, "targets-resolved"),
            Self::Done => write!(f, "done"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Resolves image references against Notary trust metadata.
pub struct TrustResolver {
    fetcher: Arc<dyn MetadataFetcher>,
    verifier: Arc<dyn SignatureVerifier>,
    anchor_keys: Vec<PublicKey>,
    anchor_threshold: usize,
    fetch_timeout: Duration,
    max_delegation_depth: usize,
    default_registry: String,
    versions: Option<Arc<dyn VersionStore>>,
}

impl fmt::Debug for TrustResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustResolver")
            .field("anchor_keys", &self.anchor_keys.len())
            .field("anchor_threshold", &self.anchor_threshold)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("max_delegation_depth", &self.max_delegation_depth)
            .field("default_registry", &self.default_registry)
            .finish_non_exhaustive()
    }
}

impl TrustResolver {
    /// Create a resolver from configuration.
    ///
    /// Fails if the trust anchor keys cannot be loaded or its threshold is
    /// out of range.
    pub fn new<F>(config: &TrustConfig, fetcher: F) -> TrustResult<Self>
    where
        F: MetadataFetcher + 'static,
    {
        let (anchor_keys, anchor_threshold) = config.trust_anchor.load()?;

        Ok(Self {
            fetcher: Arc::new(fetcher),
            verifier: Arc::new(DefaultVerifier),
            anchor_keys,
            anchor_threshold,
            fetch_timeout: config.fetch_timeout(),
            max_delegation_depth: config.max_delegation_depth,
            default_registry: config.default_registry.clone(),
            versions: None,
        })
    }

    /// Use a different signature verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Persist last-seen versions across resolutions.
    pub fn with_version_store(mut self, store: Arc<dyn VersionStore>) -> Self {
        self.versions = Some(store);
        self
    }

    /// Override the per-document fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolve an image reference to its trusted digest.
    pub async fn resolve_trusted_digest(&self, reference: &str) -> TrustResult<VerificationResult> {
        let image = ImageRef::parse_with_default(reference, &self.default_registry)?;
        self.resolve_image(&image).await
    }

    /// Resolve a parsed image reference.
    pub async fn resolve_image(&self, image: &ImageRef) -> TrustResult<VerificationResult> {
        self.run(image, &[]).await
    }

    /// Resolve a reference, requiring each of `required` to sign it.
    ///
    /// Every required role must be reachable from `targets`, be delegated
    /// paths covering the tag, sign the tag itself, and agree on the digest.
    pub async fn resolve_with_delegations(
        &self,
        reference: &str,
        required: &[Role],
    ) -> TrustResult<VerificationResult> {
        let image = ImageRef::parse_with_default(reference, &self.default_registry)?;
        self.resolve_image_with_delegations(&image, required).await
    }

    /// Parsed-reference form of [`resolve_with_delegations`](Self::resolve_with_delegations).
    pub async fn resolve_image_with_delegations(
        &self,
        image: &ImageRef,
        required: &[Role],
    ) -> TrustResult<VerificationResult> {
        if let Some(role) = required.iter().find(|r| !r.is_delegated()) {
            return Err(TrustError::Config {
                message: format!("required delegation {} is not a targets/<name> role", role),
            });
        }
        self.run(image, required).await
    }

    async fn run(&self, image: &ImageRef, required: &[Role]) -> TrustResult<VerificationResult> {
        let mut session = Session::new(self, image.gun());
        debug!(image = %image, repo = %session.repository, "resolving trust");

        match session.resolve(image, required).await {
            Ok(result) => {
                session.commit().await;
                info!(
                    image = %image,
                    digest = %result.verified_digest,
                    signer = %result.role_chain.last().map(ToString::to_string).unwrap_or_default(),
                    "resolved trusted digest"
                );
                Ok(result)
            }
            Err(e) => {
                session.fail(&e);
                Err(e)
            }
        }
    }
}

/// A signed target entry and the targets roles that led to it.
#[derive(Debug)]
struct SignedTarget {
    tag: String,
    file: TargetFile,
    chain: Vec<Role>,
}

enum Search {
    Found(SignedTarget),
    NotFound,
    /// A terminating delegation was consulted without success.
    Terminated,
}

/// State of one resolution.
struct Session<'r> {
    resolver: &'r TrustResolver,
    repository: String,
    state: ResolutionState,
    now: DateTime<Utc>,
    keys: KeyStore,
    snapshot: Option<Snapshot>,
    loaded: HashMap<Role, Arc<TargetsDocument>>,
    seen: Vec<(Role, u64)>,
    depth_exhausted: bool,
}

impl<'r> Session<'r> {
    fn new(resolver: &'r TrustResolver, repository: String) -> Self {
        Self {
            resolver,
            repository,
            state: ResolutionState::Start,
            now: Utc::now(),
            keys: KeyStore::new(),
            snapshot: None,
            loaded: HashMap::new(),
            seen: Vec::new(),
            depth_exhausted: false,
        }
    }

    fn advance(&mut self, next: ResolutionState) {
        debug!(repo = %self.repository, from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn fail(&mut self, error: &TrustError) {
        warn!(
            repo = %self.repository,
            state = %self.state,
            role = %error.role().map(ToString::to_string).unwrap_or_default(),
            error = %error,
            "trust resolution failed"
        );
        self.state = ResolutionState::Failed(error.to_string());
    }

    /// Record the versions seen during a successful resolution.
    async fn commit(&self) {
        let Some(store) = &self.resolver.versions else {
            return;
        };
        for (role, version) in &self.seen {
            store.record_version(&self.repository, role, *version).await;
        }
    }

    fn verifier(&self) -> &dyn SignatureVerifier {
        self.resolver.verifier.as_ref()
    }

    async fn fetch(&self, role: &Role) -> TrustResult<Vec<u8>> {
        fetch_with_timeout(
            self.resolver.fetcher.as_ref(),
            role,
            &self.repository,
            self.resolver.fetch_timeout,
        )
        .await
    }

    async fn last_seen(&self, role: &Role) -> Option<u64> {
        match &self.resolver.versions {
            Some(store) => store.last_version(&self.repository, role).await,
            None => None,
        }
    }

    async fn check_version_and_expiry(
        &self,
        role: &Role,
        version: u64,
        expires: DateTime<Utc>,
    ) -> TrustResult<()> {
        check_monotonic(role, version, self.last_seen(role).await)?;
        check_freshness(role, expires, self.now)
    }

    async fn resolve(
        &mut self,
        image: &ImageRef,
        required: &[Role],
    ) -> TrustResult<VerificationResult> {
        let root = self.verify_root().await?;
        self.advance(ResolutionState::RootVerified);

        let (snapshot_raw, timestamp_raw) = tokio::try_join!(
            self.fetch(&Role::Snapshot),
            self.fetch(&Role::Timestamp),
        )?;

        let snapshot = self.verify_snapshot(&snapshot_raw, &root).await?;
        self.advance(ResolutionState::SnapshotVerified);

        self.verify_timestamp(&timestamp_raw, &snapshot).await?;
        self.advance(ResolutionState::TimestampVerified);

        let targets = self.load_targets(&Role::Targets).await?;
        let signed = if required.is_empty() {
            self.find(image, targets).await?
        } else {
            self.find_required(image, targets, required).await?
        };
        self.advance(ResolutionState::TargetsResolved);

        let signer = signed.chain.last().cloned().unwrap_or(Role::Targets);
        let verified_digest = signed.file.digest().ok_or_else(|| TrustError::Integrity {
            role: signer.clone(),
            reason: format!("entry for {} has no valid sha256 hash", signed.tag),
        })?;

        if let Some(pinned) = &image.digest {
            if pinned != &verified_digest {
                return Err(TrustError::Integrity {
                    role: signer,
                    reason: format!(
                        "{} is signed as {}, not the pinned {}",
                        signed.tag, verified_digest, pinned
                    ),
                });
            }
        }

        let mut role_chain = vec![Role::Root, Role::Snapshot, Role::Timestamp];
        role_chain.extend(signed.chain);
        self.advance(ResolutionState::Done);

        Ok(VerificationResult {
            image: image.clone(),
            verified_digest,
            tag: signed.tag,
            length: signed.file.length,
            satisfied_threshold: true,
            role_chain,
        })
    }

    async fn verify_root(&mut self) -> TrustResult<RootDocument> {
        let raw = self.fetch(&Role::Root).await?;
        let root = RootDocument::from_slice(&Role::Root, &raw)?;

        let anchored = self
            .resolver
            .anchor_keys
            .iter()
            .filter(|key| root.is_signed_by(key, self.verifier()))
            .count();
        if anchored < self.resolver.anchor_threshold {
            return Err(TrustError::TrustChain {
                role: Role::Root,
                reason: format!(
                    "{} of {} required pinned keys signed the root",
                    anchored, self.resolver.anchor_threshold
                ),
            });
        }

        let root_keys = root.signed().role_keys(&Role::Root)?;
        root.verify_threshold(&root_keys, self.verifier())?;
        self.check_version_and_expiry(&Role::Root, root.version(), root.expires())
            .await?;

        let mut keys = KeyStore::new().with_role(Role::Root, root_keys);
        for role in [Role::Snapshot, Role::Timestamp, Role::Targets] {
            let role_keys = root.signed().role_keys(&role)?;
            keys = keys.with_role(role, role_keys);
        }
        self.keys = keys;
        self.seen.push((Role::Root, root.version()));

        debug!(repo = %self.repository, version = root.version(), anchored, "root verified");
        Ok(root)
    }

    async fn verify_snapshot(
        &mut self,
        raw: &[u8],
        root: &RootDocument,
    ) -> TrustResult<SnapshotDocument> {
        let snapshot = SnapshotDocument::from_slice(&Role::Snapshot, raw)?;
        snapshot.verify_threshold(self.keys.require(&Role::Snapshot)?, self.verifier())?;
        self.check_version_and_expiry(&Role::Snapshot, snapshot.version(), snapshot.expires())
            .await?;

        if let Some(root_meta) = snapshot.signed().meta_for(&Role::Root) {
            root_meta.check(&Role::Root, root.raw_bytes(), root.version())?;
        }

        self.snapshot = Some(snapshot.signed().clone());
        self.seen.push((Role::Snapshot, snapshot.version()));

        debug!(repo = %self.repository, version = snapshot.version(), "snapshot verified");
        Ok(snapshot)
    }

    async fn verify_timestamp(&mut self, raw: &[u8], snapshot: &SnapshotDocument) -> TrustResult<()> {
        let timestamp = TimestampDocument::from_slice(&Role::Timestamp, raw)?;
        timestamp.verify_threshold(self.keys.require(&Role::Timestamp)?, self.verifier())?;
        self.check_version_and_expiry(&Role::Timestamp, timestamp.version(), timestamp.expires())
            .await?;

        let declared = timestamp
            .signed()
            .snapshot_meta()
            .ok_or_else(|| TrustError::Integrity {
                role: Role::Snapshot,
                reason: "timestamp does not describe the snapshot".to_string(),
            })?;
        declared.check(&Role::Snapshot, snapshot.raw_bytes(), snapshot.version())?;

        self.seen.push((Role::Timestamp, timestamp.version()));

        debug!(repo = %self.repository, version = timestamp.version(), "timestamp verified");
        Ok(())
    }

    /// Fetch and verify a targets document whose keys are already known.
    async fn load_targets(&mut self, role: &Role) -> TrustResult<Arc<TargetsDocument>> {
        if let Some(doc) = self.loaded.get(role) {
            return Ok(doc.clone());
        }

        let raw = self.fetch(role).await?;
        let doc = TargetsDocument::from_slice(role, &raw)?;
        doc.verify_threshold(self.keys.require(role)?, self.verifier())?;
        self.check_version_and_expiry(role, doc.version(), doc.expires())
            .await?;

        let declared = self
            .snapshot
            .as_ref()
            .and_then(|s| s.meta_for(role))
            .ok_or_else(|| TrustError::Integrity {
                role: role.clone(),
                reason: "not listed in snapshot".to_string(),
            })?;
        declared.check(role, doc.raw_bytes(), doc.version())?;

        self.seen.push((role.clone(), doc.version()));
        debug!(repo = %self.repository, role = %role, version = doc.version(), "targets verified");

        let doc = Arc::new(doc);
        self.loaded.insert(role.clone(), doc.clone());
        Ok(doc)
    }

    /// Bind the delegate's keys as declared by `parent`, then load it.
    async fn enter_delegation(
        &mut self,
        parent: &TargetsDocument,
        delegation: &DelegatedRole,
    ) -> TrustResult<Arc<TargetsDocument>> {
        let keys = parent.signed().delegation_keys(delegation)?;
        self.keys = self.keys.with_role(delegation.name.clone(), keys);
        self.load_targets(&delegation.name).await
    }

    fn unresolved(&self, target: &str) -> TrustError {
        let reason = if self.depth_exhausted {
            format!(
                "not found within {} levels of delegation",
                self.resolver.max_delegation_depth
            )
        } else {
            "not signed by any trusted targets role".to_string()
        };
        TrustError::UnresolvedTrust {
            target: target.to_string(),
            reason,
        }
    }

    async fn find(
        &mut self,
        image: &ImageRef,
        targets: Arc<TargetsDocument>,
    ) -> TrustResult<SignedTarget> {
        let mut visited = HashSet::from([Role::Targets]);

        if let Some(tag) = &image.tag {
            return match self.lookup(targets, tag, 0, &mut visited).await? {
                Search::Found(signed) => Ok(signed),
                Search::NotFound | Search::Terminated => Err(self.unresolved(tag)),
            };
        }

        let digest = image.digest.as_deref().unwrap_or_default();
        self.lookup_digest(targets, digest, Vec::new(), 0, &mut visited)
            .await?
            .ok_or_else(|| self.unresolved(digest))
    }

    /// Pre-order search for `tag` starting at `doc`.
    fn lookup<'a>(
        &'a mut self,
        doc: Arc<TargetsDocument>,
        tag: &'a str,
        depth: usize,
        visited: &'a mut HashSet<Role>,
    ) -> BoxFuture<'a, TrustResult<Search>> {
        Box::pin(async move {
            match doc.signed().entry(tag) {
                Some(TargetEntry::Artifact(file)) => {
                    return Ok(Search::Found(SignedTarget {
                        tag: tag.to_string(),
                        file: file.clone(),
                        chain: vec![doc.role().clone()],
                    }));
                }
                Some(TargetEntry::Delegation { delegation: child }) => {
                    let declared = doc.signed().delegation(child).cloned().ok_or_else(|| {
                        TrustError::TrustChain {
                            role: child.clone(),
                            reason: format!("{} points {} at an undeclared delegation", doc.role(), tag),
                        }
                    })?;
                    if !declared.covers(tag) {
                        return Err(TrustError::DelegationScope {
                            role: child.clone(),
                            tag: tag.to_string(),
                        });
                    }
                    if visited.contains(child) {
                        return Err(TrustError::UnresolvedTrust {
                            target: tag.to_string(),
                            reason: format!("delegation cycle through {}", child),
                        });
                    }
                    if depth >= self.resolver.max_delegation_depth {
                        self.depth_exhausted = true;
                        return Err(self.unresolved(tag));
                    }
                    return self.descend(&doc, &declared, tag, depth, visited).await;
                }
                None => {}
            }

            for delegation in doc.signed().delegated_roles() {
                if !delegation.covers(tag) {
                    debug!(role = %delegation.name, tag, "delegation not scoped for tag, skipping");
                    continue;
                }
                if visited.contains(&delegation.name) {
                    warn!(role = %delegation.name, "delegation already visited, skipping");
                    if delegation.terminating {
                        return Ok(Search::Terminated);
                    }
                    continue;
                }
                if depth >= self.resolver.max_delegation_depth {
                    warn!(role = %delegation.name, depth, "delegation depth limit reached");
                    self.depth_exhausted = true;
                    break;
                }

                match self.descend(&doc, delegation, tag, depth, visited).await? {
                    Search::Found(signed) => return Ok(Search::Found(signed)),
                    Search::Terminated => return Ok(Search::Terminated),
                    Search::NotFound if delegation.terminating => return Ok(Search::Terminated),
                    Search::NotFound => {}
                }
            }

            Ok(Search::NotFound)
        })
    }

    async fn descend(
        &mut self,
        parent: &TargetsDocument,
        delegation: &DelegatedRole,
        tag: &str,
        depth: usize,
        visited: &mut HashSet<Role>,
    ) -> TrustResult<Search> {
        visited.insert(delegation.name.clone());
        let child = self.enter_delegation(parent, delegation).await?;

        let mut search = self.lookup(child, tag, depth + 1, visited).await?;
        if let Search::Found(signed) = &mut search {
            signed.chain.insert(0, parent.role().clone());
        }
        Ok(search)
    }

    /// Search the tree for a tag signed with `digest`.
    ///
    /// `scope` holds the delegations on the path to `doc`; a tag only counts
    /// if all of them cover it.
    fn lookup_digest<'a>(
        &'a mut self,
        doc: Arc<TargetsDocument>,
        digest: &'a str,
        scope: Vec<DelegatedRole>,
        depth: usize,
        visited: &'a mut HashSet<Role>,
    ) -> BoxFuture<'a, TrustResult<Option<SignedTarget>>> {
        Box::pin(async move {
            for tag in doc.signed().tags_with_digest(digest) {
                if !scope.iter().all(|d| d.covers(tag)) {
                    debug!(role = %doc.role(), tag, "digest match outside delegated scope, skipping");
                    continue;
                }
                if let Some(TargetEntry::Artifact(file)) = doc.signed().entry(tag) {
                    return Ok(Some(SignedTarget {
                        tag: tag.to_string(),
                        file: file.clone(),
                        chain: vec![doc.role().clone()],
                    }));
                }
            }

            for delegation in doc.signed().delegated_roles() {
                if visited.contains(&delegation.name) {
                    continue;
                }
                if depth >= self.resolver.max_delegation_depth {
                    self.depth_exhausted = true;
                    break;
                }
                visited.insert(delegation.name.clone());

                let child = self.enter_delegation(&doc, delegation).await?;
                let mut child_scope = scope.clone();
                child_scope.push(delegation.clone());

                if let Some(mut signed) = self
                    .lookup_digest(child, digest, child_scope, depth + 1, visited)
                    .await?
                {
                    signed.chain.insert(0, doc.role().clone());
                    return Ok(Some(signed));
                }
            }

            Ok(None)
        })
    }

    /// Find the document of `target` and the delegations leading to it.
    fn locate<'a>(
        &'a mut self,
        doc: Arc<TargetsDocument>,
        target: &'a Role,
        depth: usize,
        visited: &'a mut HashSet<Role>,
    ) -> BoxFuture<'a, TrustResult<Option<(Vec<DelegatedRole>, Arc<TargetsDocument>)>>> {
        Box::pin(async move {
            if depth >= self.resolver.max_delegation_depth {
                self.depth_exhausted = true;
                return Ok(None);
            }

            if let Some(declared) = doc.signed().delegation(target) {
                let found = self.enter_delegation(&doc, declared).await?;
                return Ok(Some((vec![declared.clone()], found)));
            }

            for delegation in doc.signed().delegated_roles() {
                if visited.contains(&delegation.name) {
                    continue;
                }
                visited.insert(delegation.name.clone());

                let child = self.enter_delegation(&doc, delegation).await?;
                if let Some((mut path, found)) =
                    self.locate(child, target, depth + 1, visited).await?
                {
                    path.insert(0, delegation.clone());
                    return Ok(Some((path, found)));
                }
            }

            Ok(None)
        })
    }

    async fn find_required(
        &mut self,
        image: &ImageRef,
        targets: Arc<TargetsDocument>,
        required: &[Role],
    ) -> TrustResult<SignedTarget> {
        let target = image
            .tag
            .clone()
            .or_else(|| image.digest.clone())
            .unwrap_or_default();

        let mut agreed: Option<(Role, String, SignedTarget)> = None;
        let mut walked: Vec<Role> = vec![Role::Targets];

        for role in required {
            let mut visited = HashSet::from([Role::Targets]);
            let (path, doc) = self
                .locate(targets.clone(), role, 0, &mut visited)
                .await?
                .ok_or_else(|| TrustError::UnresolvedTrust {
                    target: target.clone(),
                    reason: format!("required delegation {} not found", role),
                })?;

            let signed = match &image.tag {
                Some(tag) => {
                    if let Some(outside) = path.iter().find(|d| !d.covers(tag)) {
                        return Err(TrustError::DelegationScope {
                            role: outside.name.clone(),
                            tag: tag.clone(),
                        });
                    }
                    match doc.signed().entry(tag) {
                        Some(TargetEntry::Artifact(file)) => SignedTarget {
                            tag: tag.clone(),
                            file: file.clone(),
                            chain: Vec::new(),
                        },
                        _ => {
                            return Err(TrustError::UnresolvedTrust {
                                target: target.clone(),
                                reason: format!("required delegation {} does not sign it", role),
                            })
                        }
                    }
                }
                None => {
                    let digest = image.digest.as_deref().unwrap_or_default();
                    let tag = doc
                        .signed()
                        .tags_with_digest(digest)
                        .find(|tag| path.iter().all(|d| d.covers(tag)))
                        .map(str::to_string)
                        .ok_or_else(|| TrustError::UnresolvedTrust {
                            target: target.clone(),
                            reason: format!("required delegation {} does not sign it", role),
                        })?;
                    let file = match doc.signed().entry(&tag) {
                        Some(TargetEntry::Artifact(file)) => file.clone(),
                        _ => {
                            return Err(TrustError::UnresolvedTrust {
                                target: target.clone(),
                                reason: format!("required delegation {} does not sign it", role),
                            })
                        }
                    };
                    SignedTarget {
                        tag,
                        file,
                        chain: Vec::new(),
                    }
                }
            };

            let digest = signed.file.digest().ok_or_else(|| TrustError::Integrity {
                role: role.clone(),
                reason: format!("entry for {} has no valid sha256 hash", signed.tag),
            })?;

            if let Some((first_role, first_digest, _)) = &agreed {
                if first_digest != &digest {
                    return Err(TrustError::Integrity {
                        role: role.clone(),
                        reason: format!(
                            "signs {} but {} signs {}",
                            digest, first_role, first_digest
                        ),
                    });
                }
            }

            for step in &path {
                if !walked.contains(&step.name) {
                    walked.push(step.name.clone());
                }
            }
            debug!(role = %role, digest = %digest, "required delegation signs target");

            if agreed.is_none() {
                agreed = Some((role.clone(), digest, signed));
            }
        }

        let (_, _, mut signed) = agreed.ok_or_else(|| self.unresolved(&target))?;
        signed.chain = walked;
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustAnchor;
    use crate::digest::{sha256_base64, sha256_hex};
    use crate::fetch::InMemoryFetcher;
    use crate::keys::test_keys::*;
    use crate::metadata::test_docs::sign;
    use serde_json::json;

    const REPO: &str = "docker.io/library/app";

    /// Single-key repository: one key signs every role.
    struct Fixture {
        key: p256::ecdsa::SigningKey,
        key_id: String,
        fetcher: InMemoryFetcher,
    }

    impl Fixture {
        fn new() -> Self {
            let key = ecdsa_signing_key();
            let key_id = ecdsa_tuf_key(&key).key_id().unwrap();
            Self {
                key,
                key_id,
                fetcher: InMemoryFetcher::new(),
            }
        }

        fn sign(&self, signed: serde_json::Value) -> Vec<u8> {
            sign(signed, &[(&self.key_id, &self.key)])
        }

        async fn publish(&self, targets: serde_json::Value) {
            let declaration = json!({"keyids": [self.key_id], "threshold": 1});
            let root = self.sign(json!({
                "_type": "Root",
                "version": 1,
                "expires": "2099-01-01T00:00:00Z",
                "consistent_snapshot": false,
                "keys": {self.key_id.clone(): ecdsa_tuf_key(&self.key)},
                "roles": {
                    "root": declaration,
                    "snapshot": declaration,
                    "timestamp": declaration,
                    "targets": declaration
                }
            }));
            let targets = self.sign(targets);
            let snapshot = self.sign(json!({
                "_type": "Snapshot",
                "version": 1,
                "expires": "2099-01-01T00:00:00Z",
                "meta": {
                    "root": {"hashes": {"sha256": sha256_base64(&root)}, "length": root.len()},
                    "targets": {"hashes": {"sha256": sha256_base64(&targets)}, "length": targets.len(), "version": 1}
                }
            }));
            let timestamp = self.sign(json!({
                "_type": "Timestamp",
                "version": 1,
                "expires": "2099-01-01T00:00:00Z",
                "meta": {"snapshot": {"hashes": {"sha256": sha256_base64(&snapshot)}, "length": snapshot.len(), "version": 1}}
            }));

            for (role, bytes) in [
                (Role::Root, root),
                (Role::Targets, targets),
                (Role::Snapshot, snapshot),
                (Role::Timestamp, timestamp),
            ] {
                self.fetcher.insert(REPO, role, bytes).await;
            }
        }

        fn resolver(&self) -> TrustResolver {
            let config = TrustConfig::new(TrustAnchor::single(ecdsa_pem(&self.key)));
            TrustResolver::new(&config, self.fetcher.clone()).unwrap()
        }
    }

    fn targets_with(entries: serde_json::Value) -> serde_json::Value {
        json!({
            "_type": "Targets",
            "version": 1,
            "expires": "2099-01-01T00:00:00Z",
            "targets": entries
        })
    }

    #[tokio::test]
    async fn test_resolves_tag_listed_in_targets() {
        let fixture = Fixture::new();
        fixture
            .publish(targets_with(json!({
                "v1": {"hashes": {"sha256": sha256_base64(b"manifest")}, "length": 8}
            })))
            .await;

        let result = fixture.resolver().resolve_trusted_digest("app:v1").await.unwrap();
        assert_eq!(result.verified_digest, format!("sha256:{}", sha256_hex(b"manifest")));
        assert_eq!(result.tag, "v1");
        assert_eq!(result.length, 8);
        assert!(result.satisfied_threshold);
        assert_eq!(
            result.role_chain,
            vec![Role::Root, Role::Snapshot, Role::Timestamp, Role::Targets]
        );
    }

    #[tokio::test]
    async fn test_digest_reference_finds_tag() {
        let fixture = Fixture::new();
        fixture
            .publish(targets_with(json!({
                "v1": {"hashes": {"sha256": sha256_base64(b"one")}, "length": 3},
                "v2": {"hashes": {"sha256": sha256_base64(b"two")}, "length": 3}
            })))
            .await;

        let reference = format!("app@sha256:{}", sha256_hex(b"two"));
        let result = fixture.resolver().resolve_trusted_digest(&reference).await.unwrap();
        assert_eq!(result.tag, "v2");

        let unknown = format!("app@sha256:{}", sha256_hex(b"three"));
        assert!(matches!(
            fixture.resolver().resolve_trusted_digest(&unknown).await,
            Err(TrustError::UnresolvedTrust { .. })
        ));
    }

    #[tokio::test]
    async fn test_pinned_digest_must_match_tag() {
        let fixture = Fixture::new();
        fixture
            .publish(targets_with(json!({
                "v1": {"hashes": {"sha256": sha256_base64(b"one")}, "length": 3}
            })))
            .await;

        let reference = format!("app:v1@sha256:{}", sha256_hex(b"other"));
        let err = fixture.resolver().resolve_trusted_digest(&reference).await.unwrap_err();
        assert!(matches!(err, TrustError::Integrity { role: Role::Targets, .. }));
    }

    #[tokio::test]
    async fn test_unknown_tag_is_unresolved() {
        let fixture = Fixture::new();
        fixture.publish(targets_with(json!({}))).await;

        let err = fixture.resolver().resolve_trusted_digest("app:v9").await.unwrap_err();
        match err {
            TrustError::UnresolvedTrust { target, .. } => assert_eq!(target, "v9"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_required_delegation_must_be_targets_child() {
        let fixture = Fixture::new();
        let err = fixture
            .resolver()
            .resolve_with_delegations("app:v1", &[Role::Targets])
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::Config { .. }));
    }

    #[test]
    fn test_failed_session_records_reason() {
        let fixture = Fixture::new();
        let resolver = fixture.resolver();
        let mut session = Session::new(&resolver, REPO.to_string());
        session.advance(ResolutionState::RootVerified);
        session.fail(&TrustError::Timeout {
            role: Role::Snapshot,
            after: Duration::from_secs(1),
        });
        match &session.state {
            ResolutionState::Failed(reason) => assert!(reason.contains("snapshot")),
            other => panic!("unexpected state: {}", other),
        }
    }
}
