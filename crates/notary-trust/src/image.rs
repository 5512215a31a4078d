//! Image reference parsing.
//!
//! Supports the usual container reference forms:
//! - `nginx` → `docker.io/library/nginx:latest`
//! - `myorg/app:v1.0` → `docker.io/myorg/app:v1.0`
//! - `registry.example.com:5000/team/app:v2`
//! - `myorg/app@sha256:abc...` → pinned by digest
//! - `myorg/app:v1.0@sha256:abc...` → tag that must resolve to that digest

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::digest::normalize_digest;
use crate::error::{TrustError, TrustResult};

/// Registry used when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag used when a reference names neither a tag nor a digest.
pub const DEFAULT_TAG: &str = "latest";

const DOCKER_HUB_ALIASES: &[&str] = &["index.docker.io", "registry-1.docker.io"];

lazy_static! {
    static ref PATH_COMPONENT: Regex =
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("valid path component regex");
    static ref TAG: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag regex");
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub registry: String,

    pub repository: String,

    pub tag: Option<String>,

    /// Pinned `sha256:<hex>` manifest digest, lowercase.
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse a reference, defaulting the registry to Docker Hub.
    ///
    /// # Examples
    ///
    /// ```
    /// use notary_trust::ImageRef;
    ///
    /// let image = ImageRef::parse("nginx").unwrap();
    /// assert_eq!(image.gun(), "docker.io/library/nginx");
    /// assert_eq!(image.tag.as_deref(), Some("latest"));
    ///
    /// let image = ImageRef::parse("ghcr.io/acme/api:v1.0").unwrap();
    /// assert_eq!(image.registry, "ghcr.io");
    /// assert_eq!(image.repository, "acme/api");
    /// ```
    pub fn parse(reference: &str) -> TrustResult<Self> {
        Self::parse_with_default(reference, DEFAULT_REGISTRY)
    }

    /// Parse a reference, using `default_registry` when none is named.
    pub fn parse_with_default(reference: &str, default_registry: &str) -> TrustResult<Self> {
        let reference = reference.trim();
        let invalid = |reason: &str| TrustError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (name_and_tag, digest) = match reference.split_once('@') {
            Some((rest, digest)) => {
                let digest = normalize_digest(digest)
                    .ok_or_else(|| invalid("digest must be sha256: followed by 64 hex characters"))?;
                (rest, Some(digest))
            }
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a
        // registry port.
        let last_slash = name_and_tag.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name_and_tag[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name_and_tag[..split], Some(&name_and_tag[split + 1..]))
            }
            None => (name_and_tag, None),
        };

        if let Some(tag) = tag {
            if !TAG.is_match(tag) {
                return Err(invalid("invalid tag"));
            }
        }

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if is_registry_host(host) => (host.to_string(), rest.to_string()),
            _ => (default_registry.to_string(), name.to_string()),
        };

        if repository.is_empty() || !repository.split('/').all(|c| PATH_COMPONENT.is_match(c)) {
            return Err(invalid("invalid repository name"));
        }

        let registry = if DOCKER_HUB_ALIASES.contains(&registry.as_str()) {
            DEFAULT_REGISTRY.to_string()
        } else {
            registry
        };

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        let tag = match (tag, &digest) {
            (Some(tag), _) => Some(tag.to_string()),
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (None, Some(_)) => None,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Globally unique name of the trust repository (`registry/repository`).
    pub fn gun(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gun())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageRef {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> String {
        format!("sha256:{}", "ab".repeat(32))
    }

    #[test]
    fn test_docker_hub_short_names() {
        let image = ImageRef::parse("nginx").unwrap();
        assert_eq!(image.registry, "docker.io");
        assert_eq!(image.repository, "library/nginx");
        assert_eq!(image.tag.as_deref(), Some("latest"));
        assert_eq!(image.digest, None);
        assert_eq!(image.to_string(), "docker.io/library/nginx:latest");

        let image = ImageRef::parse("myorg/app:v1.0").unwrap();
        assert_eq!(image.gun(), "docker.io/myorg/app");
        assert_eq!(image.tag.as_deref(), Some("v1.0"));

        let image = ImageRef::parse("index.docker.io/redis:7").unwrap();
        assert_eq!(image.gun(), "docker.io/library/redis");
    }

    #[test]
    fn test_registry_with_port() {
        let image = ImageRef::parse("registry.example.com:5000/team/app:v2").unwrap();
        assert_eq!(image.registry, "registry.example.com:5000");
        assert_eq!(image.repository, "team/app");
        assert_eq!(image.tag.as_deref(), Some("v2"));

        let image = ImageRef::parse("localhost:5000/app").unwrap();
        assert_eq!(image.registry, "localhost:5000");
        assert_eq!(image.repository, "app");
        assert_eq!(image.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn test_digest_references() {
        let pinned = ImageRef::parse(&format!("myorg/app@{}", digest())).unwrap();
        assert_eq!(pinned.tag, None);
        assert_eq!(pinned.digest, Some(digest()));

        let both = ImageRef::parse(&format!("myorg/app:v1@sha256:{}", "AB".repeat(32))).unwrap();
        assert_eq!(both.tag.as_deref(), Some("v1"));
        assert_eq!(both.digest, Some(digest()));
    }

    #[test]
    fn test_custom_default_registry() {
        let image = ImageRef::parse_with_default("team/app:v1", "notary.internal").unwrap();
        assert_eq!(image.gun(), "notary.internal/team/app");

        let image = ImageRef::parse_with_default("app", "notary.internal").unwrap();
        assert_eq!(image.repository, "app");
    }

    #[test]
    fn test_invalid_references() {
        for reference in [
            "",
            "   ",
            "UPPER/case",
            "app:",
            "app:bad tag",
            "app@sha256:abc",
            "app@md5:abcd",
            "docker.io/",
            "a//b",
        ] {
            assert!(
                matches!(
                    ImageRef::parse(reference),
                    Err(TrustError::InvalidReference { .. })
                ),
                "expected InvalidReference for {:?}",
                reference
            );
        }
    }
}
