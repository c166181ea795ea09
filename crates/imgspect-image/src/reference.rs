//! Image reference parsing.
//!
//! Accepts `<scheme>://<repository>[:<tag>|@<digest>]`:
//! - `registry://example.com/repo:v1`
//! - `docker://quay.io/coreos/kube-state-metrics@sha256:...`
//! - `registry://ubuntu` (registry `docker.io`, effective tag `latest`)

use crate::digest::Digest;
use crate::error::{InspectError, Result};
use crate::transport::Transport;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Registry used when the repository names none
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag used when the reference names neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

const OFFICIAL_REPO_PREFIX: &str = "library";

const MAX_REPOSITORY_LEN: usize = 255;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*(?::[0-9]+)?$",
    )
    .expect("domain pattern is valid")
});

static COMPONENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("component pattern is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid"));

/// A parsed, immutable image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    transport: Transport,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl ImageReference {
    /// Parse an image reference string like `registry://ghcr.io/org/app:v1`
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| InspectError::invalid_reference(input, reason);

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| invalid("expected <transport>://<repository>"))?;
        let transport = Transport::from_scheme(scheme)
            .ok_or_else(|| invalid(&format!("unsupported transport '{}'", scheme)))?;

        if rest.is_empty() {
            return Err(invalid("repository is empty"));
        }

        // Split off @digest
        let (name, digest) = match rest.split_once('@') {
            Some((name, digest)) => {
                let digest = digest.parse::<Digest>().map_err(|e| invalid(&e))?;
                (name, Some(digest))
            }
            None => (rest, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a port
        let last_segment_start = name.rfind('/').map_or(0, |idx| idx + 1);
        let (repository, tag) = match name[last_segment_start..].rfind(':') {
            Some(idx) => {
                let split = last_segment_start + idx;
                (&name[..split], Some(&name[split + 1..]))
            }
            None => (name, None),
        };

        if tag.is_some() && digest.is_some() {
            return Err(invalid("reference specifies both a tag and a digest"));
        }

        if let Some(tag) = tag {
            if !TAG_RE.is_match(tag) {
                return Err(invalid(&format!("invalid tag '{}'", tag)));
            }
        }

        validate_repository(repository).map_err(|reason| invalid(&reason))?;

        Ok(Self {
            transport,
            repository: repository.to_string(),
            tag: tag.map(str::to_string),
            digest,
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Repository exactly as written, including any registry prefix
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag as written, if any
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Digest as written, if any
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// The tag this reference resolves to: the explicit tag, `latest` when
    /// neither tag nor digest was given, `None` for digest references.
    pub fn effective_tag(&self) -> Option<&str> {
        match (&self.tag, &self.digest) {
            (Some(tag), _) => Some(tag),
            (None, None) => Some(DEFAULT_TAG),
            (None, Some(_)) => None,
        }
    }

    /// The tag or digest string used in manifest requests
    pub fn manifest_reference(&self) -> String {
        match &self.digest {
            Some(digest) => digest.to_string(),
            None => self.effective_tag().unwrap_or(DEFAULT_TAG).to_string(),
        }
    }

    /// Registry host derived from the repository prefix
    pub fn domain(&self) -> &str {
        match self.repository.split_once('/') {
            Some((first, _)) if is_domain(first) => first,
            _ => DEFAULT_REGISTRY,
        }
    }

    /// Repository path on the registry (`library/` added for official images)
    pub fn path(&self) -> String {
        let path = match self.repository.split_once('/') {
            Some((first, rest)) if is_domain(first) => rest,
            _ => self.repository.as_str(),
        };

        if self.domain() == DEFAULT_REGISTRY && !path.contains('/') {
            format!("{}/{}", OFFICIAL_REPO_PREFIX, path)
        } else {
            path.to_string()
        }
    }

    /// Fully qualified repository name, e.g. `docker.io/library/ubuntu`
    pub fn canonical_name(&self) -> String {
        format!("{}/{}", self.domain(), self.path())
    }
}

impl FromStr for ImageReference {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport.scheme(), self.repository)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)
        } else if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)
        } else {
            Ok(())
        }
    }
}

/// Returns `true` if the first repository component names a registry host
fn is_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_repository(repository: &str) -> std::result::Result<(), String> {
    if repository.is_empty() {
        return Err("repository is empty".to_string());
    }
    if repository.len() > MAX_REPOSITORY_LEN {
        return Err(format!(
            "repository is longer than {} characters",
            MAX_REPOSITORY_LEN
        ));
    }

    let mut components = repository.split('/').peekable();
    if let Some(first) = components.next() {
        let has_more = components.peek().is_some();
        if has_more && is_domain(first) {
            if !DOMAIN_RE.is_match(first) {
                return Err(format!("invalid registry host '{}'", first));
            }
        } else if !COMPONENT_RE.is_match(first) {
            return Err(format!("invalid repository component '{}'", first));
        }
    }

    for component in components {
        if !COMPONENT_RE.is_match(component) {
            return Err(format!("invalid repository component '{}'", component));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_parse_registry_with_tag() {
        let r = ImageReference::parse("registry://example.com/repo:v1").unwrap();
        assert_eq!(r.transport(), Transport::Registry);
        assert_eq!(r.repository(), "example.com/repo");
        assert_eq!(r.tag(), Some("v1"));
        assert!(r.digest().is_none());
    }

    #[test]
    fn test_parse_digest() {
        let r = ImageReference::parse(&format!("registry://example.com/repo@{}", DIGEST)).unwrap();
        assert_eq!(r.repository(), "example.com/repo");
        assert_eq!(r.tag(), None);
        assert_eq!(r.digest().unwrap().to_string(), DIGEST);
        assert_eq!(r.effective_tag(), None);
        assert_eq!(r.manifest_reference(), DIGEST);
    }

    #[test]
    fn test_parse_docker_scheme_alias() {
        let r = ImageReference::parse("docker://quay.io/coreos/kube-state-metrics:v1.9.7").unwrap();
        assert_eq!(r.transport(), Transport::Registry);
        assert_eq!(r.domain(), "quay.io");
        assert_eq!(r.path(), "coreos/kube-state-metrics");
        assert_eq!(r.tag(), Some("v1.9.7"));
    }

    #[test]
    fn test_parse_defaults_to_latest() {
        let r = ImageReference::parse("registry://ubuntu").unwrap();
        assert_eq!(r.tag(), None);
        assert_eq!(r.effective_tag(), Some("latest"));
        assert_eq!(r.manifest_reference(), "latest");
        assert_eq!(r.domain(), "docker.io");
        assert_eq!(r.path(), "library/ubuntu");
        assert_eq!(r.canonical_name(), "docker.io/library/ubuntu");
    }

    #[test]
    fn test_parse_user_repo_on_docker_hub() {
        let r = ImageReference::parse("registry://myuser/myapp:v1").unwrap();
        assert_eq!(r.domain(), "docker.io");
        assert_eq!(r.path(), "myuser/myapp");
    }

    #[test]
    fn test_parse_localhost_port() {
        let r = ImageReference::parse("registry://localhost:5000/test:v1").unwrap();
        assert_eq!(r.repository(), "localhost:5000/test");
        assert_eq!(r.domain(), "localhost:5000");
        assert_eq!(r.path(), "test");
        assert_eq!(r.tag(), Some("v1"));
    }

    #[test]
    fn test_parse_port_without_tag() {
        let r = ImageReference::parse("registry://127.0.0.1:8080/library/app").unwrap();
        assert_eq!(r.repository(), "127.0.0.1:8080/library/app");
        assert_eq!(r.tag(), None);
        assert_eq!(r.domain(), "127.0.0.1:8080");
    }

    #[test]
    fn test_tag_and_digest_is_rejected() {
        let err =
            ImageReference::parse(&format!("registry://example.com/repo:v1@{}", DIGEST)).unwrap_err();
        assert_eq!(err.kind(), "InvalidReferenceError");
    }

    #[test]
    fn test_invalid_references() {
        let cases = [
            "example.com/repo:v1",
            "oci:///tmp/layout",
            "ftp://example.com/repo",
            "registry://",
            "registry://:v1",
            "registry://example.com/Repo",
            "registry://example.com/repo:",
            "registry://example.com/repo:-bad",
            "registry://example.com//repo",
            "registry://example.com/re po",
            "registry://example.com/repo@sha256:abc",
            "registry://example.com/repo@md5:d41d8cd98f00b204e9800998ecf8427e",
        ];

        for input in cases {
            let result = ImageReference::parse(input);
            assert!(
                matches!(result, Err(InspectError::InvalidReference { .. })),
                "expected InvalidReference for {}",
                input
            );
        }
    }

    #[test]
    fn test_display_roundtrip() {
        let inputs = [
            "registry://example.com/repo:v1".to_string(),
            format!("registry://example.com/repo@{}", DIGEST),
            "registry://localhost:5000/a/b/c".to_string(),
        ];

        for input in &inputs {
            let parsed = ImageReference::parse(input).unwrap();
            assert_eq!(&parsed.to_string(), input);
            let reparsed = ImageReference::parse(&parsed.to_string()).unwrap();
            assert_eq!(reparsed, parsed);
        }
    }

    #[test]
    fn test_docker_alias_displays_canonical_scheme() {
        let r = ImageReference::parse("docker://example.com/repo:v1").unwrap();
        assert_eq!(r.to_string(), "registry://example.com/repo:v1");
    }
}
