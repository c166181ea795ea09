//! Manifest and config interpretation
//!
//! Turns the bytes fetched by an [`ImageSource`](crate::ImageSource) into
//! [`ImageMetadata`]. OCI image manifests and Docker v2 schema 2 manifests are
//! understood; manifest lists and OCI indexes are resolved by the transport
//! before interpretation.

use crate::digest::Digest;
use crate::error::{InspectError, Result};
use crate::reference::ImageReference;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

const DOCKER_SCHEMA1_PREFIX: &str = "application/vnd.docker.distribution.manifest.v1";

/// Media types a registry may return for a manifest request
pub const ACCEPTED_MANIFEST_TYPES: [&str; 4] =
    [OCI_MANIFEST, OCI_INDEX, DOCKER_MANIFEST, DOCKER_MANIFEST_LIST];

/// The manifest formats this crate understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    OciManifest,
    OciIndex,
    DockerManifest,
    DockerManifestList,
}

impl ManifestKind {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            OCI_MANIFEST => Some(Self::OciManifest),
            OCI_INDEX => Some(Self::OciIndex),
            DOCKER_MANIFEST => Some(Self::DockerManifest),
            DOCKER_MANIFEST_LIST => Some(Self::DockerManifestList),
            _ => None,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::OciManifest => OCI_MANIFEST,
            Self::OciIndex => OCI_INDEX,
            Self::DockerManifest => DOCKER_MANIFEST,
            Self::DockerManifestList => DOCKER_MANIFEST_LIST,
        }
    }

    /// Whether this is a list of per-platform manifests
    pub fn is_list(&self) -> bool {
        matches!(self, Self::OciIndex | Self::DockerManifestList)
    }
}

/// Manifest bytes as received, with their content digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawManifest {
    bytes: Vec<u8>,
    content_type: Option<String>,
    digest: Digest,
}

impl RawManifest {
    /// Wrap received bytes; `content_type` is the HTTP `Content-Type`, if any
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        let digest = Digest::sha256(&bytes);
        let content_type = content_type.map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        });
        Self {
            bytes,
            content_type,
            digest,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// SHA-256 digest of the bytes
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Determine the manifest format.
    ///
    /// The body's `mediaType` wins, then a manifest `Content-Type`, then the
    /// document shape.
    pub fn kind(&self) -> Result<ManifestKind> {
        let probe: ManifestProbe = decode_json("manifest", &self.bytes)?;

        if probe.schema_version == Some(1) {
            return Err(InspectError::decode(
                "manifest",
                "schema 1 manifests are not supported",
            ));
        }

        if let Some(media_type) = probe.media_type.as_deref() {
            return ManifestKind::from_media_type(media_type).ok_or_else(|| {
                InspectError::decode(
                    "manifest",
                    format!("unsupported manifest media type '{}'", media_type),
                )
            });
        }

        if let Some(content_type) = self.content_type() {
            if content_type.starts_with(DOCKER_SCHEMA1_PREFIX) {
                return Err(InspectError::decode(
                    "manifest",
                    "schema 1 manifests are not supported",
                ));
            }
            if let Some(kind) = ManifestKind::from_media_type(content_type) {
                return Ok(kind);
            }
        }

        if probe.manifests.is_some() {
            Ok(ManifestKind::OciIndex)
        } else if probe.config.is_some() && probe.layers.is_some() {
            Ok(ManifestKind::OciManifest)
        } else {
            Err(InspectError::decode(
                "manifest",
                "document is neither an image manifest nor a manifest list",
            ))
        }
    }

    /// Entries of a manifest list or index
    pub fn list_entries(&self) -> Result<Vec<Descriptor>> {
        let list: ManifestList = decode_json("manifest list", &self.bytes)?;
        Ok(list.manifests)
    }

    /// Decode an image manifest
    pub fn image_manifest(&self) -> Result<ImageManifest> {
        decode_json("image manifest", &self.bytes)
    }
}

/// Content descriptor inside a manifest or manifest list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub digest: Digest,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Platform of a manifest list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Single-platform image manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct ManifestList {
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestProbe {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
    #[serde(default)]
    config: Option<serde_json::Value>,
    #[serde(default)]
    layers: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    docker_version: Option<String>,
    #[serde(default)]
    architecture: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    config: Option<ContainerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
}

/// Everything a transport fetched for one image
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// The manifest the reference points at (possibly a list)
    pub top_level: RawManifest,
    /// The single-platform manifest; same bytes as `top_level` unless it was a list
    pub instance: RawManifest,
    /// Config blob bytes, already checked against the manifest's config digest
    pub config: Vec<u8>,
}

/// Decoded image metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub tag: Option<String>,
    /// Digest of the top-level manifest
    pub digest: Digest,
    pub created: Option<DateTime<Utc>>,
    pub docker_version: String,
    pub labels: BTreeMap<String, String>,
    pub architecture: String,
    pub os: String,
    pub variant: String,
    /// Layer digests, base layer first
    pub layers: Vec<String>,
    pub env: Vec<String>,
}

/// Interpret fetched bytes for `reference`.
///
/// A digest-pinned reference must match the top-level manifest exactly.
pub fn interpret(reference: &ImageReference, fetched: &FetchedImage) -> Result<ImageMetadata> {
    let digest = match reference.digest() {
        Some(pinned) => {
            pinned.verify(&format!("manifest of {}", reference), fetched.top_level.bytes())?;
            pinned.clone()
        }
        None => fetched.top_level.digest().clone(),
    };

    let kind = fetched.instance.kind()?;
    if kind.is_list() {
        return Err(InspectError::decode(
            "manifest",
            "expected an image manifest but got a manifest list",
        ));
    }
    debug!("Interpreting {} manifest", kind.media_type());

    let manifest = fetched.instance.image_manifest()?;
    manifest.config.digest.verify("config blob", &fetched.config)?;

    let config: ImageConfig = decode_json("image config", &fetched.config)?;
    let container = config.config.unwrap_or_default();

    let created = config.created.as_deref().and_then(|created| {
        DateTime::parse_from_rfc3339(created)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| debug!("Ignoring unparsable creation time '{}': {}", created, e))
            .ok()
    });

    Ok(ImageMetadata {
        tag: reference.effective_tag().map(str::to_string),
        digest,
        created,
        docker_version: config.docker_version.unwrap_or_default(),
        labels: container.labels.unwrap_or_default(),
        architecture: config.architecture.unwrap_or_default(),
        os: config.os.unwrap_or_default(),
        variant: config.variant.unwrap_or_default(),
        layers: manifest
            .layers
            .iter()
            .map(|layer| layer.digest.to_string())
            .collect(),
        env: container.env.unwrap_or_default(),
    })
}

fn decode_json<T: DeserializeOwned>(subject: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| InspectError::decode(subject, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = r#"{
        "created": "2021-03-04T10:20:30.123456789Z",
        "docker_version": "20.10.2",
        "architecture": "amd64",
        "os": "linux",
        "config": {
            "Env": ["PATH=/usr/local/bin:/usr/bin", "LANG=C.UTF-8"],
            "Labels": {"version": "1.0", "maintainer": "a"}
        }
    }"#;

    fn manifest_for(config: &[u8], media_type: Option<&str>) -> Vec<u8> {
        let mut manifest = json!({
            "schemaVersion": 2,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": Digest::sha256(config).to_string(),
                "size": config.len(),
            },
            "layers": [
                {"digest": Digest::sha256(b"base").to_string(), "size": 4},
                {"digest": Digest::sha256(b"top").to_string(), "size": 3},
            ],
        });
        if let Some(media_type) = media_type {
            manifest["mediaType"] = json!(media_type);
        }
        serde_json::to_vec(&manifest).unwrap()
    }

    fn fetched(manifest: Vec<u8>, config: &[u8]) -> FetchedImage {
        let raw = RawManifest::new(manifest, None);
        FetchedImage {
            top_level: raw.clone(),
            instance: raw,
            config: config.to_vec(),
        }
    }

    fn reference(s: &str) -> ImageReference {
        ImageReference::parse(s).unwrap()
    }

    #[test]
    fn test_interpret_docker_manifest() {
        let manifest = manifest_for(CONFIG.as_bytes(), Some(DOCKER_MANIFEST));
        let fetched = fetched(manifest, CONFIG.as_bytes());
        let metadata = interpret(&reference("registry://example.com/repo:v1"), &fetched).unwrap();

        assert_eq!(metadata.tag.as_deref(), Some("v1"));
        assert_eq!(&metadata.digest, fetched.top_level.digest());
        assert_eq!(metadata.docker_version, "20.10.2");
        assert_eq!(metadata.architecture, "amd64");
        assert_eq!(metadata.os, "linux");
        assert_eq!(metadata.variant, "");
        assert_eq!(
            metadata.created.unwrap().to_rfc3339(),
            "2021-03-04T10:20:30.123456789+00:00"
        );
        assert_eq!(
            metadata.labels.keys().collect::<Vec<_>>(),
            vec!["maintainer", "version"]
        );
        assert_eq!(
            metadata.env,
            vec!["PATH=/usr/local/bin:/usr/bin", "LANG=C.UTF-8"]
        );
        assert_eq!(
            metadata.layers,
            vec![
                Digest::sha256(b"base").to_string(),
                Digest::sha256(b"top").to_string()
            ]
        );
    }

    #[test]
    fn test_pinned_digest_mismatch_is_fatal() {
        let manifest = manifest_for(CONFIG.as_bytes(), Some(OCI_MANIFEST));
        let fetched = fetched(manifest, CONFIG.as_bytes());
        let other = Digest::sha256(b"some other manifest");
        let pinned = reference(&format!("registry://example.com/repo@{}", other));

        let err = interpret(&pinned, &fetched).unwrap_err();
        assert_eq!(err.kind(), "IntegrityError");
    }

    #[test]
    fn test_pinned_digest_match_reports_pinned_digest() {
        let manifest = manifest_for(CONFIG.as_bytes(), Some(OCI_MANIFEST));
        let digest = Digest::sha256(&manifest);
        let fetched = fetched(manifest, CONFIG.as_bytes());
        let pinned = reference(&format!("registry://example.com/repo@{}", digest));

        let metadata = interpret(&pinned, &fetched).unwrap();
        assert_eq!(metadata.digest, digest);
        assert_eq!(metadata.tag, None);
    }

    #[test]
    fn test_config_digest_mismatch() {
        let manifest = manifest_for(CONFIG.as_bytes(), Some(OCI_MANIFEST));
        let fetched = fetched(manifest, b"{}");
        let err = interpret(&reference("registry://example.com/repo"), &fetched).unwrap_err();
        assert_eq!(err.kind(), "IntegrityError");
    }

    #[test]
    fn test_missing_labels_and_bad_created() {
        let config = br#"{"created":"yesterday","architecture":"arm64","os":"linux","variant":"v8","config":{"Labels":null}}"#;
        let manifest = manifest_for(config, None);
        let fetched = fetched(manifest, config);

        let metadata = interpret(&reference("registry://example.com/repo"), &fetched).unwrap();
        assert_eq!(metadata.created, None);
        assert!(metadata.labels.is_empty());
        assert!(metadata.env.is_empty());
        assert_eq!(metadata.variant, "v8");
        assert_eq!(metadata.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn test_malformed_config_is_decode_error() {
        let config = b"{not json";
        let manifest = manifest_for(config, None);
        let err = interpret(&reference("registry://example.com/repo"), &fetched(manifest, config))
            .unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
    }

    #[test]
    fn test_kind_detection() {
        let from_body = RawManifest::new(manifest_for(b"{}", Some(DOCKER_MANIFEST)), None);
        assert_eq!(from_body.kind().unwrap(), ManifestKind::DockerManifest);

        let from_header = RawManifest::new(
            manifest_for(b"{}", None),
            Some(format!("{}; charset=utf-8", DOCKER_MANIFEST)),
        );
        assert_eq!(from_header.kind().unwrap(), ManifestKind::DockerManifest);

        let from_shape = RawManifest::new(manifest_for(b"{}", None), Some("application/json".into()));
        assert_eq!(from_shape.kind().unwrap(), ManifestKind::OciManifest);

        let index = RawManifest::new(br#"{"schemaVersion":2,"manifests":[]}"#.to_vec(), None);
        assert_eq!(index.kind().unwrap(), ManifestKind::OciIndex);
        assert!(index.kind().unwrap().is_list());
    }

    #[test]
    fn test_unsupported_manifests() {
        let schema1 = RawManifest::new(
            br#"{"schemaVersion":1,"name":"repo","tag":"v1","fsLayers":[]}"#.to_vec(),
            None,
        );
        assert_eq!(schema1.kind().unwrap_err().kind(), "DecodeError");

        let unknown = RawManifest::new(
            br#"{"schemaVersion":2,"mediaType":"application/vnd.example+json"}"#.to_vec(),
            None,
        );
        assert_eq!(unknown.kind().unwrap_err().kind(), "DecodeError");

        let garbage = RawManifest::new(b"<html>".to_vec(), Some("text/html".into()));
        assert_eq!(garbage.kind().unwrap_err().kind(), "DecodeError");
    }

    #[test]
    fn test_list_is_not_an_image_manifest() {
        let list = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[]}"#;
        let err = interpret(&reference("registry://example.com/repo"), &fetched(list.to_vec(), b"{}"))
            .unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
    }
}
