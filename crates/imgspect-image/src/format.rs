//! Inspection output and its renderings

use crate::error::{InspectError, Result};
use crate::manifest::ImageMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// What an inspection reports about one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectionOutput {
    /// Canonical repository name, when the transport has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub digest: String,
    pub repo_tags: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    pub docker_version: String,
    pub labels: BTreeMap<String, String>,
    pub architecture: String,
    pub os: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub variant: String,
    pub layers: Vec<String>,
    pub env: Vec<String>,
}

impl InspectionOutput {
    pub fn new(name: Option<String>, repo_tags: Vec<String>, metadata: ImageMetadata) -> Self {
        Self {
            name,
            tag: metadata.tag,
            digest: metadata.digest.to_string(),
            repo_tags,
            created: metadata.created,
            docker_version: metadata.docker_version,
            labels: metadata.labels,
            architecture: metadata.architecture,
            os: metadata.os,
            variant: metadata.variant,
            layers: metadata.layers,
            env: metadata.env,
        }
    }

    /// One `Key: <k> => Element: <v>` line per label, sorted by key
    pub fn label_lines(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|(key, value)| format!("Key: {} => Element: {}", key, value))
            .collect()
    }

    /// Pretty-printed JSON document
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InspectError::decode("inspection output", e.to_string()))
    }
}
