//! The inspection pipeline: fetch, interpret, project

use crate::context::ConnectionContext;
use crate::error::{InspectError, Result};
use crate::format::InspectionOutput;
use crate::manifest::interpret;
use crate::reference::ImageReference;
use crate::transport::{open_source, ImageSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-invocation inspection switches
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Also list every tag of the repository
    pub list_tags: bool,
    /// Return the top-level manifest bytes instead of decoded metadata
    pub raw: bool,
    /// Deadline for the whole fetch sequence
    pub timeout: Option<Duration>,
}

/// Result of a successful inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    Metadata(Box<InspectionOutput>),
    /// Manifest bytes exactly as the registry returned them
    Raw(Vec<u8>),
}

/// Inspect `reference`.
///
/// Nothing is returned unless every step succeeds. When a timeout is set and
/// expires, in-flight requests are dropped and [`InspectError::Timeout`] is
/// returned.
pub async fn inspect(
    reference: &ImageReference,
    ctx: Arc<ConnectionContext>,
    options: &InspectOptions,
) -> Result<Inspection> {
    let source = open_source(reference.transport(), ctx)?;
    let work = run(source.as_ref(), reference, options);

    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| InspectError::Timeout(limit))?,
        None => work.await,
    }
}

async fn run(
    source: &dyn ImageSource,
    reference: &ImageReference,
    options: &InspectOptions,
) -> Result<Inspection> {
    if options.raw {
        let manifest = source.fetch_manifest(reference).await?;
        if let Some(pinned) = reference.digest() {
            pinned.verify(&format!("manifest of {}", reference), manifest.bytes())?;
        }
        return Ok(Inspection::Raw(manifest.bytes().to_vec()));
    }

    let fetched = source.fetch(reference).await?;
    let metadata = interpret(reference, &fetched)?;

    let repo_tags = if options.list_tags && source.can_list_tags() {
        source.list_tags(reference).await?
    } else {
        Vec::new()
    };
    debug!("Inspected {} ({} tags listed)", reference, repo_tags.len());

    Ok(Inspection::Metadata(Box::new(InspectionOutput::new(
        source.canonical_name(reference),
        repo_tags,
        metadata,
    ))))
}
