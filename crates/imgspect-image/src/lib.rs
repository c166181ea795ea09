//! Container image inspection
//!
//! This crate provides functionality for:
//! - Parsing image references (`registry://host/repo:tag`, `@digest`)
//! - Fetching manifests and configs from OCI-compatible registries, including
//!   token authentication and multi-architecture manifest lists
//! - Verifying content digests of everything fetched
//! - Projecting image configs into inspection output (labels, layers, env)
//!
//! # Example
//!
//! ```no_run
//! use imgspect_image::{inspect, ConnectionContext, ImageReference, Inspection, InspectOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reference = ImageReference::parse("registry://quay.io/coreos/etcd:v3.5.0")?;
//!     let ctx = Arc::new(ConnectionContext::new().with_architecture("arm64"));
//!
//!     if let Inspection::Metadata(output) =
//!         inspect(&reference, ctx, &InspectOptions::default()).await?
//!     {
//!         for line in output.label_lines() {
//!             println!("{}", line);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod auth;
pub mod context;
pub mod digest;
pub mod error;
pub mod format;
pub mod inspect;
pub mod manifest;
pub mod platform;
pub mod reference;
pub mod registry;
pub mod staging;
pub mod transport;

// Re-export main types for convenience
pub use context::{ConnectionContext, Credentials};
pub use digest::{Digest, DigestAlgorithm};
pub use error::{InspectError, Result};
pub use format::InspectionOutput;
pub use inspect::{inspect, InspectOptions, Inspection};
pub use manifest::{interpret, FetchedImage, ImageMetadata, ManifestKind, RawManifest};
pub use platform::PlatformSelector;
pub use reference::ImageReference;
pub use registry::RegistryClient;
pub use transport::{open_source, ImageSource, Transport};

/// Version of the imgspect-image crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
