//! Transport dispatch
//!
//! Each reference scheme maps to a [`Transport`], and each transport to one
//! [`ImageSource`] implementation created by [`open_source`].

use crate::context::ConnectionContext;
use crate::error::Result;
use crate::manifest::{FetchedImage, RawManifest};
use crate::reference::ImageReference;
use crate::registry::RegistryClient;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Where an image is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// A remote registry speaking the distribution API
    Registry,
}

impl Transport {
    /// Look up a transport by reference scheme
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "registry" | "docker" => Some(Self::Registry),
            _ => None,
        }
    }

    /// Canonical scheme used when rendering references
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A source of image manifests and configs
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Transport this source serves
    fn transport(&self) -> Transport;

    /// Fetch only the manifest `reference` points at, as received
    async fn fetch_manifest(&self, reference: &ImageReference) -> Result<RawManifest>;

    /// Fetch the manifest(s) and config blob for `reference`
    async fn fetch(&self, reference: &ImageReference) -> Result<FetchedImage>;

    /// List every tag of the reference's repository
    async fn list_tags(&self, reference: &ImageReference) -> Result<Vec<String>>;

    /// Canonical repository identity, if the transport has one
    fn canonical_name(&self, _reference: &ImageReference) -> Option<String> {
        None
    }

    /// Whether [`ImageSource::list_tags`] is supported
    fn can_list_tags(&self) -> bool {
        false
    }
}

/// Create the image source for a transport
pub fn open_source(
    transport: Transport,
    ctx: Arc<ConnectionContext>,
) -> Result<Box<dyn ImageSource>> {
    match transport {
        Transport::Registry => Ok(Box::new(RegistryClient::new(ctx)?)),
    }
}
