//! Runtime configuration types for operational parameters
//!
//! These types control how imgspect talks to registries: deadlines, TLS
//! verification, plain-HTTP exceptions, platform selection overrides and
//! where temporary blob files go.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Network and HTTP configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// TLS settings
    #[serde(default)]
    pub tls: TlsConfig,

    /// Per-registry connection settings
    #[serde(default)]
    pub registries: RegistriesConfig,

    /// Platform used to pick an entry from multi-architecture images
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Temporary blob staging
    #[serde(default)]
    pub staging: StagingConfig,
}

impl RuntimeConfig {
    /// Layer `overlay` on top of `self`; values set in the overlay win.
    pub fn merge(self, overlay: RuntimeConfig) -> RuntimeConfig {
        RuntimeConfig {
            network: NetworkConfig {
                command_timeout_secs: overlay
                    .network
                    .command_timeout_secs
                    .or(self.network.command_timeout_secs),
                user_agent: overlay.network.user_agent.or(self.network.user_agent),
            },
            tls: TlsConfig {
                verify: overlay.tls.verify.or(self.tls.verify),
                cert_dir: overlay.tls.cert_dir.or(self.tls.cert_dir),
            },
            registries: RegistriesConfig {
                plain_http: if overlay.registries.plain_http.is_empty() {
                    self.registries.plain_http
                } else {
                    overlay.registries.plain_http
                },
            },
            platform: PlatformConfig {
                architecture: overlay.platform.architecture.or(self.platform.architecture),
                os: overlay.platform.os.or(self.platform.os),
                variant: overlay.platform.variant.or(self.platform.variant),
            },
            staging: StagingConfig {
                tmp_dir: overlay.staging.tmp_dir.or(self.staging.tmp_dir),
            },
        }
    }
}

/// Network and HTTP configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Deadline for the whole fetch sequence in seconds (0 or unset: none)
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    /// User agent string for HTTP requests
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl NetworkConfig {
    /// The effective command deadline, if any
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The configured user agent or the built-in one
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(default_user_agent)
    }
}

fn default_user_agent() -> String {
    format!(
        "imgspect/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// TLS configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsConfig {
    /// Certificate verification; unset means verify
    #[serde(default)]
    pub verify: Option<bool>,

    /// Directory of extra `*.crt` PEM roots
    #[serde(default)]
    pub cert_dir: Option<Utf8PathBuf>,
}

/// Per-registry connection settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistriesConfig {
    /// Registries (`host[:port]`) contacted over plain HTTP
    #[serde(default)]
    pub plain_http: Vec<String>,
}

/// Platform overrides for manifest list selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformConfig {
    #[serde(default)]
    pub architecture: Option<String>,

    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub variant: Option<String>,
}

/// Blob staging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StagingConfig {
    /// Parent directory for scoped temporary blob directories
    #[serde(default)]
    pub tmp_dir: Option<Utf8PathBuf>,
}
