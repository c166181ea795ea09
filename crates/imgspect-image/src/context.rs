//! Connection settings shared by every request of one inspection

use crate::error::{InspectError, Result};
use crate::platform::PlatformSelector;
use imgspect_core::RuntimeConfig;
use std::fmt;
use std::path::{Path, PathBuf};

/// Registry credentials
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password, sent as HTTP basic auth
    Basic { username: String, password: String },
    /// Token used directly as a bearer token
    Token(String),
}

impl Credentials {
    /// Parse `username:password`
    pub fn parse_basic(value: &str) -> Result<Self> {
        match value.split_once(':') {
            Some((username, password)) if !username.is_empty() => Ok(Self::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(InspectError::Config(
                "credentials must be given as username:password".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// Everything a transport needs to reach a registry.
///
/// Built once per invocation and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ConnectionContext {
    tls_verify: Option<bool>,
    cert_dir: Option<PathBuf>,
    credentials: Option<Credentials>,
    architecture: Option<String>,
    os: Option<String>,
    variant: Option<String>,
    plain_http: Vec<String>,
    tmp_dir: Option<PathBuf>,
    user_agent: Option<String>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from layered runtime configuration
    pub fn from_runtime_config(config: &RuntimeConfig) -> Self {
        Self {
            tls_verify: config.tls.verify,
            cert_dir: config
                .tls
                .cert_dir
                .clone()
                .map(|p| p.into_std_path_buf()),
            credentials: None,
            architecture: config.platform.architecture.clone(),
            os: config.platform.os.clone(),
            variant: config.platform.variant.clone(),
            plain_http: config.registries.plain_http.clone(),
            tmp_dir: config
                .staging
                .tmp_dir
                .clone()
                .map(|p| p.into_std_path_buf()),
            user_agent: Some(config.network.user_agent()),
        }
    }

    pub fn with_tls_verify(mut self, verify: Option<bool>) -> Self {
        self.tls_verify = verify;
        self
    }

    pub fn with_cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = Some(dir.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Contact `host` (as written in the reference, `host[:port]`) over plain HTTP
    pub fn with_plain_http(mut self, host: impl Into<String>) -> Self {
        self.plain_http.push(host.into());
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Raw TLS setting: unset, explicitly on, or explicitly off
    pub fn tls_verify_setting(&self) -> Option<bool> {
        self.tls_verify
    }

    /// Whether certificates are verified (unset means yes)
    pub fn tls_verify(&self) -> bool {
        self.tls_verify.unwrap_or(true)
    }

    pub fn cert_dir(&self) -> Option<&Path> {
        self.cert_dir.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Directory for scoped blob staging, if configured
    pub fn tmp_dir(&self) -> Option<&Path> {
        self.tmp_dir.as_deref()
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| imgspect_core::types::NetworkConfig::default().user_agent())
    }

    /// Whether requests to `host` use `http://`
    pub fn uses_plain_http(&self, host: &str) -> bool {
        self.plain_http.iter().any(|h| h == host)
    }

    /// Platform wanted from manifest lists: overrides, else the host platform
    pub fn platform(&self) -> PlatformSelector {
        PlatformSelector::host().with_overrides(
            self.architecture.as_deref(),
            self.os.as_deref(),
            self.variant.as_deref(),
        )
    }
}
