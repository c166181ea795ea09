//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Config file (`<config dir>/imgspect/config.yaml`, or an explicit `--config` path)
//! 3. Environment variables (IMGSPECT_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::RuntimeConfig;
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use tracing::debug;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

/// Name of the user configuration file inside the config directory
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration hierarchy loader
pub struct HierarchicalConfigLoader {
    /// Config file to layer over the embedded defaults
    config_file: Option<Utf8PathBuf>,

    /// Whether the file was requested explicitly and therefore must exist
    required: bool,
}

impl HierarchicalConfigLoader {
    /// Create a loader reading the standard user config file, if present
    pub fn new() -> Result<Self> {
        let config_file = Self::get_config_dir()?.map(|dir| dir.join(CONFIG_FILE_NAME));
        Ok(Self {
            config_file,
            required: false,
        })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self {
            config_file: Some(config_dir.join(CONFIG_FILE_NAME)),
            required: false,
        }
    }

    /// Create a loader for an explicitly requested config file
    pub fn with_file(config_file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config_file: Some(config_file.into()),
            required: true,
        }
    }

    /// Get the standard config directory (`<config dir>/imgspect`)
    fn get_config_dir() -> Result<Option<Utf8PathBuf>> {
        let Some(base) = dirs::config_dir() else {
            return Ok(None);
        };
        let base = Utf8PathBuf::from_path_buf(base).map_err(|p| {
            Error::invalid_config(format!(
                "Config directory is not valid UTF-8: {}",
                p.display()
            ))
        })?;
        Ok(Some(base.join("imgspect")))
    }

    /// Load runtime configuration with hierarchical precedence
    pub fn load_runtime_config(&self) -> Result<RuntimeConfig> {
        // Start with embedded defaults
        let mut config = Self::load_embedded_config::<RuntimeConfig>("runtime-defaults.yaml")?;

        if let Some(path) = &self.config_file {
            if path.exists() {
                debug!("Loading config file {}", path);
                let file_config = self.load_yaml_file::<RuntimeConfig>(path)?;
                config = config.merge(file_config);
            } else if self.required {
                return Err(Error::config_not_found(path.as_str()));
            }
        }

        // Apply environment variable overrides
        config = self.apply_env_overrides(config)?;

        Ok(config)
    }

    /// Load an embedded configuration file
    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        let config: T = serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })?;

        Ok(config)
    }

    /// Load a YAML file and parse it
    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let config: T = serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))?;
        Ok(config)
    }

    /// Apply environment variable overrides to runtime config
    fn apply_env_overrides(&self, mut config: RuntimeConfig) -> Result<RuntimeConfig> {
        if let Ok(val) = env::var("IMGSPECT_COMMAND_TIMEOUT_SECS") {
            config.network.command_timeout_secs = Some(val.parse().map_err(|_| {
                Error::invalid_config("IMGSPECT_COMMAND_TIMEOUT_SECS must be a valid number")
            })?);
        }

        if let Ok(val) = env::var("IMGSPECT_USER_AGENT") {
            config.network.user_agent = Some(val);
        }

        if let Ok(val) = env::var("IMGSPECT_TLS_VERIFY") {
            config.tls.verify = Some(parse_bool(&val).ok_or_else(|| {
                Error::invalid_config("IMGSPECT_TLS_VERIFY must be true or false")
            })?);
        }

        if let Ok(val) = env::var("IMGSPECT_CERT_DIR") {
            config.tls.cert_dir = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("IMGSPECT_PLAIN_HTTP") {
            config.registries.plain_http = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(val) = env::var("IMGSPECT_OVERRIDE_ARCH") {
            config.platform.architecture = Some(val);
        }

        if let Ok(val) = env::var("IMGSPECT_OVERRIDE_OS") {
            config.platform.os = Some(val);
        }

        if let Ok(val) = env::var("IMGSPECT_OVERRIDE_VARIANT") {
            config.platform.variant = Some(val);
        }

        if let Ok(val) = env::var("IMGSPECT_TMPDIR") {
            config.staging.tmp_dir = Some(Utf8PathBuf::from(val));
        }

        Ok(config)
    }

    /// Get the config file path this loader reads, if any
    pub fn config_file(&self) -> Option<&Utf8Path> {
        self.config_file.as_deref()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
