//! # imgspect-core
//!
//! Core library for the imgspect CLI providing:
//! - Runtime configuration types (network, TLS, registries, platform, staging)
//! - Layered configuration loading (embedded defaults, config file, environment)
//! - Configuration error types

pub mod config;
pub mod error;
pub mod types;

pub use config::HierarchicalConfigLoader;
pub use error::{Error, Result};
pub use types::RuntimeConfig;
