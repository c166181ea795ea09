//! Type definitions for imgspect runtime configuration

mod runtime_config;

pub use runtime_config::*;
