//! Platform selection for multi-architecture images

use crate::error::{InspectError, Result};
use crate::manifest::{Descriptor, Platform};
use std::fmt;

/// The platform an inspection asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSelector {
    architecture: String,
    os: String,
    variant: Option<String>,
}

impl PlatformSelector {
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            variant: None,
        }
    }

    /// The platform this binary runs on, in registry naming
    pub fn host() -> Self {
        Self::new(
            registry_arch(std::env::consts::ARCH),
            registry_os(std::env::consts::OS),
        )
    }

    /// Replace the fields that have an override
    pub fn with_overrides(
        mut self,
        architecture: Option<&str>,
        os: Option<&str>,
        variant: Option<&str>,
    ) -> Self {
        if let Some(architecture) = architecture {
            self.architecture = architecture.to_string();
        }
        if let Some(os) = os {
            self.os = os.to_string();
        }
        if let Some(variant) = variant {
            self.variant = Some(variant.to_string());
        }
        self
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Variant only constrains the match when one was requested
    pub fn matches(&self, platform: &Platform) -> bool {
        platform.architecture == self.architecture
            && platform.os == self.os
            && self
                .variant
                .as_ref()
                .is_none_or(|wanted| platform.variant.as_ref() == Some(wanted))
    }

    /// Pick the first manifest list entry matching this platform
    pub fn select<'a>(&self, entries: &'a [Descriptor]) -> Result<&'a Descriptor> {
        entries
            .iter()
            .find(|entry| entry.platform.as_ref().is_some_and(|p| self.matches(p)))
            .ok_or_else(|| InspectError::NoMatchingPlatform {
                wanted: self.to_string(),
                available: available_platforms(entries),
            })
    }
}

impl fmt::Display for PlatformSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

fn available_platforms(entries: &[Descriptor]) -> String {
    let platforms: Vec<String> = entries
        .iter()
        .filter_map(|entry| entry.platform.as_ref())
        .map(ToString::to_string)
        .collect();

    if platforms.is_empty() {
        "none".to_string()
    } else {
        platforms.join(", ")
    }
}

/// Map a Rust target architecture to the name registries use
fn registry_arch(arch: &str) -> String {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
    .to_string()
}

/// Map a Rust target OS to the name registries use
fn registry_os(os: &str) -> String {
    match os {
        "macos" => "darwin",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    fn entry(arch: &str, os: &str, variant: Option<&str>) -> Descriptor {
        Descriptor {
            media_type: None,
            digest: Digest::sha256(format!("{}/{}", os, arch).as_bytes()),
            size: 0,
            platform: Some(Platform {
                architecture: arch.to_string(),
                os: os.to_string(),
                variant: variant.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_selects_requested_architecture() {
        let entries = vec![entry("amd64", "linux", None), entry("arm64", "linux", None)];

        let selector = PlatformSelector::new("arm64", "linux");
        let selected = selector.select(&entries).unwrap();
        assert_eq!(selected.digest, entries[1].digest);
    }

    #[test]
    fn test_unknown_architecture_has_no_match() {
        let entries = vec![entry("amd64", "linux", None), entry("arm64", "linux", None)];

        let err = PlatformSelector::new("riscv64", "linux")
            .select(&entries)
            .unwrap_err();
        match err {
            InspectError::NoMatchingPlatform { wanted, available } => {
                assert_eq!(wanted, "linux/riscv64");
                assert_eq!(available, "linux/amd64, linux/arm64");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_variant_only_constrains_when_requested() {
        let entries = vec![entry("arm", "linux", Some("v6")), entry("arm", "linux", Some("v7"))];

        let any = PlatformSelector::new("arm", "linux");
        assert_eq!(any.select(&entries).unwrap().digest, entries[0].digest);

        let v7 = any.with_overrides(None, None, Some("v7"));
        assert_eq!(v7.select(&entries).unwrap().digest, entries[1].digest);
        assert_eq!(v7.to_string(), "linux/arm/v7");
    }

    #[test]
    fn test_entries_without_platform_are_skipped() {
        let mut bare = entry("amd64", "linux", None);
        bare.platform = None;
        let entries = vec![bare];

        let result = PlatformSelector::new("amd64", "linux").select(&entries);
        assert!(matches!(result, Err(InspectError::NoMatchingPlatform { .. })));
    }

    #[test]
    fn test_host_names_use_registry_conventions() {
        assert_eq!(registry_arch("x86_64"), "amd64");
        assert_eq!(registry_arch("aarch64"), "arm64");
        assert_eq!(registry_arch("riscv64"), "riscv64");
        assert_eq!(registry_os("macos"), "darwin");
        assert_eq!(registry_os("linux"), "linux");
    }
}
