//! Error taxonomy for image inspection

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`InspectError`]
pub type Result<T> = std::result::Result<T, InspectError>;

/// Everything that can stop an inspection.
///
/// Errors are returned up the call chain untouched; only the binary decides
/// whether to log them and which exit code to use.
#[derive(Error, Debug)]
pub enum InspectError {
    /// The image reference string could not be parsed
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Network-level failure or unexpected registry response
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Credentials rejected, or required but not supplied
    #[error("Authentication failed for {registry}: {reason}")]
    Authentication { registry: String, reason: String },

    /// A manifest list has no entry for the requested platform
    #[error("No image found in manifest list for platform {wanted} (available: {available})")]
    NoMatchingPlatform { wanted: String, available: String },

    /// Content does not hash to the expected digest
    #[error("Digest mismatch for {subject}: expected {expected}, got {actual}")]
    Integrity {
        subject: String,
        expected: String,
        actual: String,
    },

    /// Malformed or unsupported manifest/config content
    #[error("Failed to decode {subject}: {reason}")]
    Decode { subject: String, reason: String },

    /// The command deadline expired before the fetch completed
    #[error("Command timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Temporary blob staging failed
    #[error("Blob staging failed: {0}")]
    Staging(#[from] std::io::Error),

    /// Connection settings could not be applied
    #[error("Invalid connection settings: {0}")]
    Config(String),
}

impl InspectError {
    /// Create an invalid reference error
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error without an underlying HTTP error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a reqwest error with a description of what was attempted
    pub fn http(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an authentication error
    pub fn authentication(registry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            registry: registry.into(),
            reason: reason.into(),
        }
    }

    /// Create an integrity error
    pub fn integrity(
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Integrity {
            subject: subject.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a decode error
    pub fn decode(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error class, used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidReference { .. } => "InvalidReferenceError",
            Self::Transport { .. } => "TransportError",
            Self::Authentication { .. } => "AuthenticationError",
            Self::NoMatchingPlatform { .. } => "NoMatchingPlatformError",
            Self::Integrity { .. } => "IntegrityError",
            Self::Decode { .. } => "DecodeError",
            Self::Timeout(_) => "TimeoutError",
            Self::Staging(_) => "StagingError",
            Self::Config(_) => "ConfigError",
        }
    }

    /// Process exit code for this error class
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidReference { .. } | Self::Config(_) => 2,
            Self::Transport { .. } => 3,
            Self::Authentication { .. } => 4,
            Self::NoMatchingPlatform { .. } => 5,
            Self::Integrity { .. } => 6,
            Self::Decode { .. } => 7,
            Self::Timeout(_) => 8,
            Self::Staging(_) => 9,
        }
    }
}
