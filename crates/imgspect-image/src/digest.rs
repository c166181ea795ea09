//! Content digests (`algorithm:hex`) and verification

use crate::error::{InspectError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Algorithm name as it appears in a digest string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded hash
    fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn hash(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

/// A content-addressed identifier such as `sha256:4a5b...`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    encoded: String,
}

impl Digest {
    /// Hash `bytes` with the given algorithm
    pub fn compute(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            encoded: algorithm.hash(bytes),
        }
    }

    /// SHA-256 digest of `bytes`
    pub fn sha256(bytes: &[u8]) -> Self {
        Self::compute(DigestAlgorithm::Sha256, bytes)
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hex-encoded hash without the algorithm prefix
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Check that `bytes` hash to this digest.
    ///
    /// `subject` names the content in the error message.
    pub fn verify(&self, subject: &str, bytes: &[u8]) -> Result<()> {
        let actual = Self::compute(self.algorithm, bytes);
        if actual == *self {
            Ok(())
        } else {
            Err(InspectError::integrity(
                subject,
                self.to_string(),
                actual.to_string(),
            ))
        }
    }
}

/// Incremental hasher for content that arrives in chunks
pub(crate) enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub(crate) fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(chunk),
            Self::Sha512(h) => h.update(chunk),
        }
    }

    pub(crate) fn finish(self) -> Digest {
        let (algorithm, encoded) = match self {
            Self::Sha256(h) => (DigestAlgorithm::Sha256, hex::encode(h.finalize())),
            Self::Sha512(h) => (DigestAlgorithm::Sha512, hex::encode(h.finalize())),
        };
        Digest { algorithm, encoded }
    }
}

impl FromStr for Digest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| format!("digest '{}' is missing the algorithm prefix", s))?;

        let algorithm = match algorithm {
            "sha256" => DigestAlgorithm::Sha256,
            "sha512" => DigestAlgorithm::Sha512,
            other => return Err(format!("unsupported digest algorithm '{}'", other)),
        };

        if encoded.len() != algorithm.hex_len()
            || !encoded
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(format!(
                "{} digest must be {} lowercase hex characters",
                algorithm.name(),
                algorithm.hex_len()
            ));
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.encoded)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str =
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_compute_sha256() {
        assert_eq!(Digest::sha256(b"hello").to_string(), HELLO_SHA256);
    }

    #[test]
    fn test_parse_and_display() {
        let digest: Digest = HELLO_SHA256.parse().unwrap();
        assert_eq!(digest.algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(digest.to_string(), HELLO_SHA256);
    }

    #[test]
    fn test_parse_rejects_bad_digests() {
        assert!("2cf24dba".parse::<Digest>().is_err());
        assert!("md5:d41d8cd98f00b204e9800998ecf8427e".parse::<Digest>().is_err());
        assert!("sha256:abc123".parse::<Digest>().is_err());
        assert!(HELLO_SHA256.to_uppercase().replace("SHA256", "sha256").parse::<Digest>().is_err());
    }

    #[test]
    fn test_verify() {
        let digest: Digest = HELLO_SHA256.parse().unwrap();
        assert!(digest.verify("blob", b"hello").is_ok());

        let err = digest.verify("blob", b"tampered").unwrap_err();
        assert_eq!(err.kind(), "IntegrityError");
    }

    #[test]
    fn test_sha512_verify() {
        let digest = Digest::compute(DigestAlgorithm::Sha512, b"hello");
        assert_eq!(digest.encoded().len(), 128);
        let parsed: Digest = digest.to_string().parse().unwrap();
        assert!(parsed.verify("blob", b"hello").is_ok());
    }

    #[test]
    fn test_incremental_hasher_matches_one_shot() {
        let mut hasher = Hasher::new(DigestAlgorithm::Sha256);
        hasher.update(b"hel");
        hasher.update(b"lo");
        assert_eq!(hasher.finish().to_string(), HELLO_SHA256);
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let digest: Digest = HELLO_SHA256.parse().unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO_SHA256));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
