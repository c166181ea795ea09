//! Scoped on-disk staging for fetched blobs
//!
//! A [`BlobStaging`] owns a temporary directory created inside the configured
//! staging root. Blobs are streamed to a file there and hashed as they arrive;
//! the directory is removed when the staging value is dropped, whatever the
//! outcome of the fetch.

use crate::digest::{Digest, Hasher};
use crate::error::{InspectError, Result};
use futures::{Stream, StreamExt};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, trace};

const STAGING_PREFIX: &str = "imgspect-";

/// Temporary blob directory, removed on drop
#[derive(Debug)]
pub struct BlobStaging {
    dir: TempDir,
}

impl BlobStaging {
    /// Create a fresh staging directory inside `parent`
    pub fn new_in(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)?;
        debug!("Staging blobs in {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `chunks` to disk, check them against `expected`, and return the bytes
    pub async fn stage<S, B>(&self, subject: &str, expected: &Digest, chunks: S) -> Result<Vec<u8>>
    where
        S: Stream<Item = Result<B>>,
        B: AsRef<[u8]>,
    {
        let blob_path = self.dir.path().join(expected.encoded());
        let mut file = File::create(&blob_path)?;
        let mut hasher = Hasher::new(expected.algorithm());
        let mut written = 0usize;

        let mut chunks = std::pin::pin!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let chunk = chunk.as_ref();
            file.write_all(chunk)?;
            hasher.update(chunk);
            written += chunk.len();
        }
        file.flush()?;
        drop(file);

        trace!("Staged {} bytes of {}", written, subject);

        let actual = hasher.finish();
        if actual != *expected {
            return Err(InspectError::integrity(
                subject,
                expected.to_string(),
                actual.to_string(),
            ));
        }

        Ok(fs::read(&blob_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8]>> {
        stream::iter(parts.to_vec().into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_stage_verifies_and_returns_bytes() {
        let root = TempDir::new().unwrap();
        let staging = BlobStaging::new_in(root.path()).unwrap();
        assert!(staging.path().starts_with(root.path()));

        let expected = Digest::sha256(b"hello world");
        let bytes = staging
            .stage("config blob", &expected, chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_stage_rejects_digest_mismatch() {
        let root = TempDir::new().unwrap();
        let staging = BlobStaging::new_in(root.path()).unwrap();

        let expected = Digest::sha256(b"hello world");
        let err = staging
            .stage("config blob", &expected, chunks(&[b"tampered"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "IntegrityError");
    }

    #[tokio::test]
    async fn test_staging_dir_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let staging = BlobStaging::new_in(root.path()).unwrap();
        let path = staging.path().to_path_buf();

        let expected = Digest::sha256(b"x");
        staging.stage("blob", &expected, chunks(&[b"x"])).await.unwrap();
        assert!(path.exists());

        drop(staging);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_parent_is_a_staging_error() {
        let root = TempDir::new().unwrap();
        let err = BlobStaging::new_in(&root.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), "StagingError");
    }
}
