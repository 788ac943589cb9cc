//! Scene download adapter.
//!
//! Streams the remote file to the sensor's download directory, verifying
//! size and checksum where the archive published them. Network and disk
//! errors are transient, and so is a checksum mismatch: the partial file is
//! removed and the next run re-fetches from scratch, which recovers from a
//! corrupted transfer. A scene only becomes permanently unprocessable for
//! conditions intrinsic to the scene itself, such as a missing remote URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::models::Scene;

use super::StageError;

/// Download stage adapter.
#[async_trait]
pub trait SceneDownloader: Send + Sync {
    /// Fetch the scene into `dest_dir`, returning the downloaded path.
    async fn fetch(&self, scene: &Scene, dest_dir: &Path) -> Result<PathBuf, StageError>;
}

/// HTTP(S) downloader for archives exposing plain object URLs.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("eoacquire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn target_filename(scene: &Scene, url: &str) -> String {
        if let Some(name) = &scene.remote.filename {
            return name.clone();
        }
        url.rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.dat", scene.scene_id))
    }
}

#[async_trait]
impl SceneDownloader for HttpDownloader {
    async fn fetch(&self, scene: &Scene, dest_dir: &Path) -> Result<PathBuf, StageError> {
        let url = scene
            .remote
            .url
            .as_deref()
            .ok_or_else(|| StageError::Permanent("scene has no remote URL".to_string()))?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(StageError::transient)?;
        let dest = dest_dir.join(Self::target_filename(scene, url));
        // Partial downloads go to a .part file so an interrupted transfer
        // never looks like a finished one.
        let partial = dest.with_extension("part");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(StageError::transient)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StageError::Transient(anyhow::anyhow!(
                "download of {url} failed with status {status}"
            )));
        }

        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(StageError::transient)?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(StageError::transient)?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(StageError::transient)?;
        }
        file.flush().await.map_err(StageError::transient)?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if let Err(e) = verify_transfer(
            url,
            written,
            scene.remote.size,
            &actual,
            scene.remote.checksum.as_deref(),
        ) {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        if scene.remote.checksum.is_some() {
            debug!(scene_id = %scene.scene_id, "checksum verified");
        }

        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(StageError::transient)?;
        info!(scene_id = %scene.scene_id, bytes = written, path = %dest.display(), "scene downloaded");
        Ok(dest)
    }
}

/// Check a finished transfer against the archive's published size and
/// checksum. Both failure modes are transient: the caller deletes the
/// partial file, so the next run starts over with a fresh transfer.
fn verify_transfer(
    url: &str,
    written: u64,
    expected_size: Option<u64>,
    actual_checksum: &str,
    expected_checksum: Option<&str>,
) -> Result<(), StageError> {
    if let Some(expected) = expected_size {
        if written != expected {
            return Err(StageError::Transient(anyhow::anyhow!(
                "download of {url} truncated: {written} of {expected} bytes"
            )));
        }
    }
    if let Some(expected) = expected_checksum {
        if !actual_checksum.eq_ignore_ascii_case(expected) {
            return Err(StageError::Transient(anyhow::anyhow!(
                "checksum mismatch for {url}: expected {expected}, got {actual_checksum}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_is_transient() {
        let err = verify_transfer("https://a/x.zip", 10, Some(10), "abcd", Some("beef"))
            .unwrap_err();
        // A corrupted transfer must stay retryable, not invalidate the scene.
        assert!(matches!(err, StageError::Transient(_)));
    }

    #[test]
    fn test_truncated_transfer_is_transient() {
        let err = verify_transfer("https://a/x.zip", 5, Some(10), "abcd", None).unwrap_err();
        assert!(matches!(err, StageError::Transient(_)));
    }

    #[test]
    fn test_checksum_comparison_ignores_case() {
        verify_transfer("https://a/x.zip", 10, Some(10), "ABCD", Some("abcd")).unwrap();
        verify_transfer("https://a/x.zip", 10, None, "abcd", None).unwrap();
    }
}
