//! ARD conversion adapter.
//!
//! Shells out to the configured ARD toolchain (atmospheric correction, SAR
//! geocoding, mosaicking live entirely in that external tool). The adapter's
//! contract is narrow: input download path in, ARD product directory out.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::Scene;

use super::{resolve_tool, run_tool, StageError};

/// ARD conversion stage adapter.
#[async_trait]
pub trait ArdConverter: Send + Sync {
    /// Convert the downloaded scene, returning the ARD product path.
    async fn convert(
        &self,
        scene: &Scene,
        out_dir: &Path,
        tmp_dir: &Path,
    ) -> Result<PathBuf, StageError>;
}

/// Configuration for the external ARD toolchain invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArdToolConfig {
    /// Toolchain executable (absolute path or name resolved on PATH).
    pub command: PathBuf,
    /// Arguments; `{download}`, `{output}`, `{tmp}` and `{scene_id}`
    /// placeholders are expanded per scene.
    #[serde(default)]
    pub args: Vec<String>,
    /// Exit code the toolchain uses to flag a permanently unprocessable
    /// scene (e.g. cloud cover above threshold after correction).
    #[serde(default)]
    pub invalid_exit_code: Option<i32>,
    /// Thread count handed to the toolchain's native libraries.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

/// ARD converter that invokes a configured external command per scene.
pub struct CommandArdConverter {
    config: ArdToolConfig,
}

impl CommandArdConverter {
    pub fn new(config: ArdToolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ArdConverter for CommandArdConverter {
    async fn convert(
        &self,
        scene: &Scene,
        out_dir: &Path,
        tmp_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        if !scene.downloaded || scene.download_path.as_os_str().is_empty() {
            return Err(StageError::Transient(anyhow::anyhow!(
                "scene {} has no download to convert",
                scene.scene_id
            )));
        }

        let product_dir = out_dir.join(&scene.scene_id);
        tokio::fs::create_dir_all(&product_dir)
            .await
            .map_err(StageError::transient)?;
        tokio::fs::create_dir_all(tmp_dir)
            .await
            .map_err(StageError::transient)?;

        let program = resolve_tool(&self.config.command)?;
        let download = scene.download_path.display().to_string();
        let output = product_dir.display().to_string();
        let tmp = tmp_dir.display().to_string();
        let replacements = [
            ("download", download.as_str()),
            ("output", output.as_str()),
            ("tmp", tmp.as_str()),
            ("scene_id", scene.scene_id.as_str()),
        ];

        run_tool(
            &program,
            &self.config.args,
            &replacements,
            self.config.num_threads,
            self.config.invalid_exit_code,
        )
        .await?;

        info!(scene_id = %scene.scene_id, path = %product_dir.display(), "ARD conversion complete");
        Ok(product_dir)
    }
}
