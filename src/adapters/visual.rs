//! Quicklook and tile-cache adapters.
//!
//! Both derive browse products from the ARD output via an external imaging
//! tool and record their results as extended-info entries on the scene.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ExtendedEntry, Scene};

use super::{resolve_tool, run_tool, StageError};

/// Quicklook generation stage adapter.
#[async_trait]
pub trait QuicklookGenerator: Send + Sync {
    /// Produce a browse image for the scene's ARD product.
    async fn generate(&self, scene: &Scene, out_dir: &Path) -> Result<ExtendedEntry, StageError>;
}

/// Tile-cache generation stage adapter.
#[async_trait]
pub trait TilecacheGenerator: Send + Sync {
    /// Produce an XYZ tile cache for the scene's ARD product.
    async fn generate(&self, scene: &Scene, out_dir: &Path) -> Result<ExtendedEntry, StageError>;
}

/// Configuration shared by the command-based visual adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualToolConfig {
    pub command: PathBuf,
    /// `{ard}`, `{output}` and `{scene_id}` placeholders are expanded.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Tile zoom range for the tile-cache adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min_zoom: u32,
    pub max_zoom: u32,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self {
            min_zoom: 6,
            max_zoom: 14,
        }
    }
}

/// Quicklook generator invoking an external imaging command.
pub struct CommandQuicklook {
    config: VisualToolConfig,
}

impl CommandQuicklook {
    pub fn new(config: VisualToolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl QuicklookGenerator for CommandQuicklook {
    async fn generate(&self, scene: &Scene, out_dir: &Path) -> Result<ExtendedEntry, StageError> {
        let image_path = run_visual(&self.config, scene, out_dir, "png").await?;
        Ok(ExtendedEntry::Quicklook { path: image_path })
    }
}

/// Tile-cache generator invoking an external imaging command.
pub struct CommandTilecache {
    config: VisualToolConfig,
    zoom: ZoomRange,
}

impl CommandTilecache {
    pub fn new(config: VisualToolConfig, zoom: ZoomRange) -> Self {
        Self { config, zoom }
    }
}

#[async_trait]
impl TilecacheGenerator for CommandTilecache {
    async fn generate(&self, scene: &Scene, out_dir: &Path) -> Result<ExtendedEntry, StageError> {
        let cache_path = run_visual(&self.config, scene, out_dir, "tiles").await?;
        Ok(ExtendedEntry::Tilecache {
            path: cache_path,
            min_zoom: self.zoom.min_zoom,
            max_zoom: self.zoom.max_zoom,
        })
    }
}

async fn run_visual(
    config: &VisualToolConfig,
    scene: &Scene,
    out_dir: &Path,
    suffix: &str,
) -> Result<PathBuf, StageError> {
    if !scene.ard_processed || scene.ard_path.as_os_str().is_empty() {
        return Err(StageError::Transient(anyhow::anyhow!(
            "scene {} has no ARD product",
            scene.scene_id
        )));
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(StageError::transient)?;
    let out_path = out_dir.join(format!("{}.{suffix}", scene.scene_id));

    let program = resolve_tool(&config.command)?;
    let ard = scene.ard_path.display().to_string();
    let output = out_path.display().to_string();
    let replacements = [
        ("ard", ard.as_str()),
        ("output", output.as_str()),
        ("scene_id", scene.scene_id.as_str()),
    ];
    run_tool(&program, &config.args, &replacements, None, None).await?;
    Ok(out_path)
}
