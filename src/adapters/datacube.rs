//! Datacube ingestion adapter.
//!
//! Writes one YAML metadata document per ARD product into the product
//! directory and invokes the external ingestion CLI on it. The adapter
//! treats a successful subprocess exit as proof of ingestion; it does not
//! run a verification query against the datacube afterwards.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::Scene;

use super::{resolve_tool, run_tool, StageError};

/// Datacube load stage adapter.
#[async_trait]
pub trait DatacubeLoader: Send + Sync {
    /// Ingest the scene's ARD product into the datacube.
    async fn load(&self, scene: &Scene) -> Result<(), StageError>;
}

/// Configuration for the external ingestion CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacubeConfig {
    /// Ingestion CLI executable.
    pub command: PathBuf,
    /// Arguments; `{metadata}` expands to the written YAML document path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Product name the datacube indexes this sensor under.
    pub product: String,
}

/// Metadata document handed to the ingestion CLI.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatacubeMetadata {
    pub product: String,
    pub scene_id: String,
    pub platform: Option<String>,
    pub instrument: Option<String>,
    pub acquired_at: String,
    pub extent: DatacubeExtent,
    pub ard_path: PathBuf,
}

/// Geographic extent block of the metadata document.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatacubeExtent {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Datacube loader writing YAML metadata and invoking the ingestion CLI.
pub struct CommandDatacubeLoader {
    config: DatacubeConfig,
}

impl CommandDatacubeLoader {
    pub fn new(config: DatacubeConfig) -> Self {
        Self { config }
    }

    /// Build the metadata document for a scene.
    pub fn metadata_for(&self, scene: &Scene) -> DatacubeMetadata {
        DatacubeMetadata {
            product: self.config.product.clone(),
            scene_id: scene.scene_id.clone(),
            platform: scene.platform.clone(),
            instrument: scene.instrument.clone(),
            acquired_at: scene.acquired_at.to_rfc3339(),
            extent: DatacubeExtent {
                north: scene.bbox.north,
                south: scene.bbox.south,
                east: scene.bbox.east,
                west: scene.bbox.west,
            },
            ard_path: scene.ard_path.clone(),
        }
    }

    /// Write the metadata document into the ARD product directory.
    pub async fn write_metadata(&self, scene: &Scene) -> Result<PathBuf, StageError> {
        let metadata = self.metadata_for(scene);
        let yaml = serde_yaml::to_string(&metadata).map_err(StageError::transient)?;
        let path = metadata_path(&scene.ard_path);
        tokio::fs::write(&path, yaml)
            .await
            .map_err(StageError::transient)?;
        Ok(path)
    }
}

fn metadata_path(ard_path: &Path) -> PathBuf {
    ard_path.join("datacube-metadata.yaml")
}

#[async_trait]
impl DatacubeLoader for CommandDatacubeLoader {
    async fn load(&self, scene: &Scene) -> Result<(), StageError> {
        if !scene.ard_processed || scene.ard_path.as_os_str().is_empty() {
            return Err(StageError::Transient(anyhow::anyhow!(
                "scene {} has no ARD product to ingest",
                scene.scene_id
            )));
        }

        let metadata = self.write_metadata(scene).await?;
        let program = resolve_tool(&self.config.command)?;
        let metadata_str = metadata.display().to_string();
        let replacements = [("metadata", metadata_str.as_str())];
        run_tool(&program, &self.config.args, &replacements, None, None).await?;

        info!(scene_id = %scene.scene_id, product = %self.config.product, "scene ingested into datacube");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, ExtendedInfo, RemoteSource};
    use crate::sensors::SensorKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_metadata_document_round_trips_yaml() {
        let loader = CommandDatacubeLoader::new(DatacubeConfig {
            command: PathBuf::from("datacube"),
            args: vec!["dataset".into(), "add".into(), "{metadata}".into()],
            product: "s2_ard".to_string(),
        });
        let scene = Scene {
            pid: 9,
            sensor: SensorKind::Sentinel2,
            scene_id: "S2B_20240105".to_string(),
            platform: Some("Sentinel-2B".to_string()),
            instrument: Some("MSI".to_string()),
            acquired_at: Utc.with_ymd_and_hms(2024, 1, 5, 11, 0, 0).unwrap(),
            product_date: None,
            bbox: BoundingBox {
                north: 54.0,
                south: 53.0,
                east: -2.0,
                west: -3.0,
            },
            cloud_cover: Some(5.0),
            remote: RemoteSource::default(),
            queried_at: Utc::now(),
            download_start: None,
            download_end: None,
            downloaded: true,
            download_path: PathBuf::from("/data/dl/S2B_20240105.zip"),
            archived: false,
            ard_start: None,
            ard_end: None,
            ard_processed: true,
            ard_path: PathBuf::from("/data/ard/S2B_20240105"),
            datacube_start: None,
            datacube_end: None,
            datacube_loaded: false,
            invalid: false,
            extended_info: ExtendedInfo::new(),
        };

        let doc = loader.metadata_for(&scene);
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let back: DatacubeMetadata = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.product, "s2_ard");
        assert_eq!(back.scene_id, "S2B_20240105");
        assert_eq!(back.extent.north, 54.0);
        assert_eq!(back.ard_path, PathBuf::from("/data/ard/S2B_20240105"));
    }
}
