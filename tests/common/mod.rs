//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use eoacquire::adapters::{
    ArdConverter, ArdToolConfig, SceneDownloader, StageError, ZoomRange,
};
use eoacquire::archive::{ArchiveSearch, DiscoveredScene};
use eoacquire::config::{ArchiveConfig, SensorConfig, SensorPaths};
use eoacquire::models::{BoundingBox, Scene};
use eoacquire::repository::{run_migrations, AsyncSqlitePool};
use eoacquire::sensors::SensorKind;

/// A migrated SQLite database in a temp directory.
pub struct TestDb {
    pub dir: TempDir,
    pub pool: AsyncSqlitePool,
}

pub async fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = dir.path().join("eo.db").display().to_string();
    run_migrations(&url).await.expect("apply migrations");
    let pool = AsyncSqlitePool::new(&url);
    TestDb { dir, pool }
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// A discovered scene over a fixed Welsh footprint.
pub fn discovered(
    scene_id: &str,
    acquired_at: DateTime<Utc>,
    product_date: Option<DateTime<Utc>>,
) -> DiscoveredScene {
    DiscoveredScene {
        scene_id: scene_id.to_string(),
        platform: Some("Sentinel-2A".to_string()),
        instrument: Some("MSI".to_string()),
        acquired_at,
        product_date,
        north_lat: 53.4,
        south_lat: 51.3,
        east_lon: -2.6,
        west_lon: -5.4,
        cloud_cover: Some(20.0),
        remote_url: Some(format!("https://archive.example/{scene_id}.zip")),
        remote_filename: Some(format!("{scene_id}.zip")),
        remote_checksum: None,
        total_size: Some(4096),
    }
}

/// Sensor config pointing all paths into the test's temp directory.
pub fn sensor_config(kind: SensorKind, root: &Path) -> SensorConfig {
    SensorConfig {
        sensor: kind,
        paths: SensorPaths {
            download_dir: root.join("downloads").display().to_string(),
            ard_dir: root.join("ard").display().to_string(),
            tmp_dir: root.join("tmp").display().to_string(),
            quicklook_dir: None,
            tilecache_dir: None,
        },
        archive: ArchiveConfig {
            endpoint: "https://archive.example/search".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            region_of_interest: Some(BoundingBox {
                north: 54.0,
                south: 51.0,
                east: -2.0,
                west: -6.0,
            }),
            cloud_threshold: Some(80.0),
        },
        capabilities: None,
        ard: ArdToolConfig {
            command: PathBuf::from("true"),
            args: vec![],
            invalid_exit_code: None,
            num_threads: None,
        },
        quicklook: None,
        tilecache: None,
        tile_zoom: ZoomRange::default(),
        datacube: None,
        plugins: vec![],
    }
}

/// Archive fake returning a fixed scene list.
pub struct FakeArchive {
    pub scenes: Vec<DiscoveredScene>,
}

#[async_trait]
impl ArchiveSearch for FakeArchive {
    async fn search(
        &self,
        _sensor: SensorKind,
        since: DateTime<Utc>,
        _roi: Option<BoundingBox>,
    ) -> anyhow::Result<Vec<DiscoveredScene>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| s.acquired_at > since)
            .cloned()
            .collect())
    }
}

/// Downloader fake writing a small file instead of fetching anything.
pub struct FakeDownloader;

#[async_trait]
impl SceneDownloader for FakeDownloader {
    async fn fetch(&self, scene: &Scene, dest_dir: &Path) -> Result<PathBuf, StageError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(StageError::transient)?;
        let dest = dest_dir.join(format!("{}.zip", scene.scene_id));
        tokio::fs::write(&dest, b"scene bytes")
            .await
            .map_err(StageError::transient)?;
        Ok(dest)
    }
}

/// Downloader fake that always fails transiently.
pub struct BrokenDownloader;

#[async_trait]
impl SceneDownloader for BrokenDownloader {
    async fn fetch(&self, _scene: &Scene, _dest_dir: &Path) -> Result<PathBuf, StageError> {
        Err(StageError::Transient(anyhow::anyhow!("connection reset")))
    }
}

/// ARD converter fake creating the product directory with one file in it.
pub struct FakeArd;

#[async_trait]
impl ArdConverter for FakeArd {
    async fn convert(
        &self,
        scene: &Scene,
        out_dir: &Path,
        _tmp_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        let product = out_dir.join(&scene.scene_id);
        tokio::fs::create_dir_all(&product)
            .await
            .map_err(StageError::transient)?;
        tokio::fs::write(product.join("bands.tif"), b"ard bytes")
            .await
            .map_err(StageError::transient)?;
        Ok(product)
    }
}

/// ARD converter fake that rejects every scene permanently.
pub struct RejectingArd;

#[async_trait]
impl ArdConverter for RejectingArd {
    async fn convert(
        &self,
        _scene: &Scene,
        _out_dir: &Path,
        _tmp_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        Err(StageError::Permanent("cloud cover over threshold".to_string()))
    }
}

pub fn arc_archive(scenes: Vec<DiscoveredScene>) -> Arc<dyn ArchiveSearch> {
    Arc::new(FakeArchive { scenes })
}
