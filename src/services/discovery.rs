//! Scene discovery against the remote archive.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{debug, info};

use crate::archive::ArchiveSearch;
use crate::config::ArchiveConfig;
use crate::models::UsageLogEntry;
use crate::repository::{ClosestProductDate, SceneCatalogue, UsageLogRepository};
use crate::sensors::SensorCapabilities;

/// What one discovery pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Scenes reported by the archive for the query window.
    pub reported: u64,
    /// Scenes inserted as new catalogue rows.
    pub inserted: u64,
    /// Scenes skipped because their natural key was already known.
    pub already_known: u64,
    /// Scenes dropped by the cloud threshold or region of interest.
    pub filtered: u64,
    /// Duplicate rows removed after insertion.
    pub duplicates_removed: u64,
}

/// Finds new scenes at the archive and registers them in the catalogue.
///
/// Discovery is idempotent: re-running the same window inserts nothing new
/// because natural keys already present are skipped, and the duplicate
/// resolution pass afterwards is deterministic.
pub struct DiscoveryService {
    catalogue: SceneCatalogue,
    usage: UsageLogRepository,
    archive: Arc<dyn ArchiveSearch>,
    config: ArchiveConfig,
    capabilities: SensorCapabilities,
}

impl DiscoveryService {
    pub fn new(
        catalogue: SceneCatalogue,
        usage: UsageLogRepository,
        archive: Arc<dyn ArchiveSearch>,
        config: ArchiveConfig,
        capabilities: SensorCapabilities,
    ) -> Self {
        Self {
            catalogue,
            usage,
            archive,
            config,
            capabilities,
        }
    }

    /// The acquisition watermark the next search should start from.
    ///
    /// Normally the newest acquisition already catalogued; the configured
    /// start date when the catalogue is empty or `check_from_start` forces a
    /// full re-scan.
    pub async fn watermark(&self, check_from_start: bool) -> anyhow::Result<DateTime<Utc>> {
        let floor = self
            .config
            .start_date
            .and_time(NaiveTime::MIN)
            .and_utc();
        if check_from_start {
            return Ok(floor);
        }
        Ok(self.catalogue.latest_acquisition().await?.unwrap_or(floor))
    }

    /// Query the archive and insert scenes the catalogue has not seen.
    pub async fn find_new(&self, check_from_start: bool) -> anyhow::Result<DiscoveryReport> {
        let sensor = self.catalogue.sensor();
        self.usage
            .add_entry(&UsageLogEntry {
                updated_local_db: true,
                found_new_scenes: true,
                ..UsageLogEntry::start(sensor.as_str(), "scene discovery")
            })
            .await?;

        let since = self.watermark(check_from_start).await?;
        let roi = self.config.region_of_interest;
        info!(%sensor, since = %since, "querying archive for new scenes");

        let discovered = self.archive.search(sensor, since, roi).await?;
        let known = self.catalogue.known_natural_keys().await?;

        let mut report = DiscoveryReport {
            reported: discovered.len() as u64,
            ..DiscoveryReport::default()
        };

        for scene in &discovered {
            if let Some(roi) = &roi {
                if !roi.intersects(&scene.bbox()) {
                    report.filtered += 1;
                    continue;
                }
            }
            if self.capabilities.cloud_cover {
                if let (Some(threshold), Some(cover)) =
                    (self.config.cloud_threshold, scene.cloud_cover)
                {
                    if cover > f64::from(threshold) {
                        debug!(scene_id = %scene.scene_id, cover, "over cloud threshold");
                        report.filtered += 1;
                        continue;
                    }
                }
            }
            if known.contains(&scene.scene_id) {
                report.already_known += 1;
                continue;
            }
            self.catalogue.insert_scene(scene).await?;
            report.inserted += 1;
        }

        report.duplicates_removed = self
            .catalogue
            .resolve_duplicates(&ClosestProductDate)
            .await?;

        self.usage
            .add_entry(&UsageLogEntry {
                updated_local_db: true,
                found_new_scenes: report.inserted > 0,
                ..UsageLogEntry::end(
                    sensor.as_str(),
                    format!("scene discovery found {} new scenes", report.inserted),
                )
            })
            .await?;

        info!(
            %sensor,
            inserted = report.inserted,
            known = report.already_known,
            filtered = report.filtered,
            "discovery pass complete"
        );
        Ok(report)
    }
}
