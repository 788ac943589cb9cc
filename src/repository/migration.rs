//! Catalogue export and import.
//!
//! The export format is one JSON object per sensor, keyed by PID, with all
//! scene fields as ISO-8601 timestamps and plain scalars. Import supports
//! remapping of file-path prefixes so a catalogue can be relocated between
//! storage roots.

use std::collections::BTreeMap;
use std::path::Path;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::ExtendedInfo;
use crate::schema::scenes;
use crate::sensors::SensorKind;

use super::models::SceneRecord;
use super::{AsyncSqlitePool, DieselError};

/// Portable scene record for catalogue transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortableScene {
    pub pid: i64,
    pub sensor: String,
    pub scene_id: String,
    pub platform: Option<String>,
    pub instrument: Option<String>,
    pub acquired_at: String,
    pub product_date: Option<String>,
    pub north_lat: f64,
    pub south_lat: f64,
    pub east_lon: f64,
    pub west_lon: f64,
    pub cloud_cover: Option<f64>,
    pub remote_url: Option<String>,
    pub remote_filename: Option<String>,
    pub remote_checksum: Option<String>,
    pub total_size: Option<i64>,
    pub queried_at: String,
    pub download_start: Option<String>,
    pub download_end: Option<String>,
    pub downloaded: bool,
    pub download_path: String,
    pub archived: bool,
    pub ard_start: Option<String>,
    pub ard_end: Option<String>,
    pub ard_processed: bool,
    pub ard_path: String,
    pub datacube_start: Option<String>,
    pub datacube_end: Option<String>,
    pub datacube_loaded: bool,
    pub invalid: bool,
    pub extended_info: Option<String>,
}

impl From<SceneRecord> for PortableScene {
    fn from(r: SceneRecord) -> Self {
        Self {
            pid: r.pid,
            sensor: r.sensor,
            scene_id: r.scene_id,
            platform: r.platform,
            instrument: r.instrument,
            acquired_at: r.acquired_at,
            product_date: r.product_date,
            north_lat: r.north_lat,
            south_lat: r.south_lat,
            east_lon: r.east_lon,
            west_lon: r.west_lon,
            cloud_cover: r.cloud_cover,
            remote_url: r.remote_url,
            remote_filename: r.remote_filename,
            remote_checksum: r.remote_checksum,
            total_size: r.total_size,
            queried_at: r.queried_at,
            download_start: r.download_start,
            download_end: r.download_end,
            downloaded: r.downloaded,
            download_path: r.download_path,
            archived: r.archived,
            ard_start: r.ard_start,
            ard_end: r.ard_end,
            ard_processed: r.ard_processed,
            ard_path: r.ard_path,
            datacube_start: r.datacube_start,
            datacube_end: r.datacube_end,
            datacube_loaded: r.datacube_loaded,
            invalid: r.invalid,
            extended_info: r.extended_info,
        }
    }
}

/// Exports one sensor's catalogue slice to a JSON file.
pub struct CatalogueExporter {
    pool: AsyncSqlitePool,
}

impl CatalogueExporter {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Write the sensor's scenes as a JSON object keyed by PID.
    pub async fn export_sensor(
        &self,
        sensor: SensorKind,
        out_path: &Path,
    ) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<SceneRecord> = scenes::table
            .filter(scenes::sensor.eq(sensor.as_str()))
            .order(scenes::pid.asc())
            .load(&mut conn)
            .await?;

        let mut keyed: BTreeMap<String, PortableScene> = BTreeMap::new();
        for record in records {
            keyed.insert(record.pid.to_string(), record.into());
        }
        let count = keyed.len() as u64;

        let json =
            serde_json::to_string_pretty(&keyed).map_err(super::util::to_diesel_error)?;
        std::fs::write(out_path, json).map_err(super::util::to_diesel_error)?;
        info!(sensor = %sensor, count, path = %out_path.display(), "exported catalogue");
        Ok(count)
    }
}

/// Imports a sensor's catalogue slice from a JSON export.
pub struct CatalogueImporter {
    pool: AsyncSqlitePool,
    /// Old-prefix to new-prefix path replacements applied on import.
    replacements: BTreeMap<String, String>,
}

impl CatalogueImporter {
    pub fn new(pool: AsyncSqlitePool, replacements: BTreeMap<String, String>) -> Self {
        Self { pool, replacements }
    }

    fn remap(&self, path: &str) -> String {
        for (old, new) in &self.replacements {
            if let Some(rest) = path.strip_prefix(old.as_str()) {
                return format!("{new}{rest}");
            }
        }
        path.to_string()
    }

    /// Load a JSON export, remapping path prefixes. Rows keep their PIDs;
    /// existing rows with the same PID are replaced.
    pub async fn import_sensor(
        &self,
        sensor: SensorKind,
        in_path: &Path,
    ) -> Result<u64, DieselError> {
        let raw = std::fs::read_to_string(in_path).map_err(super::util::to_diesel_error)?;
        let keyed: BTreeMap<String, PortableScene> =
            serde_json::from_str(&raw).map_err(super::util::to_diesel_error)?;

        let mut conn = self.pool.get().await?;
        let mut imported = 0u64;
        for scene in keyed.into_values() {
            if scene.sensor != sensor.as_str() {
                continue;
            }

            let download_path = self.remap(&scene.download_path);
            let ard_path = self.remap(&scene.ard_path);
            let extended_info = scene.extended_info.as_deref().map(|raw| {
                let mut info: ExtendedInfo =
                    serde_json::from_str(raw).unwrap_or_default();
                info.remap_paths(&self.replacements);
                serde_json::to_string(&info).unwrap_or_else(|_| raw.to_string())
            });

            diesel::replace_into(scenes::table)
                .values((
                    scenes::pid.eq(scene.pid),
                    scenes::sensor.eq(&scene.sensor),
                    scenes::scene_id.eq(&scene.scene_id),
                    scenes::platform.eq(&scene.platform),
                    scenes::instrument.eq(&scene.instrument),
                    scenes::acquired_at.eq(&scene.acquired_at),
                    scenes::product_date.eq(&scene.product_date),
                    scenes::north_lat.eq(scene.north_lat),
                    scenes::south_lat.eq(scene.south_lat),
                    scenes::east_lon.eq(scene.east_lon),
                    scenes::west_lon.eq(scene.west_lon),
                    scenes::cloud_cover.eq(scene.cloud_cover),
                    scenes::remote_url.eq(&scene.remote_url),
                    scenes::remote_filename.eq(&scene.remote_filename),
                    scenes::remote_checksum.eq(&scene.remote_checksum),
                    scenes::total_size.eq(scene.total_size),
                    scenes::queried_at.eq(&scene.queried_at),
                    scenes::download_start.eq(&scene.download_start),
                    scenes::download_end.eq(&scene.download_end),
                    scenes::downloaded.eq(scene.downloaded),
                    scenes::download_path.eq(download_path),
                    scenes::archived.eq(scene.archived),
                    scenes::ard_start.eq(&scene.ard_start),
                    scenes::ard_end.eq(&scene.ard_end),
                    scenes::ard_processed.eq(scene.ard_processed),
                    scenes::ard_path.eq(ard_path),
                    scenes::datacube_start.eq(&scene.datacube_start),
                    scenes::datacube_end.eq(&scene.datacube_end),
                    scenes::datacube_loaded.eq(scene.datacube_loaded),
                    scenes::invalid.eq(scene.invalid),
                    scenes::extended_info.eq(extended_info),
                ))
                .execute(&mut conn)
                .await?;
            imported += 1;
        }
        info!(sensor = %sensor, imported, path = %in_path.display(), "imported catalogue");
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_prefix() {
        let pool = AsyncSqlitePool::new(":memory:");
        let mut replacements = BTreeMap::new();
        replacements.insert("/mnt/old".to_string(), "/srv/new".to_string());
        let importer = CatalogueImporter::new(pool, replacements);

        assert_eq!(
            importer.remap("/mnt/old/downloads/scene.zip"),
            "/srv/new/downloads/scene.zip"
        );
        assert_eq!(importer.remap("/elsewhere/scene.zip"), "/elsewhere/scene.zip");
        assert_eq!(importer.remap(""), "");
    }
}
