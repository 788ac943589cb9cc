//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.
//! Timestamps are stored as RFC 3339 TEXT columns; boolean lifecycle flags
//! map directly onto SQLite integers through Diesel's `Bool`.

use diesel::prelude::*;

use crate::models::{
    BoundingBox, ExtendedInfo, PluginRun, RemoteSource, Scene, UsageLogEntry,
};
use crate::schema;
use crate::sensors::SensorKind;

use super::{parse_datetime, parse_datetime_opt};

/// Scene record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scenes, primary_key(pid))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SceneRecord {
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

impl SceneRecord {
    /// Convert a database record into the domain model.
    ///
    /// An unreadable extended-info column degrades to an empty bag rather
    /// than failing the whole query.
    pub fn into_scene(self) -> Scene {
        let sensor = SensorKind::from_str(&self.sensor).unwrap_or(SensorKind::OtherDataset);
        let extended_info: ExtendedInfo = self
            .extended_info
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        Scene {
            pid: self.pid,
            sensor,
            scene_id: self.scene_id,
            platform: self.platform,
            instrument: self.instrument,
            acquired_at: parse_datetime(&self.acquired_at),
            product_date: parse_datetime_opt(self.product_date),
            bbox: BoundingBox {
                north: self.north_lat,
                south: self.south_lat,
                east: self.east_lon,
                west: self.west_lon,
            },
            cloud_cover: self.cloud_cover,
            remote: RemoteSource {
                url: self.remote_url,
                filename: self.remote_filename,
                checksum: self.remote_checksum,
                size: self.total_size.map(|s| s as u64),
            },
            queried_at: parse_datetime(&self.queried_at),
            download_start: parse_datetime_opt(self.download_start),
            download_end: parse_datetime_opt(self.download_end),
            downloaded: self.downloaded,
            download_path: self.download_path.into(),
            archived: self.archived,
            ard_start: parse_datetime_opt(self.ard_start),
            ard_end: parse_datetime_opt(self.ard_end),
            ard_processed: self.ard_processed,
            ard_path: self.ard_path.into(),
            datacube_start: parse_datetime_opt(self.datacube_start),
            datacube_end: parse_datetime_opt(self.datacube_end),
            datacube_loaded: self.datacube_loaded,
            invalid: self.invalid,
            extended_info,
        }
    }
}

/// New scene for insertion (all lifecycle flags default to false).
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scenes)]
pub struct NewScene<'a> {
    pub sensor: &'a str,
    pub scene_id: &'a str,
    pub platform: Option<&'a str>,
    pub instrument: Option<&'a str>,
    pub acquired_at: String,
    pub product_date: Option<String>,
    pub north_lat: f64,
    pub south_lat: f64,
    pub east_lon: f64,
    pub west_lon: f64,
    pub cloud_cover: Option<f64>,
    pub remote_url: Option<&'a str>,
    pub remote_filename: Option<&'a str>,
    pub remote_checksum: Option<&'a str>,
    pub total_size: Option<i64>,
    pub queried_at: String,
}

/// Plugin run record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::plugin_runs, primary_key(scene_pid, plugin_key))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PluginRunRecord {
    pub scene_pid: i64,
    pub plugin_key: String,
    pub completed: bool,
    pub success: bool,
    pub produced_artifacts: bool,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub output: Option<String>,
}

impl PluginRunRecord {
    pub fn into_plugin_run(self) -> PluginRun {
        PluginRun {
            scene_pid: self.scene_pid,
            plugin_key: self.plugin_key,
            completed: self.completed,
            success: self.success,
            produced_artifacts: self.produced_artifacts,
            error: self.error,
            started_at: parse_datetime_opt(self.started_at),
            finished_at: parse_datetime_opt(self.finished_at),
            output: self.output.as_deref().and_then(|o| serde_json::from_str(o).ok()),
        }
    }
}

/// New plugin run for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::plugin_runs)]
pub struct NewPluginRun<'a> {
    pub scene_pid: i64,
    pub plugin_key: &'a str,
    pub completed: bool,
    pub success: bool,
    pub produced_artifacts: bool,
    pub error: Option<&'a str>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub output: Option<String>,
}

/// Usage log record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::usage_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UsageLogRecord {
    pub id: i64,
    pub logged_at: String,
    pub sensor: String,
    pub description: String,
    pub updated_local_db: bool,
    pub found_new_scenes: bool,
    pub downloaded_scenes: bool,
    pub converted_ard: bool,
    pub loaded_datacube: bool,
    pub start_block: bool,
    pub end_block: bool,
}

impl UsageLogRecord {
    pub fn into_entry(self) -> UsageLogEntry {
        UsageLogEntry {
            logged_at: Some(parse_datetime(&self.logged_at)),
            sensor: self.sensor,
            description: self.description,
            updated_local_db: self.updated_local_db,
            found_new_scenes: self.found_new_scenes,
            downloaded_scenes: self.downloaded_scenes,
            converted_ard: self.converted_ard,
            loaded_datacube: self.loaded_datacube,
            start_block: self.start_block,
            end_block: self.end_block,
        }
    }
}

/// New usage log entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::usage_log)]
pub struct NewUsageLog<'a> {
    pub logged_at: String,
    pub sensor: &'a str,
    pub description: &'a str,
    pub updated_local_db: bool,
    pub found_new_scenes: bool,
    pub downloaded_scenes: bool,
    pub converted_ard: bool,
    pub loaded_datacube: bool,
    pub start_block: bool,
    pub end_block: bool,
}

/// Config signature record.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::config_signatures, primary_key(name))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConfigSignatureRecord {
    pub name: String,
    pub sig_hash: String,
    pub updated_at: String,
}

/// New config signature for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::config_signatures)]
pub struct NewConfigSignature<'a> {
    pub name: &'a str,
    pub sig_hash: &'a str,
    pub updated_at: String,
}

