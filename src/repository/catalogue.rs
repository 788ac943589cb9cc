//! Scene catalogue and lifecycle state machine.
//!
//! One `SceneCatalogue` is scoped to a single sensor's slice of the `scenes`
//! table. All lifecycle transitions are single-row updates keyed by PID, so
//! concurrent workers operating on different PIDs never conflict. The
//! catalogue, not the pipeline driver, enforces stage ordering: each pending
//! list applies the stage's precondition filter, and invalid scenes are
//! excluded everywhere.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{debug, info, warn};

use crate::archive::DiscoveredScene;
use crate::models::{ExtendedEntry, ExtendedInfo, Scene, Stage};
use crate::schema::scenes;
use crate::sensors::SensorKind;

use super::models::{NewScene, SceneRecord};
use super::{format_datetime, AsyncSqlitePool, DieselError};

/// Picks which scene to keep when several rows share a natural key.
///
/// Re-querying an archive can legitimately return the same scene with a
/// newer processing date; the policy decides which duplicate survives.
pub trait DuplicatePolicy: Send + Sync {
    /// Return the PID to keep from `candidates` (all sharing one natural key).
    fn select_keeper(&self, now: DateTime<Utc>, candidates: &[Scene]) -> i64;
}

/// Default policy: keep the scene whose product date is numerically closest
/// to `now`, falling back to the acquisition date when the archive reported
/// no product date. Ties break to the first-encountered (lowest PID).
pub struct ClosestProductDate;

impl DuplicatePolicy for ClosestProductDate {
    fn select_keeper(&self, now: DateTime<Utc>, candidates: &[Scene]) -> i64 {
        candidates
            .iter()
            .min_by_key(|scene| {
                let reference = scene.product_date.unwrap_or(scene.acquired_at);
                let distance = (now - reference).num_seconds().abs();
                (distance, scene.pid)
            })
            .map(|scene| scene.pid)
            .expect("select_keeper called with no candidates")
    }
}

/// Per-sensor scene catalogue backed by SQLite.
#[derive(Clone)]
pub struct SceneCatalogue {
    pool: AsyncSqlitePool,
    sensor: SensorKind,
}

impl SceneCatalogue {
    /// Create a catalogue scoped to one sensor.
    pub fn new(pool: AsyncSqlitePool, sensor: SensorKind) -> Self {
        Self { pool, sensor }
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    fn sensor_str(&self) -> &'static str {
        self.sensor.as_str()
    }

    /// Count all scenes for this sensor.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    /// All PIDs for this sensor, ascending.
    pub async fn all_pids(&self) -> Result<Vec<i64>, DieselError> {
        let mut conn = self.pool.get().await?;
        scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .order(scenes::pid.asc())
            .select(scenes::pid)
            .load(&mut conn)
            .await
    }

    /// Fetch one scene by PID.
    pub async fn get_scene(&self, pid: i64) -> Result<Option<Scene>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<SceneRecord> = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::pid.eq(pid))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(SceneRecord::into_scene))
    }

    /// Natural keys already present in the catalogue.
    pub async fn known_natural_keys(&self) -> Result<HashSet<String>, DieselError> {
        let mut conn = self.pool.get().await?;
        let keys: Vec<String> = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .select(scenes::scene_id)
            .load(&mut conn)
            .await?;
        Ok(keys.into_iter().collect())
    }

    /// The newest acquisition timestamp known for this sensor.
    pub async fn latest_acquisition(&self) -> Result<Option<DateTime<Utc>>, DieselError> {
        let mut conn = self.pool.get().await?;
        let latest: Option<String> = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .order(scenes::acquired_at.desc())
            .select(scenes::acquired_at)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(latest.map(|s| super::parse_datetime(&s)))
    }

    /// Insert a newly discovered scene and return its PID.
    ///
    /// All lifecycle flags start false; `queried_at` records the discovery
    /// time.
    pub async fn insert_scene(&self, discovered: &DiscoveredScene) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;
        let new_scene = NewScene {
            sensor: self.sensor_str(),
            scene_id: &discovered.scene_id,
            platform: discovered.platform.as_deref(),
            instrument: discovered.instrument.as_deref(),
            acquired_at: format_datetime(&discovered.acquired_at),
            product_date: super::format_datetime_opt(&discovered.product_date),
            north_lat: discovered.north_lat,
            south_lat: discovered.south_lat,
            east_lon: discovered.east_lon,
            west_lon: discovered.west_lon,
            cloud_cover: discovered.cloud_cover,
            remote_url: discovered.remote_url.as_deref(),
            remote_filename: discovered.remote_filename.as_deref(),
            remote_checksum: discovered.remote_checksum.as_deref(),
            total_size: discovered.total_size,
            queried_at: format_datetime(&Utc::now()),
        };

        diesel::insert_into(scenes::table)
            .values(&new_scene)
            .execute(&mut conn)
            .await?;

        // AUTOINCREMENT is monotonic, so the newest row for this key is ours.
        let pid: i64 = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::scene_id.eq(&discovered.scene_id))
            .order(scenes::pid.desc())
            .select(scenes::pid)
            .first(&mut conn)
            .await?;
        debug!(sensor = %self.sensor, scene_id = %discovered.scene_id, pid, "inserted scene");
        Ok(pid)
    }

    /// Resolve duplicate natural keys, keeping one row per key.
    ///
    /// Returns the number of rows deleted.
    pub async fn resolve_duplicates(
        &self,
        policy: &dyn DuplicatePolicy,
    ) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<SceneRecord> = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .order(scenes::pid.asc())
            .load(&mut conn)
            .await?;

        let mut by_key: BTreeMap<String, Vec<Scene>> = BTreeMap::new();
        for record in records {
            let scene = record.into_scene();
            by_key.entry(scene.scene_id.clone()).or_default().push(scene);
        }

        let now = Utc::now();
        let mut removed = 0u64;
        for (key, candidates) in by_key {
            if candidates.len() < 2 {
                continue;
            }
            let keeper = policy.select_keeper(now, &candidates);
            let losers: Vec<i64> = candidates
                .iter()
                .map(|s| s.pid)
                .filter(|pid| *pid != keeper)
                .collect();
            info!(
                sensor = %self.sensor,
                scene_id = %key,
                keeper,
                removed = losers.len(),
                "resolved duplicate natural key"
            );
            removed += diesel::delete(
                scenes::table
                    .filter(scenes::sensor.eq(self.sensor_str()))
                    .filter(scenes::pid.eq_any(&losers)),
            )
            .execute(&mut conn)
            .await? as u64;
        }
        Ok(removed)
    }

    /// PIDs where the precondition for `stage` holds, the stage's completion
    /// flag is false and the scene is not invalid.
    pub async fn list_pending(&self, stage: Stage) -> Result<Vec<i64>, DieselError> {
        let mut conn = self.pool.get().await?;
        let base = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::invalid.eq(false))
            .order(scenes::pid.asc());

        match stage {
            Stage::Download => {
                base.filter(scenes::downloaded.eq(false))
                    .select(scenes::pid)
                    .load(&mut conn)
                    .await
            }
            Stage::ArdConvert => {
                base.filter(scenes::downloaded.eq(true))
                    .filter(scenes::ard_processed.eq(false))
                    .select(scenes::pid)
                    .load(&mut conn)
                    .await
            }
            Stage::DatacubeLoad => {
                base.filter(scenes::ard_processed.eq(true))
                    .filter(scenes::datacube_loaded.eq(false))
                    .select(scenes::pid)
                    .load(&mut conn)
                    .await
            }
            // Quicklook and tilecache completion lives in extended_info, so
            // candidates are narrowed in SQL and finished in Rust.
            Stage::Quicklook | Stage::Tilecache => {
                let records: Vec<SceneRecord> = base
                    .filter(scenes::ard_processed.eq(true))
                    .load(&mut conn)
                    .await?;
                Ok(records
                    .into_iter()
                    .map(SceneRecord::into_scene)
                    .filter(|scene| scene.eligible_for(stage))
                    .map(|scene| scene.pid)
                    .collect())
            }
        }
    }

    /// Record a successful stage completion.
    ///
    /// `artifact_path` is the download or ARD output path for those stages
    /// and is ignored for the datacube load, which produces no local
    /// artifact. Quicklook and tilecache completion goes through
    /// [`Self::set_extended_entry`] instead.
    pub async fn mark_stage_complete(
        &self,
        pid: i64,
        stage: Stage,
        artifact_path: &Path,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let target = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::pid.eq(pid));
        let path = artifact_path.display().to_string();
        let updated = match stage {
            Stage::Download => {
                diesel::update(target)
                    .set((
                        scenes::downloaded.eq(true),
                        scenes::download_path.eq(path),
                        scenes::download_start.eq(format_datetime(&start)),
                        scenes::download_end.eq(format_datetime(&end)),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            Stage::ArdConvert => {
                diesel::update(target)
                    .set((
                        scenes::ard_processed.eq(true),
                        scenes::ard_path.eq(path),
                        scenes::ard_start.eq(format_datetime(&start)),
                        scenes::ard_end.eq(format_datetime(&end)),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            Stage::DatacubeLoad => {
                diesel::update(target)
                    .set((
                        scenes::datacube_loaded.eq(true),
                        scenes::datacube_start.eq(format_datetime(&start)),
                        scenes::datacube_end.eq(format_datetime(&end)),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            Stage::Quicklook | Stage::Tilecache => {
                return Err(super::util::to_diesel_error(format!(
                    "stage {stage} completes through set_extended_entry"
                )));
            }
        };
        if updated == 0 {
            return Err(DieselError::NotFound);
        }
        debug!(sensor = %self.sensor, pid, %stage, "marked stage complete");
        Ok(())
    }

    /// Insert or replace one extended-info entry on a scene.
    pub async fn set_extended_entry(
        &self,
        pid: i64,
        key: &str,
        entry: ExtendedEntry,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let raw: Option<Option<String>> = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::pid.eq(pid))
            .select(scenes::extended_info)
            .first(&mut conn)
            .await
            .optional()?;
        let Some(raw) = raw else {
            return Err(DieselError::NotFound);
        };

        let mut info: ExtendedInfo = raw
            .as_deref()
            .and_then(|r| serde_json::from_str(r).ok())
            .unwrap_or_default();
        info.insert(key, entry);
        let serialized = serde_json::to_string(&info).map_err(super::util::to_diesel_error)?;

        diesel::update(
            scenes::table
                .filter(scenes::sensor.eq(self.sensor_str()))
                .filter(scenes::pid.eq(pid)),
        )
        .set(scenes::extended_info.eq(serialized))
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Permanently exclude a scene from all pending lists.
    pub async fn mark_invalid(&self, pid: i64) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            scenes::table
                .filter(scenes::sensor.eq(self.sensor_str()))
                .filter(scenes::pid.eq(pid)),
        )
        .set(scenes::invalid.eq(true))
        .execute(&mut conn)
        .await?;
        if updated == 0 {
            return Err(DieselError::NotFound);
        }
        warn!(sensor = %self.sensor, pid, "scene marked invalid");
        Ok(())
    }

    /// Record that the local download was removed after successful processing.
    pub async fn mark_archived(&self, pid: i64) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(
            scenes::table
                .filter(scenes::sensor.eq(self.sensor_str()))
                .filter(scenes::pid.eq(pid)),
        )
        .set(scenes::archived.eq(true))
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Reverse a scene's lifecycle flags to force reprocessing.
    ///
    /// Deletes the ARD output directory (and optionally the download) from
    /// disk when present, and always clears extended info. `reset_invalid`
    /// additionally clears the terminal failure marker.
    pub async fn reset(
        &self,
        pid: i64,
        remove_download: bool,
        reset_invalid: bool,
    ) -> Result<(), DieselError> {
        let scene = self.get_scene(pid).await?.ok_or(DieselError::NotFound)?;

        if scene.ard_processed {
            remove_artifact(&scene.ard_path);
        }
        if remove_download && scene.downloaded {
            remove_artifact(&scene.download_path);
        }

        let mut conn = self.pool.get().await?;
        let target = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::pid.eq(pid));

        let none: Option<String> = None;
        diesel::update(target)
            .set((
                scenes::ard_processed.eq(false),
                scenes::ard_path.eq(""),
                scenes::ard_start.eq(none.clone()),
                scenes::ard_end.eq(none.clone()),
                scenes::datacube_loaded.eq(false),
                scenes::datacube_start.eq(none.clone()),
                scenes::datacube_end.eq(none.clone()),
                scenes::extended_info.eq(none.clone()),
            ))
            .execute(&mut conn)
            .await?;

        if remove_download {
            diesel::update(
                scenes::table
                    .filter(scenes::sensor.eq(self.sensor_str()))
                    .filter(scenes::pid.eq(pid)),
            )
            .set((
                scenes::downloaded.eq(false),
                scenes::download_path.eq(""),
                scenes::download_start.eq(none.clone()),
                scenes::download_end.eq(none.clone()),
                scenes::archived.eq(false),
            ))
            .execute(&mut conn)
            .await?;
        }

        if reset_invalid {
            diesel::update(
                scenes::table
                    .filter(scenes::sensor.eq(self.sensor_str()))
                    .filter(scenes::pid.eq(pid)),
            )
            .set(scenes::invalid.eq(false))
            .execute(&mut conn)
            .await?;
        }

        info!(sensor = %self.sensor, pid, remove_download, reset_invalid, "scene reset");
        Ok(())
    }

    /// Delete one scene row.
    pub async fn delete_scene(&self, pid: i64) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(
            scenes::table
                .filter(scenes::sensor.eq(self.sensor_str()))
                .filter(scenes::pid.eq(pid)),
        )
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Delete scenes whose footprint does not intersect the region of
    /// interest. Returns the number removed.
    pub async fn remove_outside_bbox(
        &self,
        roi: crate::models::BoundingBox,
    ) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let removed = diesel::delete(
            scenes::table
                .filter(scenes::sensor.eq(self.sensor_str()))
                .filter(
                    scenes::south_lat
                        .gt(roi.north)
                        .or(scenes::north_lat.lt(roi.south))
                        .or(scenes::west_lon.gt(roi.east))
                        .or(scenes::east_lon.lt(roi.west)),
                ),
        )
        .execute(&mut conn)
        .await? as u64;
        if removed > 0 {
            info!(sensor = %self.sensor, removed, "removed scenes outside region of interest");
        }
        Ok(removed)
    }

    /// Scenes acquired within `[start, end]`, newest first, paginated.
    #[allow(clippy::too_many_arguments)]
    pub async fn query_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        valid_only: bool,
        cloud_threshold: Option<f64>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Scene>, DieselError> {
        let mut conn = self.pool.get().await?;
        let mut query = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::acquired_at.ge(format_datetime(&start)))
            .filter(scenes::acquired_at.le(format_datetime(&end)))
            .order(scenes::acquired_at.desc())
            .offset(offset)
            .limit(limit)
            .into_boxed();
        if valid_only {
            query = query.filter(scenes::invalid.eq(false));
        }
        if let Some(threshold) = cloud_threshold {
            query = query.filter(scenes::cloud_cover.le(threshold));
        }
        let records: Vec<SceneRecord> = query.load(&mut conn).await?;
        Ok(records.into_iter().map(SceneRecord::into_scene).collect())
    }

    /// Count matching [`Self::query_date_range`] without pagination.
    pub async fn query_date_range_count(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        valid_only: bool,
        cloud_threshold: Option<f64>,
    ) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let mut query = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::acquired_at.ge(format_datetime(&start)))
            .filter(scenes::acquired_at.le(format_datetime(&end)))
            .count()
            .into_boxed();
        if valid_only {
            query = query.filter(scenes::invalid.eq(false));
        }
        if let Some(threshold) = cloud_threshold {
            query = query.filter(scenes::cloud_cover.le(threshold));
        }
        let count: i64 = query.get_result(&mut conn).await?;
        Ok(count as u64)
    }

    /// Scenes within a date range whose footprint intersects `bbox`,
    /// newest first, paginated.
    #[allow(clippy::too_many_arguments)]
    pub async fn query_date_range_bbox(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bbox: crate::models::BoundingBox,
        valid_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Scene>, DieselError> {
        let mut conn = self.pool.get().await?;
        let mut query = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::acquired_at.ge(format_datetime(&start)))
            .filter(scenes::acquired_at.le(format_datetime(&end)))
            .filter(scenes::south_lat.le(bbox.north))
            .filter(scenes::north_lat.ge(bbox.south))
            .filter(scenes::west_lon.le(bbox.east))
            .filter(scenes::east_lon.ge(bbox.west))
            .order(scenes::acquired_at.desc())
            .offset(offset)
            .limit(limit)
            .into_boxed();
        if valid_only {
            query = query.filter(scenes::invalid.eq(false));
        }
        let records: Vec<SceneRecord> = query.load(&mut conn).await?;
        Ok(records.into_iter().map(SceneRecord::into_scene).collect())
    }

    /// Distinct acquisition dates within a range, newest first.
    pub async fn unique_dates(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        platform: Option<&str>,
    ) -> Result<Vec<NaiveDate>, DieselError> {
        let mut conn = self.pool.get().await?;
        let mut query = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::invalid.eq(false))
            .filter(scenes::acquired_at.ge(format_datetime(&start)))
            .filter(scenes::acquired_at.le(format_datetime(&end)))
            .order(scenes::acquired_at.desc())
            .select(scenes::acquired_at)
            .into_boxed();
        if let Some(platform) = platform {
            query = query.filter(scenes::platform.eq(platform));
        }
        let stamps: Vec<String> = query.load(&mut conn).await?;

        let mut dates = Vec::new();
        for stamp in stamps {
            let date = super::parse_datetime(&stamp).date_naive();
            if dates.last() != Some(&date) {
                dates.push(date);
            }
        }
        Ok(dates)
    }

    /// All valid scenes acquired on one calendar day.
    pub async fn scenes_for_date(
        &self,
        date: NaiveDate,
        platform: Option<&str>,
    ) -> Result<Vec<Scene>, DieselError> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let mut conn = self.pool.get().await?;
        let mut query = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .filter(scenes::invalid.eq(false))
            .filter(scenes::acquired_at.ge(format_datetime(&day_start)))
            .filter(scenes::acquired_at.lt(format_datetime(&day_end)))
            .order(scenes::acquired_at.desc())
            .into_boxed();
        if let Some(platform) = platform {
            query = query.filter(scenes::platform.eq(platform));
        }
        let records: Vec<SceneRecord> = query.load(&mut conn).await?;
        Ok(records.into_iter().map(SceneRecord::into_scene).collect())
    }

    /// Replace a path prefix on all download paths. Returns rows changed.
    pub async fn remap_download_paths(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, DieselError> {
        self.remap_paths(old_prefix, new_prefix, true).await
    }

    /// Replace a path prefix on all ARD product paths. Returns rows changed.
    pub async fn remap_ard_paths(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, DieselError> {
        self.remap_paths(old_prefix, new_prefix, false).await
    }

    async fn remap_paths(
        &self,
        old_prefix: &str,
        new_prefix: &str,
        download: bool,
    ) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<SceneRecord> = scenes::table
            .filter(scenes::sensor.eq(self.sensor_str()))
            .load(&mut conn)
            .await?;

        let mut changed = 0u64;
        for record in records {
            let current = if download {
                &record.download_path
            } else {
                &record.ard_path
            };
            let Some(rest) = current.strip_prefix(old_prefix) else {
                continue;
            };
            let updated_path = format!("{new_prefix}{rest}");
            let target = scenes::table
                .filter(scenes::sensor.eq(self.sensor_str()))
                .filter(scenes::pid.eq(record.pid));
            if download {
                diesel::update(target)
                    .set(scenes::download_path.eq(updated_path))
                    .execute(&mut conn)
                    .await?;
            } else {
                diesel::update(target)
                    .set(scenes::ard_path.eq(updated_path))
                    .execute(&mut conn)
                    .await?;
            }
            changed += 1;
        }
        Ok(changed)
    }

}

/// Best-effort removal of an on-disk artifact during reset.
fn remove_artifact(path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to remove artifact during reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scene_with(pid: i64, product_date: Option<DateTime<Utc>>) -> Scene {
        Scene {
            pid,
            sensor: SensorKind::Sentinel2,
            scene_id: "DUP".to_string(),
            platform: None,
            instrument: None,
            acquired_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            product_date,
            bbox: crate::models::BoundingBox {
                north: 1.0,
                south: 0.0,
                east: 1.0,
                west: 0.0,
            },
            cloud_cover: None,
            remote: Default::default(),
            queried_at: Utc::now(),
            download_start: None,
            download_end: None,
            downloaded: false,
            download_path: Default::default(),
            archived: false,
            ard_start: None,
            ard_end: None,
            ard_processed: false,
            ard_path: Default::default(),
            datacube_start: None,
            datacube_end: None,
            datacube_loaded: false,
            invalid: false,
            extended_info: Default::default(),
        }
    }

    #[test]
    fn test_duplicate_policy_prefers_closest_product_date() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let older = scene_with(1, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let newer = scene_with(2, Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        let keeper = ClosestProductDate.select_keeper(now, &[older, newer]);
        assert_eq!(keeper, 2);
    }

    #[test]
    fn test_duplicate_policy_tie_breaks_to_lowest_pid() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let date = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let a = scene_with(7, Some(date));
        let b = scene_with(3, Some(date));
        let keeper = ClosestProductDate.select_keeper(now, &[a, b]);
        assert_eq!(keeper, 3);
    }

    #[test]
    fn test_duplicate_policy_falls_back_to_acquisition() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let no_product = scene_with(1, None);
        let with_product = scene_with(2, Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        let keeper = ClosestProductDate.select_keeper(now, &[no_product, with_product]);
        assert_eq!(keeper, 2);
    }
}
