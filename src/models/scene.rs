//! Scene model for the per-sensor catalogue.
//!
//! One `Scene` is one discrete satellite acquisition, uniquely identified by
//! a natural key from the source archive plus a locally assigned surrogate
//! integer (the PID). Lifecycle flags record the scene's progress through the
//! fixed processing pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensors::SensorKind;

/// Extended-info key used for quicklook image entries.
pub const QUICKLOOK_KEY: &str = "quicklook";

/// Extended-info key used for tile-cache entries.
pub const TILECACHE_KEY: &str = "tilecache";

/// One step in the fixed per-scene pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    ArdConvert,
    Quicklook,
    Tilecache,
    DatacubeLoad,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::ArdConvert => "ard_convert",
            Self::Quicklook => "quicklook",
            Self::Tilecache => "tilecache",
            Self::DatacubeLoad => "datacube_load",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Check whether two boxes intersect.
    ///
    /// Treats longitudes as plain numbers; antimeridian-crossing scenes are
    /// stored split by the archives this tool talks to.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.south <= other.north
            && self.north >= other.south
            && self.west <= other.east
            && self.east >= other.west
    }
}

/// Where a scene can be fetched from at the source archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSource {
    /// Download URL or archive path.
    pub url: Option<String>,
    /// Filename to store the download under.
    pub filename: Option<String>,
    /// SHA-256 checksum of the remote file, when the archive publishes one.
    pub checksum: Option<String>,
    /// Expected size in bytes.
    pub size: Option<u64>,
}

/// One entry in a scene's extended info.
///
/// Known auxiliary artifacts get their own variants so callers keep
/// compile-time checking; `Raw` is the escape hatch for payloads this crate
/// has no schema for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtendedEntry {
    /// Quicklook browse image derived from the ARD product.
    Quicklook { path: PathBuf },
    /// XYZ tile cache derived from the ARD product.
    Tilecache {
        path: PathBuf,
        min_zoom: u32,
        max_zoom: u32,
    },
    /// Structured output written by a user plugin.
    PluginOutput { document: serde_json::Value },
    /// Unknown payload preserved verbatim.
    Raw { document: serde_json::Value },
}

/// Open bag of auxiliary derived artifacts attached to a scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtendedInfo(BTreeMap<String, ExtendedEntry>);

impl ExtendedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ExtendedEntry> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: ExtendedEntry) {
        self.0.insert(key.into(), entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<ExtendedEntry> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtendedEntry)> {
        self.0.iter()
    }

    /// Rewrite path prefixes inside quicklook/tilecache entries.
    ///
    /// Used when a catalogue is relocated between storage roots.
    pub fn remap_paths(&mut self, replacements: &BTreeMap<String, String>) {
        for entry in self.0.values_mut() {
            let path = match entry {
                ExtendedEntry::Quicklook { path } => path,
                ExtendedEntry::Tilecache { path, .. } => path,
                _ => continue,
            };
            let as_str = path.display().to_string();
            for (old, new) in replacements {
                if let Some(rest) = as_str.strip_prefix(old.as_str()) {
                    *path = PathBuf::from(format!("{new}{rest}"));
                    break;
                }
            }
        }
    }
}

/// One row of the scene catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Locally assigned surrogate identifier (stable reference everywhere).
    pub pid: i64,
    /// Sensor this scene belongs to.
    pub sensor: SensorKind,
    /// Natural key from the source archive (scene/product identifier).
    pub scene_id: String,
    /// Platform identifier (e.g. which satellite of a constellation).
    pub platform: Option<String>,
    /// Instrument identifier.
    pub instrument: Option<String>,
    /// Acquisition timestamp.
    pub acquired_at: DateTime<Utc>,
    /// Archive-side processing/product date, used for duplicate resolution.
    pub product_date: Option<DateTime<Utc>>,
    /// Scene footprint.
    pub bbox: BoundingBox,
    /// Cloud cover percentage reported by the archive, where applicable.
    pub cloud_cover: Option<f64>,
    /// Remote descriptor for the download stage.
    pub remote: RemoteSource,
    /// When discovery inserted this row.
    pub queried_at: DateTime<Utc>,
    pub download_start: Option<DateTime<Utc>>,
    pub download_end: Option<DateTime<Utc>>,
    pub downloaded: bool,
    /// Local path of the download, empty until downloaded.
    pub download_path: PathBuf,
    /// Download removed from local storage after successful ARD conversion.
    pub archived: bool,
    pub ard_start: Option<DateTime<Utc>>,
    pub ard_end: Option<DateTime<Utc>>,
    pub ard_processed: bool,
    /// ARD product output path, empty until processed.
    pub ard_path: PathBuf,
    pub datacube_start: Option<DateTime<Utc>>,
    pub datacube_end: Option<DateTime<Utc>>,
    pub datacube_loaded: bool,
    /// Terminal failure marker; excludes the scene from all pending lists.
    pub invalid: bool,
    /// Auxiliary derived artifacts (quicklooks, tile caches, plugin output).
    pub extended_info: ExtendedInfo,
}

impl Scene {
    /// Whether the completion flag for `stage` is set.
    pub fn has_stage(&self, stage: Stage) -> bool {
        match stage {
            Stage::Download => self.downloaded,
            Stage::ArdConvert => self.ard_processed,
            Stage::Quicklook => self.extended_info.contains(QUICKLOOK_KEY),
            Stage::Tilecache => self.extended_info.contains(TILECACHE_KEY),
            Stage::DatacubeLoad => self.datacube_loaded,
        }
    }

    /// Whether the precondition for running `stage` holds.
    ///
    /// Invalid scenes never satisfy any precondition. The catalogue, not the
    /// pipeline driver, is the source of truth for stage ordering: invoking
    /// stages out of order simply yields empty pending lists.
    pub fn eligible_for(&self, stage: Stage) -> bool {
        if self.invalid {
            return false;
        }
        match stage {
            Stage::Download => !self.downloaded,
            Stage::ArdConvert => self.downloaded && !self.ard_processed,
            Stage::Quicklook => self.ard_processed && !self.extended_info.contains(QUICKLOOK_KEY),
            Stage::Tilecache => self.ard_processed && !self.extended_info.contains(TILECACHE_KEY),
            Stage::DatacubeLoad => self.ard_processed && !self.datacube_loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scene() -> Scene {
        Scene {
            pid: 1,
            sensor: SensorKind::Sentinel2,
            scene_id: "S2A_TEST_0001".to_string(),
            platform: Some("Sentinel-2A".to_string()),
            instrument: Some("MSI".to_string()),
            acquired_at: Utc::now(),
            product_date: None,
            bbox: BoundingBox {
                north: 53.0,
                south: 52.0,
                east: -3.0,
                west: -4.0,
            },
            cloud_cover: Some(12.5),
            remote: RemoteSource::default(),
            queried_at: Utc::now(),
            download_start: None,
            download_end: None,
            downloaded: false,
            download_path: PathBuf::new(),
            archived: false,
            ard_start: None,
            ard_end: None,
            ard_processed: false,
            ard_path: PathBuf::new(),
            datacube_start: None,
            datacube_end: None,
            datacube_loaded: false,
            invalid: false,
            extended_info: ExtendedInfo::new(),
        }
    }

    #[test]
    fn test_stage_preconditions() {
        let mut scene = sample_scene();
        assert!(scene.eligible_for(Stage::Download));
        assert!(!scene.eligible_for(Stage::ArdConvert));
        assert!(!scene.eligible_for(Stage::DatacubeLoad));

        scene.downloaded = true;
        assert!(!scene.eligible_for(Stage::Download));
        assert!(scene.eligible_for(Stage::ArdConvert));

        scene.ard_processed = true;
        assert!(scene.eligible_for(Stage::DatacubeLoad));
        assert!(scene.eligible_for(Stage::Quicklook));

        scene
            .extended_info
            .insert(QUICKLOOK_KEY, ExtendedEntry::Quicklook {
                path: PathBuf::from("/data/ql/s2a.png"),
            });
        assert!(!scene.eligible_for(Stage::Quicklook));
        assert!(scene.eligible_for(Stage::Tilecache));
    }

    #[test]
    fn test_invalid_excludes_all_stages() {
        let mut scene = sample_scene();
        scene.downloaded = true;
        scene.ard_processed = true;
        scene.invalid = true;
        for stage in [
            Stage::Download,
            Stage::ArdConvert,
            Stage::Quicklook,
            Stage::Tilecache,
            Stage::DatacubeLoad,
        ] {
            assert!(!scene.eligible_for(stage), "invalid scene eligible for {stage}");
        }
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BoundingBox {
            north: 10.0,
            south: 0.0,
            east: 10.0,
            west: 0.0,
        };
        let b = BoundingBox {
            north: 15.0,
            south: 5.0,
            east: 15.0,
            west: 5.0,
        };
        let c = BoundingBox {
            north: -5.0,
            south: -10.0,
            east: -5.0,
            west: -10.0,
        };
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_extended_info_remap_paths() {
        let mut info = ExtendedInfo::new();
        info.insert(QUICKLOOK_KEY, ExtendedEntry::Quicklook {
            path: PathBuf::from("/old/root/ql/scene.png"),
        });
        info.insert("analysis", ExtendedEntry::Raw {
            document: serde_json::json!({"score": 0.9}),
        });

        let mut replacements = BTreeMap::new();
        replacements.insert("/old/root".to_string(), "/new/root".to_string());
        info.remap_paths(&replacements);

        match info.get(QUICKLOOK_KEY) {
            Some(ExtendedEntry::Quicklook { path }) => {
                assert_eq!(path, &PathBuf::from("/new/root/ql/scene.png"));
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        // Raw entries are untouched
        assert!(matches!(info.get("analysis"), Some(ExtendedEntry::Raw { .. })));
    }

    #[test]
    fn test_extended_entry_serialization_tagged() {
        let entry = ExtendedEntry::Quicklook {
            path: PathBuf::from("/data/ql.png"),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "quicklook");
        let back: ExtendedEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
