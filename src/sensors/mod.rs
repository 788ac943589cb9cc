//! Sensor definitions and capability descriptors.
//!
//! The per-sensor catalogue logic is generic; what varies between sensors is
//! captured declaratively here: the natural-key label, the default platform
//! and the set of pipeline capabilities each sensor supports. Callers branch
//! on capability flags rather than catching "not implemented" failures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Landsat,
    Sentinel1,
    Sentinel2,
    JaxaSarTiles,
    /// Generic dataset without sensor-specific discovery metadata.
    OtherDataset,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landsat => "landsat",
            Self::Sentinel1 => "sentinel1",
            Self::Sentinel2 => "sentinel2",
            Self::JaxaSarTiles => "jaxa_sar_tiles",
            Self::OtherDataset => "other_dataset",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "landsat" => Some(Self::Landsat),
            "sentinel1" => Some(Self::Sentinel1),
            "sentinel2" => Some(Self::Sentinel2),
            "jaxa_sar_tiles" => Some(Self::JaxaSarTiles),
            "other_dataset" => Some(Self::OtherDataset),
            _ => None,
        }
    }

    /// All sensor kinds, in catalogue order.
    pub fn all() -> &'static [SensorKind] {
        &[
            Self::Landsat,
            Self::Sentinel1,
            Self::Sentinel2,
            Self::JaxaSarTiles,
            Self::OtherDataset,
        ]
    }

    /// Built-in descriptor for this sensor kind.
    pub fn descriptor(&self) -> SensorDescriptor {
        match self {
            Self::Landsat => SensorDescriptor {
                kind: *self,
                natural_key_label: "product_id",
                default_platform: Some("LANDSAT_8"),
                capabilities: SensorCapabilities {
                    cloud_cover: true,
                    ..SensorCapabilities::full()
                },
            },
            Self::Sentinel1 => SensorDescriptor {
                kind: *self,
                natural_key_label: "product_file_id",
                default_platform: Some("Sentinel-1A"),
                // SAR: no cloud cover to threshold on
                capabilities: SensorCapabilities {
                    cloud_cover: false,
                    ..SensorCapabilities::full()
                },
            },
            Self::Sentinel2 => SensorDescriptor {
                kind: *self,
                natural_key_label: "granule_id",
                default_platform: Some("Sentinel-2A"),
                capabilities: SensorCapabilities {
                    cloud_cover: true,
                    ..SensorCapabilities::full()
                },
            },
            Self::JaxaSarTiles => SensorDescriptor {
                kind: *self,
                natural_key_label: "tile_name",
                default_platform: Some("ALOS-2"),
                capabilities: SensorCapabilities {
                    cloud_cover: false,
                    quicklook: true,
                    tilecache: false,
                    datacube: true,
                    plugins: true,
                },
            },
            Self::OtherDataset => SensorDescriptor {
                kind: *self,
                natural_key_label: "file_name",
                default_platform: None,
                capabilities: SensorCapabilities {
                    cloud_cover: false,
                    quicklook: false,
                    tilecache: false,
                    datacube: false,
                    plugins: true,
                },
            },
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional pipeline stages a sensor supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorCapabilities {
    /// Archive reports a cloud-cover percentage usable for thresholding.
    pub cloud_cover: bool,
    pub quicklook: bool,
    pub tilecache: bool,
    pub datacube: bool,
    pub plugins: bool,
}

impl SensorCapabilities {
    pub fn full() -> Self {
        Self {
            cloud_cover: true,
            quicklook: true,
            tilecache: true,
            datacube: true,
            plugins: true,
        }
    }
}

/// Declarative description of one sensor's catalogue behavior.
#[derive(Debug, Clone, Copy)]
pub struct SensorDescriptor {
    pub kind: SensorKind,
    /// What the archive calls the natural key (for logs and reports).
    pub natural_key_label: &'static str,
    pub default_platform: Option<&'static str>,
    pub capabilities: SensorCapabilities,
}

/// Runtime context handed to plugins alongside the scene record.
#[derive(Debug, Clone)]
pub struct SensorContext {
    pub sensor: SensorKind,
    pub capabilities: SensorCapabilities,
    /// Root directory for ARD products of this sensor.
    pub ard_dir: PathBuf,
    /// Root directory for downloads of this sensor.
    pub download_dir: PathBuf,
    /// Scratch directory plugins may write into.
    pub tmp_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_kind_round_trip() {
        for kind in SensorKind::all() {
            assert_eq!(SensorKind::from_str(kind.as_str()), Some(*kind));
        }
        assert_eq!(SensorKind::from_str("modis"), None);
    }

    #[test]
    fn test_sar_sensors_have_no_cloud_cover() {
        assert!(!SensorKind::Sentinel1.descriptor().capabilities.cloud_cover);
        assert!(!SensorKind::JaxaSarTiles.descriptor().capabilities.cloud_cover);
        assert!(SensorKind::Sentinel2.descriptor().capabilities.cloud_cover);
    }
}
