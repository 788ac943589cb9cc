//! Configuration loading and signature tracking.
//!
//! The system is configured by one top-level JSON document plus one JSON
//! document per sensor, kept in the same directory. Each file's SHA-256
//! signature is recorded in the catalogue on first load; subsequent loads
//! compare against the stored signature and refuse to run on a mismatch
//! until `eoa config update` re-signs the files. Silent config drift between
//! scheduled runs has historically meant half a catalogue processed with
//! different thresholds than the other half.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::adapters::{ArdToolConfig, DatacubeConfig, VisualToolConfig, ZoomRange};
use crate::models::BoundingBox;
use crate::plugins::PluginConfig;
use crate::sensors::{SensorCapabilities, SensorContext, SensorKind};

/// Environment variable overriding the top-level config path.
pub const ENV_CONFIG: &str = "EOA_CONFIG";
/// Environment variable overriding the worker count.
pub const ENV_NUM_WORKERS: &str = "EOA_NUM_WORKERS";
/// Environment variable forwarded to external toolchains as a thread count.
pub const ENV_NUM_THREADS: &str = "EOA_NUM_THREADS";

const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown sensor '{0}' in config")]
    UnknownSensor(String),
    #[error(
        "config file '{name}' changed since it was signed (expected {expected}, found {found}); \
         run `eoa config update` to accept the new version"
    )]
    SignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },
}

/// Top-level config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// SQLite database path (tilde-expanded).
    pub database: String,
    /// Sensors to operate; each has a `<name>.json` next to this file.
    pub sensors: Vec<String>,
    /// Default worker count for stage pools.
    #[serde(default = "default_workers")]
    pub num_workers: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Per-sensor filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPaths {
    pub download_dir: String,
    pub ard_dir: String,
    pub tmp_dir: String,
    #[serde(default)]
    pub quicklook_dir: Option<String>,
    #[serde(default)]
    pub tilecache_dir: Option<String>,
}

/// Remote archive query settings for one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Search endpoint URL.
    pub endpoint: String,
    /// Earliest acquisition date ever considered for this sensor.
    pub start_date: chrono::NaiveDate,
    /// Region of interest; discoveries outside it are skipped.
    #[serde(default)]
    pub region_of_interest: Option<BoundingBox>,
    /// Maximum acceptable cloud cover percentage at discovery time.
    #[serde(default)]
    pub cloud_threshold: Option<f32>,
}

/// Per-sensor config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sensor: SensorKind,
    pub paths: SensorPaths,
    pub archive: ArchiveConfig,
    /// Capability overrides; defaults come from the sensor descriptor.
    #[serde(default)]
    pub capabilities: Option<SensorCapabilities>,
    pub ard: ArdToolConfig,
    #[serde(default)]
    pub quicklook: Option<VisualToolConfig>,
    #[serde(default)]
    pub tilecache: Option<VisualToolConfig>,
    #[serde(default)]
    pub tile_zoom: ZoomRange,
    #[serde(default)]
    pub datacube: Option<DatacubeConfig>,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl SensorConfig {
    pub fn capabilities(&self) -> SensorCapabilities {
        self.capabilities
            .unwrap_or_else(|| self.sensor.descriptor().capabilities)
    }

    pub fn download_dir(&self) -> PathBuf {
        expand_path(&self.paths.download_dir)
    }

    pub fn ard_dir(&self) -> PathBuf {
        expand_path(&self.paths.ard_dir)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        expand_path(&self.paths.tmp_dir)
    }

    pub fn quicklook_dir(&self) -> PathBuf {
        self.paths
            .quicklook_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| self.ard_dir().join("quicklooks"))
    }

    pub fn tilecache_dir(&self) -> PathBuf {
        self.paths
            .tilecache_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| self.ard_dir().join("tilecaches"))
    }

    /// Runtime context handed to plugins.
    pub fn context(&self) -> SensorContext {
        SensorContext {
            sensor: self.sensor,
            capabilities: self.capabilities(),
            ard_dir: self.ard_dir(),
            download_dir: self.download_dir(),
            tmp_dir: self.tmp_dir(),
        }
    }
}

/// All loaded config documents plus their file signatures.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    /// Directory the documents were loaded from.
    pub dir: PathBuf,
    pub system: SystemConfig,
    pub sensors: BTreeMap<String, SensorConfig>,
    /// Signature per document name ("system" plus one per sensor).
    pub signatures: BTreeMap<String, String>,
}

impl ConfigSet {
    /// Load the top-level document and every sensor document it names.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let system: SystemConfig = read_json(path)?;
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut sensors = BTreeMap::new();
        let mut signatures = BTreeMap::new();
        signatures.insert("system".to_string(), file_signature(path)?);

        for name in &system.sensors {
            SensorKind::from_str(name).ok_or_else(|| ConfigError::UnknownSensor(name.clone()))?;
            let sensor_path = dir.join(format!("{name}.json"));
            let config: SensorConfig = read_json(&sensor_path)?;
            signatures.insert(name.clone(), file_signature(&sensor_path)?);
            sensors.insert(name.clone(), config);
            debug!(sensor = %name, path = %sensor_path.display(), "loaded sensor config");
        }

        Ok(Self {
            dir,
            system,
            sensors,
            signatures,
        })
    }

    /// Database URL for the configured SQLite file.
    pub fn database_url(&self) -> String {
        expand_path(&self.system.database).display().to_string()
    }

    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorConfig> {
        self.sensors.get(kind.as_str())
    }

    /// Configured sensor kinds, in declaration order.
    pub fn sensor_kinds(&self) -> Vec<SensorKind> {
        self.system
            .sensors
            .iter()
            .filter_map(|name| SensorKind::from_str(name))
            .collect()
    }

    /// Worker count, with the environment override winning.
    pub fn num_workers(&self) -> usize {
        env_usize(ENV_NUM_WORKERS).unwrap_or(self.system.num_workers).max(1)
    }
}

/// Thread count handed to external toolchains, if set in the environment.
pub fn num_threads_override() -> Option<usize> {
    env_usize(ENV_NUM_THREADS)
}

/// Resolve the top-level config path: `EOA_CONFIG`, then the user config
/// directory, then the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        return expand_path(&path);
    }
    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("eoacquire").join("config.json");
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("config.json")
}

/// SHA-256 signature of a config file's bytes, hex encoded.
pub fn file_signature(path: &Path) -> Result<String, ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a loaded signature against the one stored in the catalogue.
pub fn verify_signature(
    name: &str,
    loaded: &str,
    stored: Option<&str>,
) -> Result<(), ConfigError> {
    match stored {
        Some(expected) if expected != loaded => Err(ConfigError::SignatureMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            found: loaded.to_string(),
        }),
        _ => Ok(()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_config_parses_minimal_document() {
        let json = serde_json::json!({
            "sensor": "sentinel2",
            "paths": {
                "download_dir": "/data/s2/downloads",
                "ard_dir": "/data/s2/ard",
                "tmp_dir": "/data/s2/tmp"
            },
            "archive": {
                "endpoint": "https://archive.example/search",
                "start_date": "2023-01-01",
                "cloud_threshold": 70.0
            },
            "ard": { "command": "ard-tool", "args": ["{download}", "{output}"] }
        });
        let config: SensorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.sensor, SensorKind::Sentinel2);
        assert!(config.capabilities().cloud_cover);
        assert_eq!(config.archive.cloud_threshold, Some(70.0));
        assert!(config.plugins.is_empty());
        assert_eq!(config.tile_zoom.min_zoom, 6);
        assert_eq!(
            config.quicklook_dir(),
            PathBuf::from("/data/s2/ard/quicklooks")
        );
    }

    #[test]
    fn test_verify_signature() {
        assert!(verify_signature("system", "abc", None).is_ok());
        assert!(verify_signature("system", "abc", Some("abc")).is_ok());
        let err = verify_signature("system", "abc", Some("def")).unwrap_err();
        assert!(matches!(err, ConfigError::SignatureMismatch { name, .. } if name == "system"));
    }

    #[test]
    fn test_file_signature_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{\"database\": \"eo.db\", \"sensors\": []}").unwrap();
        let a = file_signature(&path).unwrap();
        let b = file_signature(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
