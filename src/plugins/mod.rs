//! Per-scene analysis plugins.
//!
//! Plugins run after ARD conversion and attach their results to the scene
//! through `PluginRun` rows and extended-info entries. Execution is wrapped
//! so a misbehaving plugin can never wedge the pipeline: errors and panics
//! are captured into the run record and `completed` is always set, which
//! drains the pending list even for a plugin that fails on every scene.
//! Only an explicit reset re-queues a completed run.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{resolve_tool, run_tool, StageError};
use crate::models::{PluginOutcome, PluginRun, Scene, QUICKLOOK_KEY, TILECACHE_KEY};
use crate::sensors::SensorContext;

/// Errors raised by plugin construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("unknown plugin kind '{0}'")]
    UnknownKind(String),
    #[error("invalid parameters for plugin '{key}': {message}")]
    InvalidParams { key: String, message: String },
    #[error("plugin execution failed: {0}")]
    Execution(#[from] anyhow::Error),
}

/// A per-scene analysis step.
#[async_trait]
pub trait ScenePlugin: Send + Sync {
    /// Stable key identifying this plugin in run records and config.
    fn key(&self) -> &str;

    /// Apply free-form parameters from the sensor config.
    fn set_params(&mut self, params: serde_json::Value) -> Result<(), PluginError>;

    /// Analyse one scene. Earlier runs for the same scene are passed in so
    /// a plugin can build on another plugin's output.
    async fn analyze(
        &self,
        scene: &Scene,
        ctx: &SensorContext,
        history: &[PluginRun],
    ) -> Result<PluginOutcome, PluginError>;
}

/// Plugin declaration as it appears in a sensor config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Run-record key, unique within a sensor.
    pub key: String,
    /// Which implementation to construct ("command" is built in).
    pub kind: String,
    /// Free-form parameters forwarded to `set_params`.
    #[serde(default)]
    pub params: serde_json::Value,
}

type PluginFactory = Box<dyn Fn(&str) -> Box<dyn ScenePlugin> + Send + Sync>;

/// Registry mapping config declarations to constructed plugins.
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register("command", |key| Box::new(CommandPlugin::new(key)));
        registry
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a plugin kind.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&str) -> Box<dyn ScenePlugin> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    /// Instantiate every plugin a sensor config declares, in declaration
    /// order. Unknown kinds and bad parameters fail the whole load so a
    /// typo cannot silently drop a plugin from the pipeline.
    pub fn build(&self, configs: &[PluginConfig]) -> Result<Vec<Arc<dyn ScenePlugin>>, PluginError> {
        let mut plugins: Vec<Arc<dyn ScenePlugin>> = Vec::with_capacity(configs.len());
        for config in configs {
            // Plugin output is stored under the plugin key in extended info,
            // the same map the quicklook and tilecache stages complete into.
            if config.key == QUICKLOOK_KEY || config.key == TILECACHE_KEY {
                return Err(PluginError::InvalidParams {
                    key: config.key.clone(),
                    message: format!("'{}' is a reserved stage key", config.key),
                });
            }
            let factory = self
                .factories
                .get(&config.kind)
                .ok_or_else(|| PluginError::UnknownKind(config.kind.clone()))?;
            let mut plugin = factory(&config.key);
            plugin.set_params(config.params.clone())?;
            plugins.push(Arc::from(plugin));
        }
        Ok(plugins)
    }
}

/// Execute a plugin against one scene, capturing every failure mode into
/// the returned run record. The record always has `completed = true`.
pub async fn run_plugin(
    plugin: &dyn ScenePlugin,
    scene: &Scene,
    ctx: &SensorContext,
    history: &[PluginRun],
) -> PluginRun {
    let mut run = PluginRun::started(scene.pid, plugin.key(), Utc::now());
    debug!(scene_id = %scene.scene_id, plugin = plugin.key(), "running plugin");

    let outcome = AssertUnwindSafe(plugin.analyze(scene, ctx, history))
        .catch_unwind()
        .await;

    run.completed = true;
    run.finished_at = Some(Utc::now());
    match outcome {
        Ok(Ok(result)) => {
            run.success = result.success;
            run.produced_artifacts = result.produced_artifacts;
            run.output = result.output;
        }
        Ok(Err(e)) => {
            warn!(scene_id = %scene.scene_id, plugin = plugin.key(), error = %e, "plugin failed");
            run.success = false;
            run.error = Some(e.to_string());
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "plugin panicked".to_string());
            warn!(scene_id = %scene.scene_id, plugin = plugin.key(), panic = %message, "plugin panicked");
            run.success = false;
            run.error = Some(format!("panic: {message}"));
        }
    }
    run
}

/// Parameters for the built-in subprocess plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommandPluginParams {
    /// Executable (absolute path or name resolved on PATH).
    command: PathBuf,
    /// Arguments; `{download}`, `{ard}`, `{scene_id}` and `{out}` expand
    /// per scene.
    #[serde(default)]
    args: Vec<String>,
    /// Parse stdout as a JSON output document when the command succeeds.
    #[serde(default)]
    capture_output: bool,
}

/// Plugin that shells out to a configured external command.
///
/// The command gets a per-plugin output directory under the scene's ARD
/// product; artifacts are detected by that directory being non-empty
/// afterwards.
pub struct CommandPlugin {
    key: String,
    params: Option<CommandPluginParams>,
}

impl CommandPlugin {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            params: None,
        }
    }
}

#[async_trait]
impl ScenePlugin for CommandPlugin {
    fn key(&self) -> &str {
        &self.key
    }

    fn set_params(&mut self, params: serde_json::Value) -> Result<(), PluginError> {
        let parsed: CommandPluginParams =
            serde_json::from_value(params).map_err(|e| PluginError::InvalidParams {
                key: self.key.clone(),
                message: e.to_string(),
            })?;
        self.params = Some(parsed);
        Ok(())
    }

    async fn analyze(
        &self,
        scene: &Scene,
        _ctx: &SensorContext,
        _history: &[PluginRun],
    ) -> Result<PluginOutcome, PluginError> {
        let params = self.params.as_ref().ok_or_else(|| PluginError::InvalidParams {
            key: self.key.clone(),
            message: "plugin was not configured".to_string(),
        })?;

        let out_dir = scene.ard_path.join("plugins").join(&self.key);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| PluginError::Execution(e.into()))?;

        let program = resolve_tool(&params.command).map_err(stage_to_plugin)?;
        let download = scene.download_path.display().to_string();
        let ard = scene.ard_path.display().to_string();
        let out = out_dir.display().to_string();
        let replacements = [
            ("download", download.as_str()),
            ("ard", ard.as_str()),
            ("scene_id", scene.scene_id.as_str()),
            ("out", out.as_str()),
        ];

        let output = run_tool(&program, &params.args, &replacements, None, None)
            .await
            .map_err(stage_to_plugin)?;

        let document = if params.capture_output {
            serde_json::from_slice(&output.stdout).ok()
        } else {
            None
        };

        let mut entries = tokio::fs::read_dir(&out_dir)
            .await
            .map_err(|e| PluginError::Execution(e.into()))?;
        let produced_artifacts = entries
            .next_entry()
            .await
            .map_err(|e| PluginError::Execution(e.into()))?
            .is_some();

        Ok(PluginOutcome {
            success: true,
            produced_artifacts,
            output: document,
        })
    }
}

fn stage_to_plugin(e: StageError) -> PluginError {
    match e {
        StageError::Transient(inner) => PluginError::Execution(inner),
        StageError::Permanent(message) => PluginError::Execution(anyhow::anyhow!(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, ExtendedInfo, RemoteSource};
    use crate::sensors::{SensorCapabilities, SensorKind};
    use chrono::Utc;

    fn test_scene() -> Scene {
        Scene {
            pid: 1,
            sensor: SensorKind::Sentinel2,
            scene_id: "S2A_TEST".to_string(),
            platform: None,
            instrument: None,
            acquired_at: Utc::now(),
            product_date: None,
            bbox: BoundingBox {
                north: 1.0,
                south: 0.0,
                east: 1.0,
                west: 0.0,
            },
            cloud_cover: None,
            remote: RemoteSource::default(),
            queried_at: Utc::now(),
            download_start: None,
            download_end: None,
            downloaded: true,
            download_path: PathBuf::from("/tmp/S2A_TEST.zip"),
            archived: false,
            ard_start: None,
            ard_end: None,
            ard_processed: true,
            ard_path: PathBuf::from("/tmp/ard/S2A_TEST"),
            datacube_start: None,
            datacube_end: None,
            datacube_loaded: false,
            invalid: false,
            extended_info: ExtendedInfo::new(),
        }
    }

    fn test_context() -> SensorContext {
        SensorContext {
            sensor: SensorKind::Sentinel2,
            capabilities: SensorCapabilities::full(),
            ard_dir: PathBuf::from("/tmp/ard"),
            download_dir: PathBuf::from("/tmp/dl"),
            tmp_dir: PathBuf::from("/tmp/tmp"),
        }
    }

    struct FailingPlugin;

    #[async_trait]
    impl ScenePlugin for FailingPlugin {
        fn key(&self) -> &str {
            "failing"
        }
        fn set_params(&mut self, _params: serde_json::Value) -> Result<(), PluginError> {
            Ok(())
        }
        async fn analyze(
            &self,
            _scene: &Scene,
            _ctx: &SensorContext,
            _history: &[PluginRun],
        ) -> Result<PluginOutcome, PluginError> {
            Err(PluginError::Execution(anyhow::anyhow!("model diverged")))
        }
    }

    struct PanickingPlugin;

    #[async_trait]
    impl ScenePlugin for PanickingPlugin {
        fn key(&self) -> &str {
            "panicking"
        }
        fn set_params(&mut self, _params: serde_json::Value) -> Result<(), PluginError> {
            Ok(())
        }
        async fn analyze(
            &self,
            _scene: &Scene,
            _ctx: &SensorContext,
            _history: &[PluginRun],
        ) -> Result<PluginOutcome, PluginError> {
            panic!("index out of bounds in plugin");
        }
    }

    #[tokio::test]
    async fn test_failing_plugin_recorded_as_completed() {
        let run = run_plugin(&FailingPlugin, &test_scene(), &test_context(), &[]).await;
        assert!(run.completed);
        assert!(!run.success);
        assert!(run.error.as_deref().unwrap().contains("model diverged"));
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_panicking_plugin_recorded_as_completed() {
        let run = run_plugin(&PanickingPlugin, &test_scene(), &test_context(), &[]).await;
        assert!(run.completed);
        assert!(!run.success);
        assert!(run.error.as_deref().unwrap().starts_with("panic:"));
    }

    #[test]
    fn test_registry_rejects_unknown_kind() {
        let registry = PluginRegistry::new();
        let configs = vec![PluginConfig {
            key: "ndvi".to_string(),
            kind: "python".to_string(),
            params: serde_json::Value::Null,
        }];
        assert!(matches!(
            registry.build(&configs),
            Err(PluginError::UnknownKind(kind)) if kind == "python"
        ));
    }

    #[test]
    fn test_registry_builds_command_plugin() {
        let registry = PluginRegistry::new();
        let configs = vec![PluginConfig {
            key: "ndvi".to_string(),
            kind: "command".to_string(),
            params: serde_json::json!({
                "command": "ndvi-tool",
                "args": ["--ard", "{ard}", "--out", "{out}"],
            }),
        }];
        let plugins = registry.build(&configs).unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].key(), "ndvi");
    }

    #[test]
    fn test_registry_rejects_stage_keys() {
        let registry = PluginRegistry::new();
        for reserved in [QUICKLOOK_KEY, TILECACHE_KEY] {
            let configs = vec![PluginConfig {
                key: reserved.to_string(),
                kind: "command".to_string(),
                params: serde_json::json!({"command": "true"}),
            }];
            assert!(matches!(
                registry.build(&configs),
                Err(PluginError::InvalidParams { key, .. }) if key == reserved
            ));
        }
    }

    #[test]
    fn test_command_plugin_rejects_bad_params() {
        let mut plugin = CommandPlugin::new("bad");
        let err = plugin
            .set_params(serde_json::json!({"args": ["no command field"]}))
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidParams { .. }));
    }
}
