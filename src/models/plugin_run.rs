//! Plugin execution records.
//!
//! One `PluginRun` tracks one plugin's execution against one scene,
//! decoupled from the scene row so N plugins can be attached to M scenes
//! without any schema change per plugin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a plugin's `analyze` call reported back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginOutcome {
    /// The analysis succeeded.
    pub success: bool,
    /// The analysis produced artifacts on disk.
    pub produced_artifacts: bool,
    /// Structured output to store with the run.
    pub output: Option<serde_json::Value>,
}

/// Execution record for one (scene, plugin) pair.
///
/// Absence of a row means "not yet attempted". A row with
/// `completed=true, success=false` means "attempted and failed, will not
/// auto-retry unless explicitly reset".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRun {
    pub scene_pid: i64,
    pub plugin_key: String,
    /// The attempt finished, whether it succeeded or not.
    pub completed: bool,
    pub success: bool,
    pub produced_artifacts: bool,
    /// Captured error detail from a failed attempt.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Structured output payload from the plugin.
    pub output: Option<serde_json::Value>,
}

impl PluginRun {
    /// A fresh, not-yet-finished run marker.
    pub fn started(scene_pid: i64, plugin_key: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            scene_pid,
            plugin_key: plugin_key.into(),
            completed: false,
            success: false,
            produced_artifacts: false,
            error: None,
            started_at: Some(started_at),
            finished_at: None,
            output: None,
        }
    }
}
