//! Usage log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only audit record of one pipeline invocation event.
///
/// Written by the pipeline driver when a stage block starts and ends;
/// never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub logged_at: Option<DateTime<Utc>>,
    /// Sensor name, or "all" for multi-sensor invocations.
    pub sensor: String,
    pub description: String,
    /// Which stage flags this invocation touched.
    pub updated_local_db: bool,
    pub found_new_scenes: bool,
    pub downloaded_scenes: bool,
    pub converted_ard: bool,
    pub loaded_datacube: bool,
    /// Marks the start of a bracketed stage block.
    pub start_block: bool,
    /// Marks the end of a bracketed stage block.
    pub end_block: bool,
}

impl UsageLogEntry {
    pub fn start(sensor: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            description: description.into(),
            start_block: true,
            ..Default::default()
        }
    }

    pub fn end(sensor: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            description: description.into(),
            end_block: true,
            ..Default::default()
        }
    }
}
