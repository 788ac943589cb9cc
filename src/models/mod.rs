//! Domain models for the scene catalogue.

mod plugin_run;
mod scene;
mod usage_log;

pub use plugin_run::{PluginOutcome, PluginRun};
pub use scene::{
    BoundingBox, ExtendedEntry, ExtendedInfo, RemoteSource, Scene, Stage, QUICKLOOK_KEY,
    TILECACHE_KEY,
};
pub use usage_log::UsageLogEntry;
