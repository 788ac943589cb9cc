//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking over
//! SQLite. Every repository takes an [`AsyncSqlitePool`] explicitly; there is
//! no process-wide engine. Each pipeline worker clones its own pool, so all
//! mutations are single-row updates keyed by primary key with no shared
//! mutable state beyond the database itself.

pub mod catalogue;
pub mod config_signatures;
pub mod migration;
pub mod migrations;
pub mod models;
pub mod plugin_runs;
pub mod pool;
pub mod usage_log;
pub mod util;

pub use catalogue::{ClosestProductDate, DuplicatePolicy, SceneCatalogue};
pub use config_signatures::ConfigSignatureRepository;
pub use migration::{CatalogueExporter, CatalogueImporter, PortableScene};
pub use migrations::run_migrations;
pub use plugin_runs::{PluginReport, PluginRunRepository, ResetScope};
pub use pool::{AsyncSqliteConnection, AsyncSqlitePool, DieselError};
pub use usage_log::UsageLogRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Format a datetime for storage.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Format an optional datetime for storage.
pub fn format_datetime_opt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}
