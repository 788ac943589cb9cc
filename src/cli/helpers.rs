//! Shared helper functions for CLI commands.

use std::path::Path;

use console::style;

use crate::config::{self, ConfigSet};
use crate::repository::{run_migrations, AsyncSqlitePool, ConfigSignatureRepository};
use crate::sensors::SensorKind;

/// Loaded config plus an open, migrated database.
pub struct AppContext {
    pub config: ConfigSet,
    pub pool: AsyncSqlitePool,
}

/// Load the config set, open the database, apply migrations and verify the
/// config signatures against the catalogue.
pub async fn open_app(config_path: Option<&Path>) -> anyhow::Result<AppContext> {
    let path = config::resolve_config_path(config_path);
    let config = ConfigSet::load(&path)?;
    let database_url = config.database_url();

    run_migrations(&database_url).await?;
    let pool = AsyncSqlitePool::new(&database_url);

    let signatures = ConfigSignatureRepository::new(pool.clone());
    for (name, loaded) in &config.signatures {
        let stored = signatures.signature_for(name).await?;
        config::verify_signature(name, loaded, stored.as_deref())?;
        if stored.is_none() {
            // First sighting of this document; sign it.
            signatures.record(name, loaded).await?;
        }
    }

    Ok(AppContext { config, pool })
}

/// Resolve a sensor argument: a sensor name, or `all` for every sensor the
/// config declares.
pub fn resolve_sensors(config: &ConfigSet, arg: &str) -> anyhow::Result<Vec<SensorKind>> {
    if arg == "all" {
        let kinds = config.sensor_kinds();
        if kinds.is_empty() {
            anyhow::bail!("no sensors configured");
        }
        return Ok(kinds);
    }
    let kind = SensorKind::from_str(arg)
        .ok_or_else(|| anyhow::anyhow!("unknown sensor '{arg}'"))?;
    if config.sensor(kind).is_none() {
        anyhow::bail!("sensor '{arg}' is not configured");
    }
    Ok(vec![kind])
}

/// Print a yes/no flag with consistent styling.
pub fn flag(label: &str, value: bool) -> String {
    if value {
        format!("{}: {}", label, style("yes").green())
    } else {
        format!("{}: {}", label, style("no").dim())
    }
}

/// Format an optional timestamp for table output.
pub fn opt_time(value: &Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
