//! Plugin execution, reset and reporting commands.

use std::path::Path;

use console::style;

use crate::cli::helpers::{open_app, resolve_sensors};
use crate::plugins::PluginRegistry;
use crate::repository::{PluginRunRepository, ResetScope};
use crate::services::PipelineDriver;

pub async fn cmd_plugins_run(
    config_path: Option<&Path>,
    sensor: &str,
    pid: Option<i64>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let registry = PluginRegistry::new();
    let kinds = resolve_sensors(&app.config, sensor)?;

    if pid.is_some() && kinds.len() != 1 {
        anyhow::bail!("--pid requires a single sensor, not 'all'");
    }

    for kind in kinds {
        let sensor_config = app
            .config
            .sensor(kind)
            .ok_or_else(|| anyhow::anyhow!("sensor '{kind}' is not configured"))?;
        let driver = PipelineDriver::from_config(
            app.pool.clone(),
            sensor_config,
            &registry,
            workers.unwrap_or_else(|| app.config.num_workers()),
        )?;

        let counts = match pid {
            Some(pid) => driver.run_plugins_for(pid).await?,
            None => driver.run_plugins().await?,
        };
        println!(
            "{} {kind}: {} plugin runs succeeded, {} failed",
            style("✓").green(),
            style(counts.processed).bold(),
            counts.failed,
        );
    }
    Ok(())
}

pub async fn cmd_plugins_reset(
    config_path: Option<&Path>,
    sensor: &str,
    pid: Option<i64>,
    keys: &[String],
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    // The sensor argument scopes nothing here beyond validation: run rows
    // are keyed by PID, which is already unique across sensors.
    resolve_sensors(&app.config, sensor)?;

    let runs = PluginRunRepository::new(app.pool.clone());
    let scope = match pid {
        Some(pid) => ResetScope::One(pid),
        None => ResetScope::All,
    };
    let removed = runs.reset(scope, keys).await?;
    println!(
        "{} forgot {} plugin runs",
        style("✓").green(),
        style(removed).bold()
    );
    Ok(())
}

pub async fn cmd_plugins_report(config_path: Option<&Path>, key: &str) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let runs = PluginRunRepository::new(app.pool.clone());
    let report = runs.plugin_report(key).await?;

    println!("{}", style(format!("Plugin report: {key}")).bold());
    println!("{}", "-".repeat(40));
    println!("  attempted:       {}", report.attempted);
    println!("  completed:       {}", report.completed);
    println!("  succeeded:       {}", style(report.succeeded).green());
    println!("  failed:          {}", style(report.failed).red());
    println!("  with artifacts:  {}", report.with_artifacts);
    Ok(())
}
