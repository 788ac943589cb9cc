//! Scene discovery command.

use std::path::Path;

use console::style;

use crate::cli::helpers::{open_app, resolve_sensors};
use crate::plugins::PluginRegistry;
use crate::services::PipelineDriver;

pub async fn cmd_discover(
    config_path: Option<&Path>,
    sensor: &str,
    from_start: bool,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let registry = PluginRegistry::new();
    let workers = app.config.num_workers();

    for kind in resolve_sensors(&app.config, sensor)? {
        let sensor_config = app
            .config
            .sensor(kind)
            .ok_or_else(|| anyhow::anyhow!("sensor '{kind}' is not configured"))?;
        let driver = PipelineDriver::from_config(app.pool.clone(), sensor_config, &registry, workers)?;

        println!("{} discovering {kind} scenes...", style("→").cyan());
        let report = driver.discover(from_start).await?;
        println!(
            "{} {kind}: {} new, {} already known, {} filtered, {} duplicates removed",
            style("✓").green(),
            style(report.inserted).bold(),
            report.already_known,
            report.filtered,
            report.duplicates_removed,
        );
    }
    Ok(())
}
