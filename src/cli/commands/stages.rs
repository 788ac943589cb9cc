//! Per-stage and full pipeline commands.

use std::path::Path;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::helpers::{open_app, resolve_sensors, AppContext};
use crate::models::Stage;
use crate::plugins::PluginRegistry;
use crate::services::PipelineDriver;

fn driver_for(
    app: &AppContext,
    registry: &PluginRegistry,
    kind: crate::sensors::SensorKind,
    workers: Option<usize>,
) -> anyhow::Result<PipelineDriver> {
    let sensor_config = app
        .config
        .sensor(kind)
        .ok_or_else(|| anyhow::anyhow!("sensor '{kind}' is not configured"))?;
    PipelineDriver::from_config(
        app.pool.clone(),
        sensor_config,
        registry,
        workers.unwrap_or_else(|| app.config.num_workers()),
    )
}

/// Run one stage for one or all sensors, or for a single scene.
pub async fn cmd_stage(
    config_path: Option<&Path>,
    sensor: &str,
    stage: Stage,
    pid: Option<i64>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let registry = PluginRegistry::new();
    let kinds = resolve_sensors(&app.config, sensor)?;

    if let Some(pid) = pid {
        if kinds.len() != 1 {
            anyhow::bail!("--pid requires a single sensor, not 'all'");
        }
        let driver = driver_for(&app, &registry, kinds[0], workers)?;
        driver.process_one(pid).await?;
        println!("{} scene {pid} processed", style("✓").green());
        return Ok(());
    }

    for kind in kinds {
        let driver = driver_for(&app, &registry, kind, workers)?;
        let spinner = stage_spinner(&format!("{kind}: running {stage} stage"));
        let counts = driver.run_stage(stage).await?;
        spinner.finish_and_clear();
        println!(
            "{} {kind} {stage}: {} processed, {} failed, {} invalid",
            style("✓").green(),
            style(counts.processed).bold(),
            counts.failed,
            counts.invalidated,
        );
    }
    Ok(())
}

fn stage_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    spinner
}

/// Discover and run every applicable stage for the given sensors.
pub async fn cmd_run_all(
    config_path: Option<&Path>,
    sensor: &str,
    from_start: bool,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let registry = PluginRegistry::new();

    for kind in resolve_sensors(&app.config, sensor)? {
        let driver = driver_for(&app, &registry, kind, workers)?;
        println!("{} {kind}: full pipeline run...", style("→").cyan());
        // A failing sensor must not stop the others.
        if let Err(e) = driver.run_all(from_start).await {
            eprintln!("{} {kind}: pipeline failed: {e:#}", style("✗").red());
            continue;
        }
        println!("{} {kind}: pipeline complete", style("✓").green());
    }
    Ok(())
}
