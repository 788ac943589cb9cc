//! Single-scene inspection and reset commands.

use std::path::Path;

use console::style;

use crate::cli::helpers::{flag, open_app, opt_time, resolve_sensors};
use crate::models::Stage;
use crate::repository::{PluginRunRepository, SceneCatalogue};

pub async fn cmd_scene_status(
    config_path: Option<&Path>,
    sensor: &str,
    pid: i64,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let kinds = resolve_sensors(&app.config, sensor)?;
    if kinds.len() != 1 {
        anyhow::bail!("scene status requires a single sensor");
    }

    let catalogue = SceneCatalogue::new(app.pool.clone(), kinds[0]);
    let scene = catalogue
        .get_scene(pid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no scene with PID {pid} for sensor '{sensor}'"))?;

    println!(
        "{}",
        style(format!("Scene {} ({})", scene.scene_id, scene.sensor)).bold()
    );
    println!("{}", "-".repeat(50));
    println!("  pid:            {}", scene.pid);
    if let Some(platform) = &scene.platform {
        println!("  platform:       {platform}");
    }
    println!("  acquired:       {}", opt_time(&Some(scene.acquired_at)));
    println!("  product date:   {}", opt_time(&scene.product_date));
    if let Some(cover) = scene.cloud_cover {
        println!("  cloud cover:    {cover:.1}%");
    }
    println!("  {}", flag("downloaded", scene.downloaded));
    if scene.downloaded {
        println!("    path:         {}", scene.download_path.display());
        println!("    finished:     {}", opt_time(&scene.download_end));
    }
    println!("  {}", flag("ard processed", scene.ard_processed));
    if scene.ard_processed {
        println!("    path:         {}", scene.ard_path.display());
        println!("    finished:     {}", opt_time(&scene.ard_end));
    }
    println!("  {}", flag("quicklook", scene.has_stage(Stage::Quicklook)));
    println!("  {}", flag("tilecache", scene.has_stage(Stage::Tilecache)));
    println!("  {}", flag("datacube loaded", scene.datacube_loaded));
    println!("  {}", flag("archived", scene.archived));
    println!("  {}", flag("invalid", scene.invalid));

    if !scene.extended_info.is_empty() {
        println!("  extended info:");
        for (key, _) in scene.extended_info.iter() {
            println!("    {} {key}", style("•").dim());
        }
    }

    let runs = PluginRunRepository::new(app.pool.clone())
        .runs_for_scene(pid)
        .await?;
    if !runs.is_empty() {
        println!("  plugin runs:");
        for run in runs {
            let status = if !run.completed {
                style("started").yellow().to_string()
            } else if run.success {
                style("ok").green().to_string()
            } else {
                style("failed").red().to_string()
            };
            println!("    {} {} [{status}]", style("•").dim(), run.plugin_key);
            if let Some(error) = run.error {
                println!("      {}", style(error).dim());
            }
        }
    }
    Ok(())
}

pub async fn cmd_scene_archive(
    config_path: Option<&Path>,
    sensor: &str,
    pid: i64,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let kinds = resolve_sensors(&app.config, sensor)?;
    if kinds.len() != 1 {
        anyhow::bail!("scene archive requires a single sensor");
    }

    let catalogue = SceneCatalogue::new(app.pool.clone(), kinds[0]);
    let scene = catalogue
        .get_scene(pid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no scene with PID {pid} for sensor '{sensor}'"))?;
    if !scene.downloaded {
        anyhow::bail!("scene {pid} has no download to archive");
    }
    catalogue.mark_archived(pid).await?;
    println!("{} scene {pid} marked archived", style("✓").green());
    Ok(())
}

pub async fn cmd_scene_reset(
    config_path: Option<&Path>,
    sensor: &str,
    pid: i64,
    remove_download: bool,
    reset_invalid: bool,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let kinds = resolve_sensors(&app.config, sensor)?;
    if kinds.len() != 1 {
        anyhow::bail!("scene reset requires a single sensor");
    }

    let catalogue = SceneCatalogue::new(app.pool.clone(), kinds[0]);
    catalogue.reset(pid, remove_download, reset_invalid).await?;
    println!(
        "{} scene {pid} reset{}",
        style("✓").green(),
        if remove_download {
            " (download removed)"
        } else {
            ""
        }
    );
    Ok(())
}
