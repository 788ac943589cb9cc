//! Catalogue export and import commands.

use std::collections::BTreeMap;
use std::path::Path;

use console::style;

use crate::cli::helpers::{open_app, resolve_sensors};
use crate::repository::{CatalogueExporter, CatalogueImporter, SceneCatalogue};

pub async fn cmd_export(
    config_path: Option<&Path>,
    sensor: &str,
    out: &Path,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let kinds = resolve_sensors(&app.config, sensor)?;
    let exporter = CatalogueExporter::new(app.pool.clone());

    let multi = kinds.len() > 1;
    for kind in kinds {
        let target = if multi {
            // One file per sensor: eo.json becomes eo.sentinel2.json.
            let stem = out
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("catalogue");
            out.with_file_name(format!("{stem}.{kind}.json"))
        } else {
            out.to_path_buf()
        };
        let count = exporter.export_sensor(kind, &target).await?;
        println!(
            "{} exported {} {kind} scenes to {}",
            style("✓").green(),
            style(count).bold(),
            target.display()
        );
    }
    Ok(())
}

pub async fn cmd_import(
    config_path: Option<&Path>,
    sensor: &str,
    file: &Path,
    remap: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let kinds = resolve_sensors(&app.config, sensor)?;
    if kinds.len() != 1 {
        anyhow::bail!("import requires a single sensor");
    }

    let replacements: BTreeMap<String, String> = remap.into_iter().collect();
    let importer = CatalogueImporter::new(app.pool.clone(), replacements);
    let count = importer.import_sensor(kinds[0], file).await?;
    println!(
        "{} imported {} scenes from {}",
        style("✓").green(),
        style(count).bold(),
        file.display()
    );
    Ok(())
}

/// Rewrite download and ARD path prefixes on catalogue rows in place, for
/// storage that moved without a full export/import cycle.
pub async fn cmd_remap_paths(
    config_path: Option<&Path>,
    sensor: &str,
    old_prefix: &str,
    new_prefix: &str,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;

    for kind in resolve_sensors(&app.config, sensor)? {
        let catalogue = SceneCatalogue::new(app.pool.clone(), kind);
        let downloads = catalogue.remap_download_paths(old_prefix, new_prefix).await?;
        let ards = catalogue.remap_ard_paths(old_prefix, new_prefix).await?;
        println!(
            "{} {kind}: rewrote {} download paths, {} ARD paths",
            style("✓").green(),
            downloads,
            ards
        );
    }
    Ok(())
}

/// Delete scenes whose footprint falls outside the configured region of
/// interest, e.g. after the ROI was tightened.
pub async fn cmd_prune_roi(
    config_path: Option<&Path>,
    sensor: &str,
    confirm: bool,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    if !confirm {
        anyhow::bail!("prune-roi deletes catalogue rows; re-run with --confirm");
    }

    for kind in resolve_sensors(&app.config, sensor)? {
        let sensor_config = app
            .config
            .sensor(kind)
            .ok_or_else(|| anyhow::anyhow!("sensor '{kind}' is not configured"))?;
        let Some(roi) = sensor_config.archive.region_of_interest else {
            println!("{} {kind}: no region of interest configured", style("!").yellow());
            continue;
        };
        let catalogue = SceneCatalogue::new(app.pool.clone(), kind);
        let removed = catalogue.remove_outside_bbox(roi).await?;
        println!(
            "{} {kind}: removed {} scenes outside the region of interest",
            style("✓").green(),
            style(removed).bold()
        );
    }
    Ok(())
}
