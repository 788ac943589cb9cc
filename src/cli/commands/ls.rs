//! Catalogue listing and date queries.

use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Utc};
use console::style;

use crate::cli::helpers::{open_app, resolve_sensors};
use crate::repository::SceneCatalogue;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_ls(
    config_path: Option<&Path>,
    sensor: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    date: Option<NaiveDate>,
    platform: Option<&str>,
    max_cloud: Option<f64>,
    valid_only: bool,
    dates_only: bool,
    filter: Option<&str>,
    offset: i64,
    limit: i64,
) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let kinds = resolve_sensors(&app.config, sensor)?;
    if kinds.len() != 1 {
        anyhow::bail!("ls requires a single sensor");
    }
    let catalogue = SceneCatalogue::new(app.pool.clone(), kinds[0]);
    let filter = filter.map(regex::Regex::new).transpose()?;

    // A single day beats a range; list that day's scenes directly.
    if let Some(day) = date {
        let scenes = catalogue.scenes_for_date(day, platform).await?;
        print_scenes(&scenes, filter.as_ref());
        return Ok(());
    }

    let start = start
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
        .and_time(NaiveTime::MIN)
        .and_utc();
    let end = end
        .map(|d| d.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::days(1))
        .unwrap_or_else(Utc::now);

    if dates_only {
        let dates = catalogue.unique_dates(start, end, platform).await?;
        for date in &dates {
            println!("{date}");
        }
        println!(
            "{} {} acquisition dates",
            style("✓").green(),
            style(dates.len()).bold()
        );
        return Ok(());
    }

    let total = catalogue
        .query_date_range_count(start, end, valid_only, max_cloud)
        .await?;
    let scenes = catalogue
        .query_date_range(start, end, valid_only, max_cloud, offset, limit)
        .await?;
    print_scenes(&scenes, filter.as_ref());
    println!(
        "{} showing {} of {} scenes",
        style("✓").green(),
        scenes.len(),
        style(total).bold()
    );
    Ok(())
}

fn print_scenes(scenes: &[crate::models::Scene], filter: Option<&regex::Regex>) {
    for scene in scenes {
        if let Some(filter) = filter {
            if !filter.is_match(&scene.scene_id) {
                continue;
            }
        }
        let state = if scene.invalid {
            style("invalid").red().to_string()
        } else if scene.datacube_loaded {
            style("datacube").green().to_string()
        } else if scene.ard_processed {
            style("ard").green().to_string()
        } else if scene.downloaded {
            style("downloaded").yellow().to_string()
        } else {
            style("queried").dim().to_string()
        };
        let cloud = scene
            .cloud_cover
            .map(|c| format!("{c:>5.1}%"))
            .unwrap_or_else(|| "    - ".to_string());
        println!(
            "{:>6}  {}  {}  {}  [{}]",
            scene.pid,
            scene.acquired_at.format("%Y-%m-%d %H:%M"),
            cloud,
            scene.scene_id,
            state
        );
    }
}
