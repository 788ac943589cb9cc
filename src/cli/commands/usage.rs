//! Usage log inspection.

use std::path::Path;

use console::style;

use crate::cli::helpers::{open_app, opt_time};
use crate::repository::UsageLogRepository;

pub async fn cmd_usage(config_path: Option<&Path>, limit: i64) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;
    let usage = UsageLogRepository::new(app.pool.clone());
    let entries = usage.recent(limit).await?;

    if entries.is_empty() {
        println!("{} usage log is empty", style("!").yellow());
        return Ok(());
    }

    println!("{}", style("Recent usage").bold());
    println!("{}", "-".repeat(70));
    for entry in entries {
        let marker = if entry.start_block {
            style("▶").cyan().to_string()
        } else if entry.end_block {
            style("■").dim().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {}  {:<14} {}",
            marker,
            opt_time(&entry.logged_at),
            entry.sensor,
            entry.description
        );
    }
    Ok(())
}
