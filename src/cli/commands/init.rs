//! Database and config initialisation.

use std::path::Path;

use console::style;

use crate::cli::helpers::open_app;
use crate::repository::SceneCatalogue;

/// Create the database, apply migrations and sign the config files.
pub async fn cmd_init(config_path: Option<&Path>) -> anyhow::Result<()> {
    let app = open_app(config_path).await?;

    println!(
        "{} database ready at {}",
        style("✓").green(),
        app.config.database_url()
    );

    for kind in app.config.sensor_kinds() {
        let catalogue = SceneCatalogue::new(app.pool.clone(), kind);
        let count = catalogue.count().await?;
        println!("  {} {kind}: {count} scenes", style("•").dim());
    }
    println!(
        "{} config files signed ({} documents)",
        style("✓").green(),
        app.config.signatures.len()
    );
    Ok(())
}
