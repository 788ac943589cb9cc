//! Config signature commands.

use std::path::Path;

use console::style;

use crate::config::{self, ConfigSet};
use crate::repository::{run_migrations, AsyncSqlitePool, ConfigSignatureRepository};

/// Verify every config file against its recorded signature.
pub async fn cmd_check(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, signatures) = open_for_signing(config_path).await?;

    let mut mismatches = 0usize;
    for (name, loaded) in &config.signatures {
        match signatures.signature_for(name).await? {
            None => println!("{} {name}: not signed yet", style("!").yellow()),
            Some(stored) if &stored == loaded => {
                println!("{} {name}: signature ok", style("✓").green())
            }
            Some(_) => {
                println!("{} {name}: signature mismatch", style("✗").red());
                mismatches += 1;
            }
        }
    }
    if mismatches > 0 {
        anyhow::bail!(
            "{mismatches} config file(s) changed since signing; run `eoa config update` to accept"
        );
    }
    Ok(())
}

/// Accept the current config files and record their signatures.
pub async fn cmd_update(config_path: Option<&Path>) -> anyhow::Result<()> {
    let (config, signatures) = open_for_signing(config_path).await?;

    for (name, loaded) in &config.signatures {
        signatures.record(name, loaded).await?;
        println!("{} {name}: re-signed", style("✓").green());
    }
    Ok(())
}

/// Open the database without signature verification; these commands exist
/// precisely to inspect and repair mismatched signatures.
async fn open_for_signing(
    config_path: Option<&Path>,
) -> anyhow::Result<(ConfigSet, ConfigSignatureRepository)> {
    let path = config::resolve_config_path(config_path);
    let config = ConfigSet::load(&path)?;
    let database_url = config.database_url();
    run_migrations(&database_url).await?;
    let pool = AsyncSqlitePool::new(&database_url);
    let signatures = ConfigSignatureRepository::new(pool);
    Ok((config, signatures))
}
