//! CLI parser and command dispatch.

mod config_cmd;
mod db;
mod discover;
mod init;
mod ls;
mod plugins_cmd;
mod scene;
mod stages;
mod usage;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::Stage;

#[derive(Parser)]
#[command(name = "eoa")]
#[command(about = "Earth observation scene acquisition and processing")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides EOA_CONFIG and auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and sign the config files
    Init,

    /// Find new scenes at the remote archives
    Discover {
        /// Sensor name, or "all"
        sensor: String,
        /// Search from the configured start date instead of the newest
        /// catalogued acquisition
        #[arg(long)]
        from_start: bool,
    },

    /// Download pending scenes
    Download(StageArgs),

    /// Convert downloaded scenes to analysis-ready data
    ConvertArd(StageArgs),

    /// Generate quicklook browse images
    Quicklook(StageArgs),

    /// Generate XYZ tile caches
    Tilecache(StageArgs),

    /// Ingest ARD products into the datacube
    LoadDatacube(StageArgs),

    /// Run analysis plugins
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },

    /// Discover and run every stage for the given sensors
    Run {
        /// Sensor name, or "all"
        sensor: String,
        /// Search from the configured start date
        #[arg(long)]
        from_start: bool,
        /// Number of stage workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Inspect or reset individual scenes
    Scene {
        #[command(subcommand)]
        command: SceneCommands,
    },

    /// Export or import catalogue slices
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Check or re-sign the config files
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show recent usage log entries
    Usage {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// List catalogued scenes
    Ls {
        /// Sensor name
        sensor: String,
        /// Earliest acquisition date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<chrono::NaiveDate>,
        /// Latest acquisition date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<chrono::NaiveDate>,
        /// List scenes acquired on one specific day
        #[arg(long, conflicts_with_all = ["start", "end"])]
        date: Option<chrono::NaiveDate>,
        /// Filter by platform name
        #[arg(long)]
        platform: Option<String>,
        /// Maximum cloud cover percentage
        #[arg(long)]
        max_cloud: Option<f64>,
        /// Exclude invalid scenes
        #[arg(long)]
        valid_only: bool,
        /// Print distinct acquisition dates instead of scenes
        #[arg(long)]
        dates: bool,
        /// Only show scene IDs matching this regex
        #[arg(short, long)]
        filter: Option<String>,
        /// Skip this many scenes
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Limit number of scenes
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

/// Arguments shared by every per-stage command.
#[derive(clap::Args)]
struct StageArgs {
    /// Sensor name, or "all"
    sensor: String,
    /// Process a single scene by PID instead of the pending list
    #[arg(long)]
    pid: Option<i64>,
    /// Number of stage workers
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum PluginCommands {
    /// Run registered plugins over scenes that still need them
    Run(StageArgs),
    /// Forget plugin runs so they execute again
    Reset {
        /// Sensor name, or "all"
        sensor: String,
        /// Restrict the reset to one scene
        #[arg(long)]
        pid: Option<i64>,
        /// Restrict the reset to specific plugin keys
        #[arg(long)]
        key: Vec<String>,
    },
    /// Show per-plugin completion statistics
    Report {
        /// Plugin key
        key: String,
    },
}

#[derive(Subcommand)]
enum SceneCommands {
    /// Show one scene's lifecycle state
    Status {
        /// Sensor name
        sensor: String,
        /// Scene PID
        pid: i64,
    },
    /// Clear processing state so the scene runs again
    Reset {
        /// Sensor name
        sensor: String,
        /// Scene PID
        pid: i64,
        /// Also delete the downloaded file and clear the download flags
        #[arg(long)]
        remove_download: bool,
        /// Also clear the invalid marker
        #[arg(long)]
        reset_invalid: bool,
    },
    /// Mark a scene's download as moved to offline storage
    Archive {
        /// Sensor name
        sensor: String,
        /// Scene PID
        pid: i64,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Export a sensor's catalogue slice to a JSON file
    Export {
        /// Sensor name, or "all"
        sensor: String,
        /// Output file (sensor name is appended when exporting all)
        out: PathBuf,
    },
    /// Import a previously exported catalogue slice
    Import {
        /// Sensor name
        sensor: String,
        /// Input JSON file
        file: PathBuf,
        /// Path prefix replacement, as old=new (repeatable)
        #[arg(long, value_parser = parse_remap)]
        remap: Vec<(String, String)>,
    },
    /// Rewrite download and ARD path prefixes in place
    RemapPaths {
        /// Sensor name, or "all"
        sensor: String,
        /// Prefix replacement, as old=new
        #[arg(value_parser = parse_remap)]
        mapping: (String, String),
    },
    /// Delete scenes outside the configured region of interest
    PruneRoi {
        /// Sensor name, or "all"
        sensor: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Verify the config files against their recorded signatures
    Check,
    /// Accept the current config files and re-sign them
    Update,
}

fn parse_remap(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(old, new)| (old.to_string(), new.to_string()))
        .ok_or_else(|| format!("expected old=new, got '{raw}'"))
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => init::cmd_init(config_path).await,
        Commands::Discover { sensor, from_start } => {
            discover::cmd_discover(config_path, &sensor, from_start).await
        }
        Commands::Download(args) => {
            stages::cmd_stage(config_path, &args.sensor, Stage::Download, args.pid, args.workers)
                .await
        }
        Commands::ConvertArd(args) => {
            stages::cmd_stage(
                config_path,
                &args.sensor,
                Stage::ArdConvert,
                args.pid,
                args.workers,
            )
            .await
        }
        Commands::Quicklook(args) => {
            stages::cmd_stage(config_path, &args.sensor, Stage::Quicklook, args.pid, args.workers)
                .await
        }
        Commands::Tilecache(args) => {
            stages::cmd_stage(config_path, &args.sensor, Stage::Tilecache, args.pid, args.workers)
                .await
        }
        Commands::LoadDatacube(args) => {
            stages::cmd_stage(
                config_path,
                &args.sensor,
                Stage::DatacubeLoad,
                args.pid,
                args.workers,
            )
            .await
        }
        Commands::Plugins { command } => match command {
            PluginCommands::Run(args) => {
                plugins_cmd::cmd_plugins_run(config_path, &args.sensor, args.pid, args.workers)
                    .await
            }
            PluginCommands::Reset { sensor, pid, key } => {
                plugins_cmd::cmd_plugins_reset(config_path, &sensor, pid, &key).await
            }
            PluginCommands::Report { key } => {
                plugins_cmd::cmd_plugins_report(config_path, &key).await
            }
        },
        Commands::Run {
            sensor,
            from_start,
            workers,
        } => stages::cmd_run_all(config_path, &sensor, from_start, workers).await,
        Commands::Scene { command } => match command {
            SceneCommands::Status { sensor, pid } => {
                scene::cmd_scene_status(config_path, &sensor, pid).await
            }
            SceneCommands::Reset {
                sensor,
                pid,
                remove_download,
                reset_invalid,
            } => scene::cmd_scene_reset(config_path, &sensor, pid, remove_download, reset_invalid)
                .await,
            SceneCommands::Archive { sensor, pid } => {
                scene::cmd_scene_archive(config_path, &sensor, pid).await
            }
        },
        Commands::Db { command } => match command {
            DbCommands::Export { sensor, out } => db::cmd_export(config_path, &sensor, &out).await,
            DbCommands::Import {
                sensor,
                file,
                remap,
            } => db::cmd_import(config_path, &sensor, &file, remap).await,
            DbCommands::RemapPaths { sensor, mapping } => {
                db::cmd_remap_paths(config_path, &sensor, &mapping.0, &mapping.1).await
            }
            DbCommands::PruneRoi { sensor, confirm } => {
                db::cmd_prune_roi(config_path, &sensor, confirm).await
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Check => config_cmd::cmd_check(config_path).await,
            ConfigCommands::Update => config_cmd::cmd_update(config_path).await,
        },
        Commands::Usage { limit } => usage::cmd_usage(config_path, limit).await,
        Commands::Ls {
            sensor,
            start,
            end,
            date,
            platform,
            max_cloud,
            valid_only,
            dates,
            filter,
            offset,
            limit,
        } => {
            ls::cmd_ls(
                config_path,
                &sensor,
                start,
                end,
                date,
                platform.as_deref(),
                max_cloud,
                valid_only,
                dates,
                filter.as_deref(),
                offset,
                limit,
            )
            .await
        }
    }
}
