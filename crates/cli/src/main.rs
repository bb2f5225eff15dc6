//! franq-sync CLI - realtime cache invalidation for the franchise back office

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod logging;
mod util;

/// franq-sync - debounced realtime cache invalidation
#[derive(Parser)]
#[command(name = "franq-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $FRANQ_SYNC_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe the configured tables and invalidate on change events read as NDJSON
    Watch {
        /// Read events from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Override the debounce delay (milliseconds)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Bind a table to a cache key (`table=key` or `table`); replaces configured bindings
        #[arg(long = "table", value_name = "TABLE[=KEY]")]
        tables: Vec<String>,
    },
    /// View and edit configuration
    Config {
        /// List all values
        #[arg(long, conflicts_with_all = ["get", "set", "path", "example"])]
        list: bool,

        /// Print one value
        #[arg(long, value_name = "KEY")]
        get: Option<String>,

        /// Set one value
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
        set: Option<Vec<String>>,

        /// Print the config file location
        #[arg(long)]
        path: bool,

        /// With --path: write defaults if the file is missing
        #[arg(long, requires = "path")]
        create: bool,

        /// Print an annotated example config
        #[arg(long)]
        example: bool,
    },
    /// Show table -> cache key bindings
    Tables,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = util::resolve_config_path(cli.config.as_deref())?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init(&config_path);

    match cli.command {
        Commands::Watch { input, delay_ms, tables } => {
            cmd::watch::run(&config_path, input, delay_ms, &tables).await
        }
        Commands::Config { list, get, set, path, create, example } => {
            if list {
                cmd::config::run_list(&config_path).await
            } else if let Some(key) = get {
                cmd::config::run_get(&config_path, &key).await
            } else if let Some(pair) = set {
                cmd::config::run_set(&config_path, &pair[0], &pair[1]).await
            } else if path {
                cmd::config::run_path(&config_path, create).await
            } else if example {
                cmd::config::run_example().await
            } else {
                // --list is the default view
                cmd::config::run_list(&config_path).await
            }
        }
        Commands::Tables => cmd::tables::run(&config_path).await,
    }
}
