mod commands;
mod logging;
mod render;

use std::path::{Path, PathBuf};

use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calmirror")]
#[command(about = "Mirror iCal feeds into Google Calendar, one calendar per feed")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/calmirror/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only operate on this calendar (by calendar_name)
    #[arg(short, long, global = true)]
    calendar: Option<String>,

    /// Log every remote operation
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configured calendars
    List,
    /// Sync continuously, each calendar on its own interval
    Run,
    /// Sync every calendar once and exit
    Once {
        /// Print the planned changes without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Authorize calmirror with your Google account
    Auth,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;

    let config = load_config(cli.config.as_deref())?;
    let calendar = cli.calendar.as_deref();

    match cli.command {
        Commands::List => commands::list::run(&config, calendar),
        Commands::Run => commands::run::run(&config, calendar).await,
        Commands::Once { dry_run } => commands::once::run(&config, calendar, dry_run, cli.verbose).await,
        Commands::Auth => commands::auth::run(&config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<MirrorConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => MirrorConfig::default_path()?,
    };

    Ok(MirrorConfig::load(&path)?)
}
