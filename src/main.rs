#![forbid(unsafe_code)]

mod cli;
mod config;
mod constants;
mod daemon;
mod gui;
mod ipc;
mod reconciler;
mod resume;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use config::Settings;

#[derive(Parser)]
#[command(name = "deck-ryzenadj")]
#[command(about = "Steam Deck CPU/GPU curve optimiser and power limit tuning via ryzenadj", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ~/.config/deck-ryzenadj/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides LOG_LEVEL and the settings file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the tuning panel (default)
    Panel,

    /// Run the privileged backend that executes ryzenadj
    Daemon,

    /// Print the configuration the backend has applied
    Status,

    /// Change individual settings
    Set(cli::SetArgs),

    /// Restore the default configuration
    Reset {
        #[arg(long, short)]
        verbose: bool,
    },

    /// Tell the backend the system resumed from suspend
    Resume,

    /// Check that the backend is reachable
    Ping,

    /// Ask the backend to shut down
    Stop,

    /// Write a settings file with default values
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

fn parse_level(level: &str) -> TraceLevel {
    match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?
        .block_on(future)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;

    // CLI flag, then LOG_LEVEL, then the settings file
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| settings.log_level.clone());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    match cli.command.unwrap_or(Commands::Panel) {
        Commands::Panel => {
            info!("Starting panel");
            gui::run_panel(settings)
        }
        Commands::Daemon => block_on(daemon::run(settings)),
        Commands::Status => block_on(cli::status(&settings)),
        Commands::Set(args) => block_on(cli::set(&settings, &args)),
        Commands::Reset { verbose } => block_on(cli::reset(&settings, verbose)),
        Commands::Resume => block_on(cli::resume(&settings)),
        Commands::Ping => block_on(cli::ping(&settings)),
        Commands::Stop => block_on(cli::stop(&settings)),
        Commands::InitConfig { force } => {
            let path = cli.config.unwrap_or_else(Settings::default_path);
            cli::init_config(&path, force)
        }
    }
}
