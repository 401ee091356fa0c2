//! beacond - Beacon aggregation daemon
//!
//! # Usage
//!
//! ```bash
//! # Run a daemon or leader (role comes from the config)
//! beacond
//! beacond --config configs/beacon.toml
//!
//! # Publish a synthetic stream against a running daemon
//! beacond probe --config configs/probe.toml --count 100
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Beacon - distributed observation bus
#[derive(Parser, Debug)]
#[command(name = "beacond")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Global args that apply to start when no subcommand given
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/beacon.toml", global = true)]
    config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon/leader server
    Start(cmd::start::StartArgs),

    /// Publish a synthetic stream against a running daemon
    Probe(cmd::probe::ProbeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Start(args)) => {
            init_logging(&args.log_level)?;
            cmd::start::run(args).await
        }
        Some(Command::Probe(args)) => {
            init_logging(&args.log_level)?;
            cmd::probe::run(args).await
        }
        // No subcommand = run server (default behavior)
        None => {
            init_logging(&cli.log_level)?;
            let args = cmd::start::StartArgs {
                config: cli.config,
                log_level: cli.log_level,
                echo: false,
            };
            cmd::start::run(args).await
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
