//! Publish a synthetic stream against a running daemon
//!
//! Stands in for an instrumented application: registers, announces a
//! small publication, and streams values at a fixed rate. Useful for
//! smoke-testing a daemon/leader pair end to end.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use beacon_client::{Metadata, Nature, Runtime, Semantic, ValueType};
use beacon_config::Config;

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Path to configuration file (role must be client)
    #[arg(short, long, default_value = "configs/probe.toml")]
    pub config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Publication title to announce
    #[arg(long, default_value = "probe.stream")]
    pub title: String,

    /// Number of value updates to publish
    #[arg(long, default_value_t = 60)]
    pub count: u64,

    /// Delay between updates in milliseconds
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
}

pub async fn run(args: ProbeArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let runtime = Runtime::connect(config).await?;
    let stream = runtime.new_pub(&args.title)?;

    stream.add_element(
        "iteration",
        ValueType::Integer,
        Metadata::new()
            .nature(Nature::ExecWork)
            .semantic(Semantic::ValCounter),
    )?;
    stream.add_element(
        "elapsed",
        ValueType::Double,
        Metadata::new().semantic(Semantic::TimeSpan).pattern("s"),
    )?;
    stream.add_element("phase", ValueType::Text, Metadata::default())?;

    stream.announce()?;
    info!(guid = stream.guid(), title = %args.title, "announced");

    let started = std::time::Instant::now();
    stream.publish("phase", "running")?;
    for n in 1..=args.count {
        stream.publish("iteration", n as i64)?;
        stream.publish("elapsed", started.elapsed().as_secs_f64())?;
        stream.flush()?;
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    // the final phase change jumps the queue
    stream.publish_immediately("phase", "done")?;
    info!(
        iterations = args.count,
        elapsed_s = started.elapsed().as_secs_f64(),
        "probe finished"
    );

    runtime.finalize().await;
    Ok(())
}
