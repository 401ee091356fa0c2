//! Start the daemon/leader server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use beacon_config::{Config, NodeRole, OverflowSetting};
use beacon_daemon::{DaemonServer, DaemonService, Pattern};
use beacon_pipeline::{DrainTask, OverflowPolicy, PeerId, RingQueue, TcpTransport};

/// Arguments for the start command
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/beacon.toml")]
    pub config: std::path::PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Log every frame matched by a catch-all subscription
    #[arg(long, default_value_t = false)]
    pub echo: bool,
}

pub async fn run(args: StartArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match config.node.role {
        NodeRole::Daemon | NodeRole::Leader => {}
        other => bail!(
            "beacond requires node.role daemon or leader, config says {}",
            other.as_str()
        ),
    }

    let token = CancellationToken::new();
    let mut service = DaemonService::new(&config);

    // a daemon with an upstream relays everything it mirrors to the leader
    if config.node.role == NodeRole::Daemon {
        if let Some(upstream) = &config.node.upstream {
            let transport = Arc::new(
                TcpTransport::connect(&upstream.address())
                    .await
                    .with_context(|| format!("connecting to leader at {}", upstream.address()))?,
            );
            let policy = match config.global.overflow {
                OverflowSetting::EvictForImmediate => OverflowPolicy::EvictForImmediate,
                OverflowSetting::RejectAll => OverflowPolicy::RejectAll,
                OverflowSetting::EvictAll => OverflowPolicy::EvictAll,
            };
            let queue = Arc::new(RingQueue::new(config.global.ring_capacity, policy));
            let drain = DrainTask::new(
                PeerId::from("leader"),
                Arc::clone(&queue),
                transport,
                token.clone(),
                Duration::from_millis(config.global.ack_timeout_ms),
            );
            tokio::spawn(async move {
                if let Err(err) = drain.run().await {
                    error!(%err, "leader relay stopped");
                }
            });
            service = service.with_upstream(queue);
            info!(leader = %upstream.address(), "relaying upstream");
        }
    }

    let service = Arc::new(service);

    if args.echo {
        let mut sub = service.subscribe(Pattern::any(), 1024);
        tokio::spawn(async move {
            while let Some(frame) = sub.frames.recv().await {
                info!(
                    msg_type = %frame.header.msg_type,
                    guid = frame.header.pub_guid,
                    version = frame.header.version,
                    bytes = frame.payload.len(),
                    "echo"
                );
            }
        });
    }

    let listener = DaemonServer::bind(&config.node.listen_on()).await?;
    let server = DaemonServer::new(Arc::clone(&service), token.clone());

    info!(
        role = config.node.role.as_str(),
        addr = %config.node.listen_on(),
        "beacond running"
    );

    tokio::select! {
        _ = server.run(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping");
            token.cancel();
        }
    }

    Ok(())
}
