//! Daemon error types

use thiserror::Error;

/// Errors surfaced by the daemon service
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Frame references a publication this daemon never mirrored
    #[error("no mirror for publication {0:#x}")]
    UnknownPub(u64),

    /// Wire-level failure
    #[error(transparent)]
    Protocol(#[from] beacon_protocol::ProtocolError),

    /// Queue or transport failure
    #[error(transparent)]
    Pipeline(#[from] beacon_pipeline::PipelineError),

    /// Id allocation failure while granting a client block
    #[error(transparent)]
    Allocation(#[from] beacon_client::ClientError),

    /// Listener setup failure
    #[error("listener error: {0}")]
    Listener(#[from] std::io::Error),
}

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;
