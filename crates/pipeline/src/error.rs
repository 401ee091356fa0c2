//! Pipeline error types

use thiserror::Error;

/// Errors that can occur in the transport pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Ring queue is full and the frame's priority does not evict
    #[error("ring queue full ({capacity} frames), frame dropped")]
    QueueOverflow { capacity: usize },

    /// Queue accepted a shutdown frame and no longer takes enqueues
    #[error("ring queue sealed for shutdown")]
    QueueSealed,

    /// Send or receive failed in the transport collaborator
    ///
    /// Retry and reconnect policy belongs to the transport, not here.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Peer did not acknowledge within the configured window
    #[error("acknowledge timeout after {0} ms")]
    AckTimeout(u64),

    /// Transport closed by the peer
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Operation attempted during or after teardown
    #[error("pipeline is shutting down")]
    ShuttingDown,
}

impl PipelineError {
    /// Create a transport failure from any error source
    #[inline]
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
