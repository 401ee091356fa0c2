//! Client error types

use thiserror::Error;

/// Errors surfaced by the client runtime
#[derive(Debug, Error)]
pub enum ClientError {
    /// The id space of this allocator scope is depleted
    ///
    /// Fatal for the scope; ids are never reissued or wrapped.
    #[error("id space exhausted at {max}")]
    AllocationExhausted { max: u64 },

    /// Operation attempted after the runtime was finalized
    #[error("runtime is shut down")]
    RuntimeShutdown,

    /// The daemon did not answer the register handshake
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// Publication handle refers to a freed publication
    #[error("publication {0:#x} no longer exists")]
    UnknownPub(u64),

    /// Wire-level failure
    #[error(transparent)]
    Protocol(#[from] beacon_protocol::ProtocolError),

    /// Queue or transport failure
    #[error(transparent)]
    Pipeline(#[from] beacon_pipeline::PipelineError),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
