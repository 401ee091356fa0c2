//! Beacon Pipeline - Queued transport between bus peers
//!
//! The pipeline moves serialized frames from publishers to their peers with
//! bounded memory and strict per-peer ordering:
//!
//! ```text
//! [publish/announce] --> RingQueue (per peer) --> DrainTask --> Transport
//!                              |                     |
//!                         overflow policy       ack waiting
//! ```
//!
//! # Key Design
//!
//! - **Bounded rings**: One fixed-capacity ring queue per outbound peer;
//!   overflow policy depends on frame priority (reject-newest for normal
//!   traffic, evict-oldest for immediate traffic)
//! - **MPSC discipline**: Many publisher-side flush calls may enqueue;
//!   exactly one drain task per queue dequeues and performs all I/O
//! - **FIFO per queue**: Priority affects overflow eviction only, never
//!   in-queue ordering
//! - **Abstract transport**: The core only needs `send`/`recv` on bytes;
//!   socket creation, reconnection and retry live with the owner of the
//!   `Transport` implementation

mod drain;
mod error;
mod metrics;
mod ring;
mod ring_set;
mod task;
mod transport;

pub use drain::DrainTask;
pub use error::{PipelineError, Result};
pub use metrics::{RingMetrics, RingMetricsSnapshot};
pub use ring::{FrameState, OverflowPolicy, QueuedFrame, RingQueue};
pub use ring_set::RingSet;
pub use task::TaskSet;
pub use transport::{
    read_frame_bytes, write_frame_bytes, ChannelTransport, PeerId, SocketSet, TcpTransport,
    Transport,
};

/// Default ring queue capacity (frames per peer)
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// Default time to wait for an Acknowledge frame
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;

/// Default time finalize waits for queues to drain
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2_000;

// Test modules - only compiled during testing
#[cfg(test)]
mod drain_test;
