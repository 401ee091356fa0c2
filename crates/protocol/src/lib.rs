//! Beacon Protocol - Publication model and wire codec
//!
//! This crate provides the types that flow through the observation bus:
//!
//! - `Value` - Tagged scalar (integer, double, text, blob) with dirty tracking
//! - `Metadata` - Per-element semantic descriptors (layer, nature, priority, ...)
//! - `Publication` - Named, schema-versioned set of typed elements
//! - `Frame` - Wire message (announce, value, acknowledge, ...)
//! - `pack`/`repack` - Delta serialization of only-dirty element values
//!
//! # Design Principles
//!
//! - **Zero-copy payloads**: Frame payloads use `bytes::Bytes` for
//!   reference-counted buffer sharing across queues and fan-out
//! - **Hand-rolled wire format**: Bounds-checked parsing without code
//!   generation; invalid input returns errors, never panics
//! - **Delta encoding**: A VALUE frame carries only the elements written
//!   since the last pack, so message size tracks churn, not schema width
//!
//! # Wire Format
//!
//! Every frame starts with a fixed 14-byte header followed by a
//! message-type-specific payload. On a stream transport, frames are
//! delimited by a 4-byte big-endian length prefix (see `beacon-pipeline`).

mod announce;
mod error;
mod frame;
mod meta;
mod pack;
mod pubs;
mod value;
mod wire;

pub use announce::{decode_announce, encode_announce, AnnounceBody, ElementSchema};
pub use error::ProtocolError;
pub use frame::{Frame, FrameHeader, MsgType, Role};
pub use pack::{decode_values, pack, repack, ValueDelta};
pub use pubs::{Element, ProcessId, Publication};
pub use value::{Value, ValueData, ValueState, ValueType};
pub use meta::{Class, Layer, Metadata, Nature, Priority, Retention, Scope, Semantic};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Size of the fixed frame header in bytes
pub const FRAME_HEADER_SIZE: usize = 14;

/// Maximum frame size accepted by decoders (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum element name length in bytes
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum number of elements in a single publication
pub const MAX_ELEMENTS: usize = 64 * 1024;

#[cfg(test)]
mod pubs_test;
