//! Protocol error types
//!
//! Errors that can occur while building, parsing, or applying frames.

use thiserror::Error;

use crate::value::ValueType;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message is too short to contain required fields
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort { expected: usize, actual: usize },

    /// Message exceeds the maximum accepted frame size
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// A wire discriminant byte does not map to a known enum variant
    #[error("unknown {what} discriminant: {value}")]
    UnknownDiscriminant { what: &'static str, value: u8 },

    /// A VALUE frame entry references an element index the receiver
    /// does not have; the mirrored schema is stale or wrong
    #[error("schema mismatch: element index {index} outside mirrored schema of {element_count} elements (pub {guid})")]
    SchemaMismatch {
        guid: u64,
        index: usize,
        element_count: usize,
    },

    /// A VALUE frame entry's type tag disagrees with the announced metadata
    #[error("type mismatch for element {index}: frame says {frame_type}, schema says {schema_type}")]
    TypeMismatch {
        index: usize,
        frame_type: ValueType,
        schema_type: ValueType,
    },

    /// A publish targeted an element name never added to the publication
    #[error("unknown element: {0:?}")]
    UnknownElement(String),

    /// An element with this name already exists in the publication
    #[error("duplicate element: {0:?}")]
    DuplicateElement(String),

    /// A wire string is not valid UTF-8
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Element name exceeds the maximum length
    #[error("element name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    /// Element count in an announce frame exceeds the allowed maximum
    #[error("too many elements: {count} (max {max})")]
    TooManyElements { count: usize, max: usize },
}

impl ProtocolError {
    /// Create a message too short error
    #[inline]
    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Create an unknown discriminant error
    #[inline]
    pub fn unknown(what: &'static str, value: u8) -> Self {
        Self::UnknownDiscriminant { what, value }
    }

    /// Check whether this error should trigger a re-announce request
    /// rather than dropping the connection
    #[inline]
    pub fn wants_reannounce(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}
