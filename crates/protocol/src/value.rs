//! Value types for publication elements
//!
//! A `Value` pairs a tagged scalar payload with an explicit dirty/clean/empty
//! state flag. The state is tracked beside the payload, never inferred from
//! payload absence: an element that has been published and packed holds a
//! real payload in the `Clean` state.

use bytes::Bytes;

/// Value type discriminant
///
/// NOTE: These values are used on the wire as the type tag of VALUE frame
/// entries and must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// Fixed-width signed 64-bit integer
    Integer = 0,
    /// IEEE-754 64-bit float
    Double = 1,
    /// UTF-8 text, length-prefixed on the wire
    Text = 2,
    /// Opaque bytes, length-prefixed on the wire
    Blob = 3,
}

impl ValueType {
    /// Parse a value type from its wire discriminant
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Integer),
            1 => Some(Self::Double),
            2 => Some(Self::Text),
            3 => Some(Self::Blob),
            _ => None,
        }
    }

    /// Convert to the wire discriminant
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the string name of this value type
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Text => "text",
            Self::Blob => "blob",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Element value lifecycle state
///
/// - `Empty` - slot declared but never written
/// - `Dirty` - written since the last successful pack
/// - `Clean` - included in an outbound VALUE frame and not written since
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueState {
    Clean,
    Dirty,
    #[default]
    Empty,
}

/// Tagged scalar payload
///
/// The enum makes type confusion impossible at construction time; type
/// mismatches are only a runtime concern at deserialization boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Bytes),
}

impl ValueData {
    /// The type discriminant of this payload
    #[inline]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Integer(_) => ValueType::Integer,
            Self::Double(_) => ValueType::Double,
            Self::Text(_) => ValueType::Text,
            Self::Blob(_) => ValueType::Blob,
        }
    }

    /// Payload size on the wire, excluding the type tag
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Integer(_) | Self::Double(_) => 8,
            Self::Text(s) => 4 + s.len(),
            Self::Blob(b) => 4 + b.len(),
        }
    }
}

impl From<i64> for ValueData {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for ValueData {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for ValueData {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for ValueData {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Bytes> for ValueData {
    fn from(v: Bytes) -> Self {
        Self::Blob(v)
    }
}

impl std::fmt::Display for ValueData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// A value slot in a publication element
#[derive(Debug, Clone, Default)]
pub struct Value {
    data: Option<ValueData>,
    state: ValueState,
}

impl Value {
    /// An empty slot of no particular type
    #[inline]
    pub const fn empty() -> Self {
        Self {
            data: None,
            state: ValueState::Empty,
        }
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> ValueState {
        self.state
    }

    /// Current payload, if ever written
    #[inline]
    pub fn data(&self) -> Option<&ValueData> {
        self.data.as_ref()
    }

    /// Whether this slot has been written since the last pack
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.state == ValueState::Dirty
    }

    /// Write a payload and mark the slot dirty
    #[inline]
    pub fn write(&mut self, data: ValueData) {
        self.data = Some(data);
        self.state = ValueState::Dirty;
    }

    /// Mark the slot clean after its payload was serialized
    ///
    /// No-op on an `Empty` slot; packing never touches empty slots.
    #[inline]
    pub fn mark_clean(&mut self) {
        if self.state == ValueState::Dirty {
            self.state = ValueState::Clean;
        }
    }

    /// Apply a received payload to a mirrored slot
    ///
    /// Mirrors are always clean; dirtiness only exists on the owning side.
    #[inline]
    pub fn apply(&mut self, data: ValueData) {
        self.data = Some(data);
        self.state = ValueState::Clean;
    }
}
