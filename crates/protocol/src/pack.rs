//! Delta value codec
//!
//! `pack` serializes a VALUE frame containing only the elements currently
//! dirty, each tagged with its element index and value-type discriminant,
//! then resets those elements to clean. Message size is bounded by churn
//! since the last pack, not by the publication's total element count.
//!
//! `repack` is the receiver-side inverse: it applies each (index, value)
//! pair to a mirrored publication, validating the index against the
//! mirrored element count and the type tag against the declared type.
//! Indices absent from the frame are left untouched.
//!
//! # Payload Layout
//!
//! ```text
//! [entry_count: u32]
//!   per entry: [index: u32][type: u8][value]
//! ```
//!
//! Integers are i64 LE, doubles are f64 LE bit patterns, text and blob are
//! u32-length-prefixed.
//!
//! # Locking
//!
//! The caller must hold the publication's lock across the whole `pack`
//! call: the snapshot and the dirty-to-clean reset happen under one
//! critical section, so a concurrent write can never be cleared without
//! having been serialized.

use bytes::{BufMut, BytesMut};

use crate::frame::{Frame, FrameHeader, MsgType, Role};
use crate::pubs::Publication;
use crate::value::{ValueData, ValueType};
use crate::wire::{put_bytes, put_string, Reader};
use crate::{ProtocolError, Result};

/// One decoded VALUE frame entry
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDelta {
    pub index: usize,
    pub data: ValueData,
}

/// Serialize the publication's dirty elements into a VALUE frame
///
/// Empty elements are never emitted; the receiver leaves its mirrored
/// value untouched for indices absent from the frame. Returns `None`
/// when nothing is dirty, so callers skip enqueueing empty frames.
pub fn pack(publication: &mut Publication, sender_role: Role) -> Option<Frame> {
    let mut payload = BytesMut::new();
    let mut indices = Vec::new();

    for (index, element) in publication.dirty() {
        // dirty implies written; an empty slot can never be dirty
        let Some(data) = element.value().data() else {
            continue;
        };
        payload.put_u32_le(index as u32);
        payload.put_u8(data.value_type().as_u8());
        match data {
            ValueData::Integer(v) => payload.put_u64_le(*v as u64),
            ValueData::Double(v) => payload.put_u64_le(v.to_bits()),
            ValueData::Text(s) => put_string(&mut payload, s),
            ValueData::Blob(b) => put_bytes(&mut payload, b),
        }
        indices.push(index);
    }

    if indices.is_empty() {
        return None;
    }

    let entry_count = indices.len() as u32;
    for index in indices {
        publication.element_value_mut(index).mark_clean();
    }
    publication.touch_publish();

    let mut framed = BytesMut::with_capacity(4 + payload.len());
    framed.put_u32_le(entry_count);
    framed.put_slice(&payload);

    Some(Frame {
        header: FrameHeader {
            msg_type: MsgType::Value,
            sender_role,
            pub_guid: publication.guid(),
            version: publication.version(),
        },
        payload: framed.freeze(),
    })
}

/// Decode a VALUE payload into deltas without applying them
pub fn decode_values(payload: &[u8]) -> Result<Vec<ValueDelta>> {
    let mut r = Reader::new(payload);
    let count = r.u32()? as usize;
    let mut deltas = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let index = r.u32()? as usize;
        let raw_type = r.u8()?;
        let value_type = ValueType::from_u8(raw_type)
            .ok_or(ProtocolError::UnknownDiscriminant {
                what: "value_type",
                value: raw_type,
            })?;
        let data = match value_type {
            ValueType::Integer => ValueData::Integer(r.i64()?),
            ValueType::Double => ValueData::Double(r.f64()?),
            ValueType::Text => ValueData::Text(r.string("text value")?),
            ValueType::Blob => ValueData::Blob(r.bytes()?),
        };
        deltas.push(ValueDelta { index, data });
    }
    Ok(deltas)
}

/// Apply a VALUE frame to a mirrored publication
///
/// Validation happens per entry: an out-of-range index yields
/// `SchemaMismatch` (recoverable by requesting a re-announce), a type tag
/// disagreement yields `TypeMismatch` (the frame is dropped). Entries
/// before the failing one are already applied; the caller decides whether
/// to keep or rebuild the mirror.
pub fn repack(mirror: &mut Publication, frame: &Frame) -> Result<usize> {
    debug_assert_eq!(frame.header.msg_type, MsgType::Value);
    let deltas = decode_values(&frame.payload)?;
    let applied = deltas.len();
    for delta in deltas {
        mirror.apply_at(delta.index, delta.data)?;
    }
    mirror.touch_publish();
    Ok(applied)
}
