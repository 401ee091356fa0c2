//! Announce frame codec
//!
//! ANNOUNCE and REANNOUNCE frames carry the full element schema of a
//! publication - names, declared types, and metadata - but never values.
//! A peer that receives one replaces its mirror wholesale: merging is
//! forbidden because element indices from before a re-announce are not
//! guaranteed to describe the same slots afterward.
//!
//! # Payload Layout
//!
//! ```text
//! [title: str][node: str][program: str][process: u32][rank: u32]
//! [element_count: u32]
//!   per element:
//!   [name: str][value_type: u8]
//!   [layer: u8][nature: u8][semantic: u8][class: u8]
//!   [priority: u8][retention: u8][scope: u8][pattern: str]
//! ```
//!
//! Strings are u32-length-prefixed UTF-8.

use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::{Frame, FrameHeader, MsgType, Role};
use crate::meta::{Class, Layer, Metadata, Nature, Priority, Retention, Scope, Semantic};
use crate::pubs::{ProcessId, Publication};
use crate::value::ValueType;
use crate::wire::{put_string, Reader};
use crate::{ProtocolError, Result, MAX_ELEMENTS};

/// One element's schema as carried in an announce payload
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSchema {
    pub name: String,
    pub value_type: ValueType,
    pub meta: Metadata,
}

/// Decoded announce payload
#[derive(Debug, Clone)]
pub struct AnnounceBody {
    pub title: String,
    pub origin: ProcessId,
    pub elements: Vec<ElementSchema>,
}

/// Serialize a publication's schema into an Announce or Reannounce frame
///
/// `first` selects Announce; subsequent schema versions go out as
/// Reannounce so peers know to invalidate index assumptions.
pub fn encode_announce(publication: &Publication, sender_role: Role, first: bool) -> Frame {
    let mut payload = BytesMut::with_capacity(128 + publication.element_count() * 48);

    put_string(&mut payload, publication.title());
    put_string(&mut payload, &publication.origin().node);
    put_string(&mut payload, &publication.origin().program);
    payload.put_u32_le(publication.origin().process);
    payload.put_u32_le(publication.origin().rank);
    payload.put_u32_le(publication.element_count() as u32);

    for element in publication.elements() {
        put_string(&mut payload, element.name());
        payload.put_u8(element.value_type().as_u8());
        let m = element.meta();
        payload.put_u8(m.layer.as_u8());
        payload.put_u8(m.nature.as_u8());
        payload.put_u8(m.semantic.as_u8());
        payload.put_u8(m.class.as_u8());
        payload.put_u8(m.priority.as_u8());
        payload.put_u8(m.retention.as_u8());
        payload.put_u8(m.scope.as_u8());
        put_string(&mut payload, &m.pattern);
    }

    Frame {
        header: FrameHeader {
            msg_type: if first {
                MsgType::Announce
            } else {
                MsgType::Reannounce
            },
            sender_role,
            pub_guid: publication.guid(),
            version: publication.version(),
        },
        payload: payload.freeze(),
    }
}

/// Decode an announce payload
///
/// Validates every discriminant and the element count before any mirror
/// state is touched, so a malformed frame can never leave a half-replaced
/// schema behind.
pub fn decode_announce(payload: &Bytes) -> Result<AnnounceBody> {
    let mut r = Reader::new(payload);

    let title = r.string("title")?;
    let node = r.string("node")?;
    let program = r.string("program")?;
    let process = r.u32()?;
    let rank = r.u32()?;

    let count = r.u32()? as usize;
    if count > MAX_ELEMENTS {
        return Err(ProtocolError::TooManyElements {
            count,
            max: MAX_ELEMENTS,
        });
    }

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.string("element name")?;
        let value_type = read_enum(&mut r, "value_type", ValueType::from_u8)?;
        let layer = read_enum(&mut r, "layer", Layer::from_u8)?;
        let nature = read_enum(&mut r, "nature", Nature::from_u8)?;
        let semantic = read_enum(&mut r, "semantic", Semantic::from_u8)?;
        let class = read_enum(&mut r, "class", Class::from_u8)?;
        let priority = read_enum(&mut r, "priority", Priority::from_u8)?;
        let retention = read_enum(&mut r, "retention", Retention::from_u8)?;
        let scope = read_enum(&mut r, "scope", Scope::from_u8)?;
        let pattern = r.string("pattern")?;

        elements.push(ElementSchema {
            name,
            value_type,
            meta: Metadata {
                layer,
                nature,
                semantic,
                class,
                priority,
                retention,
                scope,
                pattern,
            },
        });
    }

    Ok(AnnounceBody {
        title,
        origin: ProcessId {
            node,
            process,
            rank,
            program,
        },
        elements,
    })
}

fn read_enum<T>(
    r: &mut Reader<'_>,
    what: &'static str,
    from_u8: impl Fn(u8) -> Option<T>,
) -> Result<T> {
    let raw = r.u8()?;
    from_u8(raw).ok_or(ProtocolError::UnknownDiscriminant { what, value: raw })
}

impl AnnounceBody {
    /// Build a fresh mirror publication from this announce
    pub fn into_mirror(self, guid: u64, version: u32) -> Publication {
        let mut mirror = Publication::new(guid, self.title, self.origin);
        mirror.replace_schema(
            version,
            self.elements
                .into_iter()
                .map(|e| (e.name, e.value_type, e.meta))
                .collect(),
        );
        mirror
    }

    /// Replace an existing mirror's schema in place, keeping its identity
    pub fn replace_into(self, mirror: &mut Publication, version: u32) {
        mirror.replace_schema(
            version,
            self.elements
                .into_iter()
                .map(|e| (e.name, e.value_type, e.meta))
                .collect(),
        );
    }
}
