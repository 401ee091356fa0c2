//! Wire frames
//!
//! Every message on the bus is a `Frame`: a fixed 14-byte header followed
//! by a message-type-specific payload held as zero-copy `Bytes`.
//!
//! ```text
//! [1: msg_type][1: sender_role][8: pub_guid LE][4: version LE][payload...]
//! ```
//!
//! Frames for publications without a guid context (check-in, shutdown) set
//! `pub_guid` to 0.

use bytes::{BufMut, Bytes, BytesMut};

use crate::pubs::ProcessId;
use crate::wire::{put_string, Reader};
use crate::{ProtocolError, Result, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};

/// Message type discriminant
///
/// NOTE: Wire-stable; new types append at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// First frame from a client: process identity, answered by an
    /// Acknowledge carrying a guid block grant
    Register = 0,
    /// Full schema definition, no values
    Announce = 1,
    /// Schema replacement after element addition
    Reannounce = 2,
    /// Delta-encoded dirty values
    Value = 3,
    /// Receipt confirmation for types that require one
    Acknowledge = 4,
    /// Receiver asks the owner to re-announce after a schema mismatch
    AnnounceRequest = 5,
    /// Periodic liveness signal
    CheckIn = 6,
    /// Orderly teardown; always the last frame on a connection
    Shutdown = 7,
    /// Peer drops its mirror of the publication; owner keeps its copy
    Unannounce = 8,
}

impl MsgType {
    /// Parse from the wire discriminant
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Register),
            1 => Some(Self::Announce),
            2 => Some(Self::Reannounce),
            3 => Some(Self::Value),
            4 => Some(Self::Acknowledge),
            5 => Some(Self::AnnounceRequest),
            6 => Some(Self::CheckIn),
            7 => Some(Self::Shutdown),
            8 => Some(Self::Unannounce),
            _ => None,
        }
    }

    /// Convert to the wire discriminant
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the sender must wait for an Acknowledge frame
    ///
    /// Schema traffic is acknowledged so the owner knows the peer's mirror
    /// is current; value traffic is fire-and-forget.
    #[inline]
    pub const fn requires_ack(self) -> bool {
        matches!(self, Self::Register | Self::Announce | Self::Reannounce)
    }

    /// Get the string name of this message type
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Announce => "announce",
            Self::Reannounce => "reannounce",
            Self::Value => "value",
            Self::Acknowledge => "acknowledge",
            Self::AnnounceRequest => "announce_request",
            Self::CheckIn => "check_in",
            Self::Shutdown => "shutdown",
            Self::Unannounce => "unannounce",
        }
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Process role on the bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Role {
    #[default]
    Client = 0,
    Daemon = 1,
    Leader = 2,
    Control = 3,
}

impl Role {
    /// Parse from the wire discriminant
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Client),
            1 => Some(Self::Daemon),
            2 => Some(Self::Leader),
            3 => Some(Self::Control),
            _ => None,
        }
    }

    /// Convert to the wire discriminant
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the string name of this role
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Daemon => "daemon",
            Self::Leader => "leader",
            Self::Control => "control",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_type: MsgType,
    pub sender_role: Role,
    pub pub_guid: u64,
    pub version: u32,
}

impl FrameHeader {
    /// Encode the header into a buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type.as_u8());
        buf.put_u8(self.sender_role.as_u8());
        buf.put_u64_le(self.pub_guid);
        buf.put_u32_le(self.version);
    }

    /// Decode a header from the front of a frame
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::too_short(FRAME_HEADER_SIZE, buf.len()));
        }
        let msg_type = MsgType::from_u8(buf[0])
            .ok_or(ProtocolError::UnknownDiscriminant {
                what: "msg_type",
                value: buf[0],
            })?;
        let sender_role = Role::from_u8(buf[1])
            .ok_or(ProtocolError::UnknownDiscriminant {
                what: "sender_role",
                value: buf[1],
            })?;
        let pub_guid = u64::from_le_bytes(buf[2..10].try_into().unwrap());
        let version = u32::from_le_bytes(buf[10..14].try_into().unwrap());
        Ok(Self {
            msg_type,
            sender_role,
            pub_guid,
            version,
        })
    }
}

/// A complete wire frame: header plus zero-copy payload
///
/// Cloning a `Frame` is O(1); the payload is reference-counted, so the
/// same frame can sit in a ring queue and fan out to many subscribers
/// without copying.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame with an empty payload
    pub fn empty(msg_type: MsgType, sender_role: Role, pub_guid: u64, version: u32) -> Self {
        Self {
            header: FrameHeader {
                msg_type,
                sender_role,
                pub_guid,
                version,
            },
            payload: Bytes::new(),
        }
    }

    /// Total encoded size: header plus payload
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Serialize header and payload into one contiguous buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header.encode_into(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a frame from one contiguous buffer
    ///
    /// The payload is sliced out of `buf` without copying.
    pub fn decode(buf: Bytes) -> Result<Self> {
        if buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: buf.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let header = FrameHeader::decode(&buf)?;
        Ok(Self {
            header,
            payload: buf.slice(FRAME_HEADER_SIZE..),
        })
    }

    /// Build an Acknowledge for a received frame
    ///
    /// Echoes the acked guid and version; the payload carries the acked
    /// message type so the sender can match it against what it is waiting
    /// on.
    pub fn ack_for(received: &FrameHeader, sender_role: Role) -> Self {
        let mut payload = BytesMut::with_capacity(1);
        payload.put_u8(received.msg_type.as_u8());
        Self {
            header: FrameHeader {
                msg_type: MsgType::Acknowledge,
                sender_role,
                pub_guid: received.pub_guid,
                version: received.version,
            },
            payload: payload.freeze(),
        }
    }

    /// The message type an Acknowledge frame is confirming, if present
    pub fn acked_msg_type(&self) -> Option<MsgType> {
        if self.header.msg_type != MsgType::Acknowledge {
            return None;
        }
        self.payload.first().copied().and_then(MsgType::from_u8)
    }

    /// Build an Acknowledge for a Register frame carrying a guid block grant
    ///
    /// The grant is the half-open id range `[start, start + count)` the
    /// client may allocate from without further coordination.
    pub fn ack_with_grant(
        received: &FrameHeader,
        sender_role: Role,
        start: u64,
        count: u64,
    ) -> Self {
        let mut payload = BytesMut::with_capacity(1 + 16);
        payload.put_u8(received.msg_type.as_u8());
        payload.put_u64_le(start);
        payload.put_u64_le(count);
        Self {
            header: FrameHeader {
                msg_type: MsgType::Acknowledge,
                sender_role,
                pub_guid: received.pub_guid,
                version: received.version,
            },
            payload: payload.freeze(),
        }
    }

    /// Build the Register frame a client opens its connection with
    ///
    /// Carries the process identity so the daemon can label the
    /// connection; the reply is an Acknowledge with a guid block grant.
    pub fn register(origin: &ProcessId, sender_role: Role) -> Self {
        let mut payload = BytesMut::with_capacity(32);
        put_string(&mut payload, &origin.node);
        put_string(&mut payload, &origin.program);
        payload.put_u32_le(origin.process);
        payload.put_u32_le(origin.rank);
        Self {
            header: FrameHeader {
                msg_type: MsgType::Register,
                sender_role,
                pub_guid: 0,
                version: 0,
            },
            payload: payload.freeze(),
        }
    }

    /// Decode the process identity from a Register payload
    pub fn register_origin(&self) -> Result<ProcessId> {
        let mut r = Reader::new(&self.payload);
        let node = r.string("node")?;
        let program = r.string("program")?;
        let process = r.u32()?;
        let rank = r.u32()?;
        Ok(ProcessId {
            node,
            process,
            rank,
            program,
        })
    }

    /// The guid block grant carried by a Register acknowledgment
    pub fn guid_grant(&self) -> Option<(u64, u64)> {
        if self.acked_msg_type() != Some(MsgType::Register) || self.payload.len() < 17 {
            return None;
        }
        let start = u64::from_le_bytes(self.payload[1..9].try_into().unwrap());
        let count = u64::from_le_bytes(self.payload[9..17].try_into().unwrap());
        Some((start, count))
    }
}
