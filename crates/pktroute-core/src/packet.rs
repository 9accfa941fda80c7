//! Packet layout: the fixed-format binary message exchanged between nodes.
//!
//! Every packet starts with an 8-byte header. The routing tags (`src`,
//! `dest`) live at fixed offsets so the transport can route a packet
//! without deserializing it. The total length is a single byte, which
//! caps a packet at 255 bytes.
//!
//! The header is `#[repr(C, packed)]` with zerocopy derives; multi-byte
//! fields are stored as byte arrays in network order so no unaligned
//! access is ever needed.

use std::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Header ───────────────────────────────────────────────────────────────────

/// Fixed packet header.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    /// Total packet length in bytes, header included.
    /// Used by stream sockets to find the end of a packet.
    pub length: u8,

    /// Application that produced the packet.
    pub src: u8,

    /// Application the packet is addressed to.
    pub dest: u8,

    /// 1 = command, 2 = report.
    pub kind: u8,

    pub service_type: u8,

    pub service_subtype: u8,

    /// Sequence counter, big-endian.
    pub seq_cnt: [u8; 2],
}

assert_eq_size!(PacketHeader, [u8; 8]);

/// Size of [`PacketHeader`] on the wire.
pub const HEADER_LEN: usize = std::mem::size_of::<PacketHeader>();

/// Largest length a packet can declare in its one-byte length field.
pub const MAX_PACKET_LEN: usize = u8::MAX as usize;

const OFFSET_LENGTH: usize = 0;
const OFFSET_SRC: usize = 1;

// ── Routing tag ──────────────────────────────────────────────────────────────

/// Identifier of an application, used both as packet source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestSrc(pub u8);

impl DestSrc {
    pub const MASTER: DestSrc = DestSrc(1);
    pub const SLAVE_1: DestSrc = DestSrc(2);
    pub const SLAVE_2: DestSrc = DestSrc(3);
}

impl fmt::Display for DestSrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DestSrc::MASTER => f.write_str("master"),
            DestSrc::SLAVE_1 => f.write_str("slave-1"),
            DestSrc::SLAVE_2 => f.write_str("slave-2"),
            DestSrc(other) => write!(f, "app-{other}"),
        }
    }
}

// ── Kind ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Command = 0x01,
    Report = 0x02,
}

impl TryFrom<u8> for PacketKind {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketKind::Command),
            0x02 => Ok(PacketKind::Report),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(k: PacketKind) -> u8 {
        k as u8
    }
}

// ── Packet ───────────────────────────────────────────────────────────────────

/// An owned packet. Always at least [`HEADER_LEN`] bytes, never more than
/// [`MAX_PACKET_LEN`], and its length byte always matches its real length.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
}

/// Header fields supplied when building a packet.
#[derive(Debug, Clone, Copy)]
pub struct PacketFields {
    pub src: DestSrc,
    pub dest: DestSrc,
    pub kind: PacketKind,
    pub service_type: u8,
    pub service_subtype: u8,
    pub seq_cnt: u16,
}

impl Packet {
    /// Build a packet from header fields and a parameter area.
    pub fn build(fields: PacketFields, params: &[u8]) -> Result<Self, PacketError> {
        let total = HEADER_LEN + params.len();
        if total > MAX_PACKET_LEN {
            return Err(PacketError::TooLong {
                len: total,
                max: MAX_PACKET_LEN,
            });
        }
        let header = PacketHeader {
            length: total as u8,
            src: fields.src.0,
            dest: fields.dest.0,
            kind: fields.kind.into(),
            service_type: fields.service_type,
            service_subtype: fields.service_subtype,
            seq_cnt: fields.seq_cnt.to_be_bytes(),
        };
        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(params);
        Ok(Self { bytes })
    }

    /// Adopt raw bytes received from the wire.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::TooShort(bytes.len()));
        }
        if bytes.len() > MAX_PACKET_LEN {
            return Err(PacketError::TooLong {
                len: bytes.len(),
                max: MAX_PACKET_LEN,
            });
        }
        let declared = bytes[OFFSET_LENGTH] as usize;
        if declared != bytes.len() {
            return Err(PacketError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn header(&self) -> PacketHeader {
        // Length is checked on construction, so the prefix is always there.
        PacketHeader::read_from_prefix(&self.bytes).unwrap_or_else(PacketHeader::new_zeroed)
    }

    pub fn src(&self) -> DestSrc {
        DestSrc(self.bytes[OFFSET_SRC])
    }

    pub fn dest(&self) -> DestSrc {
        DestSrc(self.header().dest)
    }

    pub fn kind(&self) -> Result<PacketKind, PacketError> {
        PacketKind::try_from(self.header().kind)
    }

    /// `(service_type, service_subtype)`.
    pub fn service(&self) -> (u8, u8) {
        let h = self.header();
        (h.service_type, h.service_subtype)
    }

    pub fn seq_cnt(&self) -> u16 {
        u16::from_be_bytes(self.header().seq_cnt)
    }

    /// The parameter area following the header.
    pub fn params(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("src", &self.src())
            .field("dest", &self.dest())
            .field("seq_cnt", &self.seq_cnt())
            .field("len", &self.len())
            .finish()
    }
}

/// Read the declared length of a packet from the first bytes of a stream.
/// Returns `None` if `prefix` is empty.
pub fn peek_length(prefix: &[u8]) -> Option<usize> {
    prefix.get(OFFSET_LENGTH).map(|&b| b as usize)
}

/// Read the source tag from raw bytes without building a [`Packet`].
pub fn peek_src(prefix: &[u8]) -> Option<DestSrc> {
    prefix.get(OFFSET_SRC).copied().map(DestSrc)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet of {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    TooShort(usize),

    #[error("packet length {len} exceeds maximum {max}")]
    TooLong { len: usize, max: usize },

    #[error("declared length {declared} does not match actual length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown packet kind: 0x{0:02x}")]
    UnknownKind(u8),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
