//! # Multi-sync common header
//!
//! ```text
//!  0       4       5               7
//! +-------+-------+---------------+---------------------------
//! | FPPD  | type  | data len (16) | type specific body ...
//! +-------+-------+---------------+---------------------------
//! ```
//!
//! The data length is written little-endian by some producers and
//! big-endian by others, so it is never used to validate a datagram. Body
//! boundaries are derived from the received datagram length instead.

use std::fmt;
use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use crate::ping::{self, PingRequest};
use crate::sync::{self, SyncPacket};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Tag at the start of every multi-sync datagram.
pub const HEADER_TAG: [u8; 4] = *b"FPPD";

/// Tag + packet type + data length.
pub const COMMON_HEADER_LEN: usize = 7;

/// UDP port used for sync, blank and ping traffic.
pub const MULTISYNC_PORT: u16 = 32320;

/// Multicast group controllers send sync packets to.
pub const MULTISYNC_GROUP: Ipv4Addr = Ipv4Addr::new(239, 70, 80, 80);

/// Destination for the periodic discovery beacon.
pub const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

// ─── Packet Type ─────────────────────────────────────────────────────────────

/// Packet kind carried at offset 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Sync = 0x01,
    Blank = 0x03,
    Ping = 0x04,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(PacketType::Sync),
            0x03 => Some(PacketType::Blank),
            0x04 => Some(PacketType::Ping),
            _ => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Sync => f.write_str("sync"),
            PacketType::Blank => f.write_str("blank"),
            PacketType::Ping => f.write_str("ping"),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Reasons a datagram was not turned into a [`Datagram`].
///
/// None of these are fatal; receivers log them at debug level and drop the
/// datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Shorter than the tag, or the tag is not `"FPPD"`.
    #[error("not a multi-sync datagram")]
    NotMultiSync,
    /// Tag present but the datagram ends before the packet type byte.
    #[error("datagram truncated after {0} bytes")]
    Truncated(usize),
    /// Packet type byte not understood by a follower.
    #[error("unknown packet type {0:#04x}")]
    UnknownType(u8),
    /// A per-kind decoder was handed a different packet kind.
    #[error("expected {expected} packet, got type {actual:#04x}")]
    WrongType { expected: PacketType, actual: u8 },
    /// Sync datagram without room for a filename.
    #[error("sync packet too short ({0} bytes)")]
    SyncTooShort(usize),
    /// Ping datagram shorter than the full v3 layout.
    #[error("ping packet too short ({0} bytes)")]
    PingTooShort(usize),
    /// Ping layout version older than 3.
    #[error("unsupported ping version {0}")]
    UnsupportedPingVersion(u8),
}

// ─── Header ──────────────────────────────────────────────────────────────────

/// Validate the tag and return the packet type byte.
pub fn packet_type_byte(data: &[u8]) -> Result<u8, DecodeError> {
    if data.len() < HEADER_TAG.len() || data[..HEADER_TAG.len()] != HEADER_TAG {
        return Err(DecodeError::NotMultiSync);
    }
    data.get(HEADER_TAG.len())
        .copied()
        .ok_or(DecodeError::Truncated(data.len()))
}

/// Validate the tag and require a specific packet type.
pub(crate) fn expect_type(data: &[u8], expected: PacketType) -> Result<(), DecodeError> {
    let actual = packet_type_byte(data)?;
    if actual != expected as u8 {
        return Err(DecodeError::WrongType { expected, actual });
    }
    Ok(())
}

/// Write the tag, packet type and data length.
///
/// `data_len` is written big-endian; callers that must match a
/// little-endian producer write the header themselves.
pub(crate) fn put_header(buf: &mut BytesMut, packet_type: PacketType, data_len: u16) {
    buf.put_slice(&HEADER_TAG);
    buf.put_u8(packet_type as u8);
    buf.put_u16(data_len);
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// A decoded multi-sync datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    Sync(SyncPacket),
    Blank,
    Ping(PingRequest),
}

impl Datagram {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Datagram::Sync(_) => PacketType::Sync,
            Datagram::Blank => PacketType::Blank,
            Datagram::Ping(_) => PacketType::Ping,
        }
    }
}

/// Decode any multi-sync datagram a follower understands.
pub fn decode(data: &[u8]) -> Result<Datagram, DecodeError> {
    let type_byte = packet_type_byte(data)?;
    match PacketType::from_byte(type_byte) {
        Some(PacketType::Sync) => sync::decode_body(data).map(Datagram::Sync),
        Some(PacketType::Blank) => Ok(Datagram::Blank),
        Some(PacketType::Ping) => Ok(Datagram::Ping(ping::decode_request(data))),
        None => Err(DecodeError::UnknownType(type_byte)),
    }
}

/// Encode a blank packet (header only, zero data length).
pub fn encode_blank() -> BytesMut {
    let mut buf = BytesMut::with_capacity(COMMON_HEADER_LEN);
    put_header(&mut buf, PacketType::Blank, 0);
    buf
}
