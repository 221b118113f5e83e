//! # Ping packets (v3)
//!
//! Fixed 301-byte layout used both as the periodic discovery beacon and as
//! the unicast reply to a controller's ping.
//!
//! ```text
//! off  len  field
//!   0    4  "FPPD"
//!   4    1  packet type (4)
//!   5    2  extra data length (294, little-endian)
//!   7    1  ping version (3)
//!   8    1  subtype (0 = announce)
//!   9    1  hardware type
//!  10    2  major version (big-endian)
//!  12    2  minor version (big-endian)
//!  14    1  operating mode flags (0x08 = remote)
//!  15    4  IPv4 address
//!  19   65  host name        (64 + NUL)
//!  84   41  version string   (40 + NUL)
//! 125   41  hardware string  (40 + NUL)
//! 166  121  channel ranges   (120 + NUL)
//! 287   14  zero
//! ```

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};

use crate::sync::nul_terminated;
use crate::wire::{self, DecodeError, PacketType, COMMON_HEADER_LEN, HEADER_TAG};

/// Total length of a v3 ping.
pub const PING_PACKET_LEN: usize = 301;

/// Extra data length advertised in the header.
pub const PING_DATA_LEN: u16 = 294;

/// Layout version this crate emits.
pub const PING_VERSION: u8 = 3;

/// Mode flag for a follower controlled by a remote master.
pub const MODE_REMOTE: u8 = 0x08;

/// Hardware type used when none is configured.
pub const DEFAULT_HARDWARE_TYPE: u8 = 0xC3;

pub const HOSTNAME_SLOT: usize = 65;
pub const VERSION_SLOT: usize = 41;
pub const HARDWARE_SLOT: usize = 41;
pub const CHANNEL_RANGES_SLOT: usize = 121;

const FIXED_FIELDS_LEN: usize = 12;
const STRINGS_END: usize =
    COMMON_HEADER_LEN + FIXED_FIELDS_LEN + HOSTNAME_SLOT + VERSION_SLOT + HARDWARE_SLOT + CHANNEL_RANGES_SLOT;

// ─── Ping Packet ─────────────────────────────────────────────────────────────

/// A device's discovery identity as carried in a v3 ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingPacket {
    pub subtype: u8,
    pub hardware_type: u8,
    pub version_major: u16,
    pub version_minor: u16,
    pub mode_flags: u8,
    pub ip: Ipv4Addr,
    pub hostname: String,
    pub version: String,
    pub hardware: String,
    pub channel_ranges: String,
}

impl Default for PingPacket {
    fn default() -> Self {
        PingPacket {
            subtype: 0,
            hardware_type: DEFAULT_HARDWARE_TYPE,
            version_major: 0,
            version_minor: 0,
            mode_flags: MODE_REMOTE,
            ip: Ipv4Addr::UNSPECIFIED,
            hostname: String::new(),
            version: String::new(),
            hardware: String::new(),
            channel_ranges: String::new(),
        }
    }
}

impl PingPacket {
    /// Serialize into exactly [`PING_PACKET_LEN`] bytes.
    ///
    /// Strings longer than their slot are truncated so the slot always ends
    /// in at least one NUL.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PING_PACKET_LEN);
        buf.put_slice(&HEADER_TAG);
        buf.put_u8(PacketType::Ping as u8);
        buf.put_u16_le(PING_DATA_LEN);
        buf.put_u8(PING_VERSION);
        buf.put_u8(self.subtype);
        buf.put_u8(self.hardware_type);
        buf.put_u16(self.version_major);
        buf.put_u16(self.version_minor);
        buf.put_u8(self.mode_flags);
        buf.put_slice(&self.ip.octets());
        put_str_slot(&mut buf, &self.hostname, HOSTNAME_SLOT);
        put_str_slot(&mut buf, &self.version, VERSION_SLOT);
        put_str_slot(&mut buf, &self.hardware, HARDWARE_SLOT);
        put_str_slot(&mut buf, &self.channel_ranges, CHANNEL_RANGES_SLOT);
        buf.put_bytes(0, PING_PACKET_LEN - STRINGS_END);
        debug_assert_eq!(buf.len(), PING_PACKET_LEN);
        buf
    }

    /// Decode a full v3 ping, checking the tag and packet type first.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        wire::expect_type(data, PacketType::Ping)?;
        if data.len() < PING_PACKET_LEN {
            return Err(DecodeError::PingTooShort(data.len()));
        }

        let mut buf = &data[COMMON_HEADER_LEN..];
        let ping_version = buf.get_u8();
        if ping_version < PING_VERSION {
            return Err(DecodeError::UnsupportedPingVersion(ping_version));
        }
        let subtype = buf.get_u8();
        let hardware_type = buf.get_u8();
        let version_major = buf.get_u16();
        let version_minor = buf.get_u16();
        let mode_flags = buf.get_u8();
        let ip = Ipv4Addr::from(buf.get_u32());
        let hostname = take_str_slot(&mut buf, HOSTNAME_SLOT);
        let version = take_str_slot(&mut buf, VERSION_SLOT);
        let hardware = take_str_slot(&mut buf, HARDWARE_SLOT);
        let channel_ranges = take_str_slot(&mut buf, CHANNEL_RANGES_SLOT);

        Ok(PingPacket {
            subtype,
            hardware_type,
            version_major,
            version_minor,
            mode_flags,
            ip,
            hostname,
            version,
            hardware,
            channel_ranges,
        })
    }
}

fn put_str_slot(buf: &mut BytesMut, value: &str, slot: usize) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(slot - 1);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, slot - n);
}

fn take_str_slot(buf: &mut &[u8], slot: usize) -> String {
    let (field, rest) = buf.split_at(slot);
    *buf = rest;
    nul_terminated(field)
}

// ─── Ping Request ────────────────────────────────────────────────────────────

/// An inbound ping. Any ping is answered, whether or not it carried a full
/// v3 identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    /// 0 = announce, 1 = discover. Zero when the datagram is too short to say.
    pub subtype: u8,
    /// Sender identity, present when the datagram was a complete v3 ping.
    pub peer: Option<PingPacket>,
}

/// Decode a ping datagram, checking the tag and packet type first.
pub fn decode_ping(data: &[u8]) -> Result<PingRequest, DecodeError> {
    wire::expect_type(data, PacketType::Ping)?;
    Ok(decode_request(data))
}

pub(crate) fn decode_request(data: &[u8]) -> PingRequest {
    PingRequest {
        subtype: data.get(COMMON_HEADER_LEN + 1).copied().unwrap_or(0),
        peer: PingPacket::decode(data).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PingPacket {
        PingPacket {
            hardware_type: 0xC3,
            version_major: 16,
            version_minor: 2,
            ip: Ipv4Addr::new(192, 168, 1, 40),
            hostname: "porch-lights".into(),
            version: "16.2-beta".into(),
            hardware: "WLED".into(),
            ..PingPacket::default()
        }
    }

    #[test]
    fn encodes_fixed_layout() {
        let buf = sample().encode();
        assert_eq!(buf.len(), PING_PACKET_LEN);
        assert_eq!(&buf[0..4], b"FPPD");
        assert_eq!(buf[4], 0x04);
        assert_eq!(&buf[5..7], &[0x26, 0x01]); // 294 little-endian
        assert_eq!(buf[7], 3);
        assert_eq!(buf[8], 0);
        assert_eq!(buf[9], 0xC3);
        assert_eq!(&buf[10..14], &[0, 16, 0, 2]);
        assert_eq!(buf[14], MODE_REMOTE);
        assert_eq!(&buf[15..19], &[192, 168, 1, 40]);
        assert_eq!(&buf[19..31], b"porch-lights");
        assert_eq!(buf[31], 0);
        assert_eq!(&buf[84..93], b"16.2-beta");
        assert_eq!(&buf[125..129], b"WLED");
        assert!(buf[166..].iter().all(|&b| b == 0));
    }

    #[test]
    fn roundtrip_recovers_fields() {
        let pkt = sample();
        let decoded = PingPacket::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn overlong_strings_are_truncated_not_overflowed() {
        let pkt = PingPacket {
            hostname: "h".repeat(200),
            version: "v".repeat(41),
            hardware: "w".repeat(40),
            ..sample()
        };
        let buf = pkt.encode();
        assert_eq!(buf.len(), PING_PACKET_LEN);
        assert_eq!(buf[19 + 64], 0);
        assert_eq!(buf[84 + 40], 0);

        let decoded = PingPacket::decode(&buf).unwrap();
        assert_eq!(decoded.hostname, "h".repeat(64));
        assert_eq!(decoded.version, "v".repeat(40));
        assert_eq!(decoded.hardware, "w".repeat(40));
        assert_eq!(decoded.ip, pkt.ip);
    }

    #[test]
    fn short_ping_still_yields_request() {
        let req = decode_ping(b"FPPD\x04\x00\x00\x02\x01").unwrap();
        assert_eq!(req.subtype, 1);
        assert!(req.peer.is_none());

        let req = decode_ping(b"FPPD\x04").unwrap();
        assert_eq!(req.subtype, 0);
    }

    #[test]
    fn full_ping_request_carries_peer() {
        let req = decode_ping(&sample().encode()).unwrap();
        assert_eq!(req.peer.unwrap().hostname, "porch-lights");
    }

    #[test]
    fn rejects_old_ping_version() {
        let mut buf = sample().encode();
        buf[7] = 2;
        assert_eq!(
            PingPacket::decode(&buf),
            Err(DecodeError::UnsupportedPingVersion(2))
        );
    }

    #[test]
    fn rejects_truncated_ping() {
        let buf = sample().encode();
        assert_eq!(
            PingPacket::decode(&buf[..200]),
            Err(DecodeError::PingTooShort(200))
        );
    }
}
