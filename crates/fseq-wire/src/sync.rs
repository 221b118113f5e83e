//! # Sync packets
//!
//! ```text
//!  0      4    5         7        8       9             13             17
//! +------+----+---------+--------+-------+-------------+--------------+-------------
//! | FPPD | 01 | len(16) | action | type  | frame (u32) | elapsed (f32)| filename ...
//! +------+----+---------+--------+-------+-------------+--------------+-------------
//! ```
//!
//! Two layouts share these offsets:
//!
//! - **Legacy**: the filename is a fixed 64-byte NUL padded field, followed
//!   by a 128-byte raw area. Anything at least 81 bytes long is read this way.
//! - **Compact**: the filename runs from offset 17 to the end of the
//!   datagram.
//!
//! Frame number and elapsed seconds are copied in the host's native byte
//! order and float representation, which is what the controllers in the
//! field emit. This only interoperates between hosts that agree on both.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::wire::{self, DecodeError, PacketType, COMMON_HEADER_LEN};

/// Header + action + sync type + frame number + elapsed seconds.
pub const SYNC_FIXED_LEN: usize = 17;

/// Width of the filename field in the legacy layout.
pub const FILENAME_FIELD_LEN: usize = 64;

/// Shortest datagram decoded with the legacy layout.
pub const LEGACY_MIN_LEN: usize = SYNC_FIXED_LEN + FILENAME_FIELD_LEN;

/// Trailing raw area of the legacy struct (always zero when we encode).
pub const LEGACY_RAW_LEN: usize = 128;

/// Full legacy packet as emitted by older controllers.
pub const LEGACY_PACKET_LEN: usize = LEGACY_MIN_LEN + LEGACY_RAW_LEN;

// ─── Sync Action ─────────────────────────────────────────────────────────────

/// Verb carried by a sync packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Start,
    Stop,
    Resync,
    /// Metadata request; followers acknowledge nothing.
    Open,
    Unknown(u8),
}

impl SyncAction {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => SyncAction::Start,
            1 => SyncAction::Stop,
            2 => SyncAction::Resync,
            3 => SyncAction::Open,
            other => SyncAction::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SyncAction::Start => 0,
            SyncAction::Stop => 1,
            SyncAction::Resync => 2,
            SyncAction::Open => 3,
            SyncAction::Unknown(b) => b,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Start => f.write_str("start"),
            SyncAction::Stop => f.write_str("stop"),
            SyncAction::Resync => f.write_str("resync"),
            SyncAction::Open => f.write_str("open"),
            SyncAction::Unknown(b) => write!(f, "unknown({b})"),
        }
    }
}

// ─── Sync Packet ─────────────────────────────────────────────────────────────

/// Which of the two observed layouts a sync packet was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLayout {
    Legacy,
    Compact,
}

/// Decoded sync command.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPacket {
    pub layout: SyncLayout,
    pub action: SyncAction,
    /// 0 = sequence file, 1 = media file.
    pub sync_type: u8,
    pub frame_number: u32,
    pub seconds_elapsed: f32,
    /// File name exactly as sent; not yet normalized to an absolute path.
    pub filename: String,
}

impl SyncPacket {
    pub fn new(action: SyncAction, filename: impl Into<String>, seconds_elapsed: f32) -> Self {
        SyncPacket {
            layout: SyncLayout::Legacy,
            action,
            sync_type: 0,
            frame_number: 0,
            seconds_elapsed,
            filename: filename.into(),
        }
    }

    /// Use the compact layout when encoding.
    pub fn compact(mut self) -> Self {
        self.layout = SyncLayout::Compact;
        self
    }

    pub fn with_frame(mut self, frame_number: u32) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Encode using `self.layout`.
    ///
    /// Legacy filenames are cut to 63 bytes so the field stays NUL
    /// terminated; compact filenames are cut to 64 bytes.
    pub fn encode(&self) -> BytesMut {
        let name = self.filename.as_bytes();
        let (name_len, total) = match self.layout {
            SyncLayout::Legacy => (name.len().min(FILENAME_FIELD_LEN - 1), LEGACY_PACKET_LEN),
            SyncLayout::Compact => {
                let n = name.len().min(FILENAME_FIELD_LEN);
                (n, SYNC_FIXED_LEN + n)
            }
        };

        let mut buf = BytesMut::with_capacity(total);
        wire::put_header(&mut buf, PacketType::Sync, total as u16);
        buf.put_u8(self.action.to_byte());
        buf.put_u8(self.sync_type);
        buf.put_u32_ne(self.frame_number);
        buf.put_f32_ne(self.seconds_elapsed);
        buf.put_slice(&name[..name_len]);
        if self.layout == SyncLayout::Legacy {
            buf.put_bytes(0, total - SYNC_FIXED_LEN - name_len);
        }
        buf
    }
}

/// Decode a sync datagram, checking the tag and packet type first.
pub fn decode_sync(data: &[u8]) -> Result<SyncPacket, DecodeError> {
    wire::expect_type(data, PacketType::Sync)?;
    decode_body(data)
}

/// Decode the body of a datagram whose header was already validated.
pub(crate) fn decode_body(data: &[u8]) -> Result<SyncPacket, DecodeError> {
    if data.len() <= SYNC_FIXED_LEN {
        return Err(DecodeError::SyncTooShort(data.len()));
    }

    let layout = if data.len() >= LEGACY_MIN_LEN {
        SyncLayout::Legacy
    } else {
        SyncLayout::Compact
    };

    let mut buf = &data[COMMON_HEADER_LEN..];
    let action = SyncAction::from_byte(buf.get_u8());
    let sync_type = buf.get_u8();
    let frame_number = buf.get_u32_ne();
    let seconds_elapsed = buf.get_f32_ne();

    let name_end = data.len().min(LEGACY_MIN_LEN);
    let filename = nul_terminated(&data[SYNC_FIXED_LEN..name_end]);

    Ok(SyncPacket {
        layout,
        action,
        sync_type,
        frame_number,
        seconds_elapsed,
        filename,
    })
}

/// Text up to the first NUL (or the whole field), lossily decoded.
pub(crate) fn nul_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
