//! # fseq-wire
//!
//! FPP multi-sync wire format.
//!
//! Every datagram starts with the `"FPPD"` tag followed by a packet-type byte
//! and a two-byte length. Followers only ever need three packet kinds: sync
//! (playback commands from a controller), blank (clear output) and ping
//! (discovery). This crate decodes those from untrusted input without
//! panicking and encodes the fixed 301-byte ping announcement.
//!
//! ## Crate structure
//!
//! - [`wire`] — Common header, packet-type dispatch, errors, well-known addresses
//! - [`sync`] — Sync packets in both legacy and compact layouts
//! - [`ping`] — Ping v3 packets (discovery beacon and reply)

pub mod ping;
pub mod sync;
pub mod wire;

pub use ping::{PingPacket, PingRequest};
pub use sync::{SyncAction, SyncLayout, SyncPacket};
pub use wire::{
    decode, encode_blank, Datagram, DecodeError, PacketType, BROADCAST_ADDR, MULTISYNC_GROUP,
    MULTISYNC_PORT,
};
