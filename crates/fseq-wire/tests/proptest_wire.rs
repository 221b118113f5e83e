//! Property-based tests for the multi-sync wire format.
//!
//! These cover the ping layout across the full field range and the length
//! rules for sync datagrams received from arbitrary controllers.

use std::net::Ipv4Addr;

use fseq_wire::ping::{PingPacket, PING_PACKET_LEN};
use fseq_wire::sync::{decode_sync, SyncLayout, LEGACY_MIN_LEN, SYNC_FIXED_LEN};
use fseq_wire::{decode, Datagram, DecodeError};
use proptest::prelude::*;

// ─── Strategies ──────────────────────────────────────────────────────────────

/// Printable ASCII without NUL, up to `max` characters.
fn slot_text(max: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(0x20u8..0x7f, 0..=max)
        .prop_map(|v| String::from_utf8(v).expect("ascii"))
}

fn ping_packet() -> impl Strategy<Value = PingPacket> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u16>(),
        any::<u16>(),
        any::<u8>(),
        any::<[u8; 4]>(),
        slot_text(64),
        slot_text(40),
        slot_text(40),
    )
        .prop_map(
            |(subtype, hw, major, minor, mode, ip, hostname, version, hardware)| PingPacket {
                subtype,
                hardware_type: hw,
                version_major: major,
                version_minor: minor,
                mode_flags: mode,
                ip: Ipv4Addr::from(ip),
                hostname,
                version,
                hardware,
                channel_ranges: String::new(),
            },
        )
}

/// Sync header + fixed fields, with non-NUL filename bytes up to `len`.
fn sync_datagram(len: usize, action: u8) -> Vec<u8> {
    let mut v = Vec::with_capacity(len);
    v.extend_from_slice(b"FPPD\x01\x00\x00");
    v.push(action);
    v.push(0);
    v.extend_from_slice(&[0u8; 8]);
    while v.len() < len {
        v.push(b'a' + (v.len() % 26) as u8);
    }
    v.truncate(len);
    v
}

// ─── Ping ────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn ping_roundtrip(pkt in ping_packet()) {
        let encoded = pkt.encode();
        prop_assert_eq!(encoded.len(), PING_PACKET_LEN);
        let decoded = PingPacket::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, pkt);
    }

    #[test]
    fn ping_strings_truncate_to_slot(hostname in slot_text(200), version in slot_text(100)) {
        let pkt = PingPacket { hostname: hostname.clone(), version: version.clone(), ..PingPacket::default() };
        let decoded = PingPacket::decode(&pkt.encode()).unwrap();
        prop_assert_eq!(decoded.hostname.as_str(), &hostname[..hostname.len().min(64)]);
        prop_assert_eq!(decoded.version.as_str(), &version[..version.len().min(40)]);
    }
}

// ─── Sync ────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sync_at_or_below_fixed_len_is_rejected(len in 5usize..=SYNC_FIXED_LEN) {
        let v = sync_datagram(len, 0);
        prop_assert_eq!(decode_sync(&v), Err(DecodeError::SyncTooShort(len)));
    }

    #[test]
    fn sync_filename_takes_remaining_bytes(len in (SYNC_FIXED_LEN + 1)..=LEGACY_MIN_LEN) {
        let v = sync_datagram(len, 2);
        let pkt = decode_sync(&v).unwrap();
        prop_assert_eq!(pkt.filename.len(), len - SYNC_FIXED_LEN);
        let expected = if len == LEGACY_MIN_LEN { SyncLayout::Legacy } else { SyncLayout::Compact };
        prop_assert_eq!(pkt.layout, expected);
    }

    #[test]
    fn sync_filename_never_exceeds_field(len in LEGACY_MIN_LEN..600usize) {
        let v = sync_datagram(len, 0);
        let pkt = decode_sync(&v).unwrap();
        prop_assert_eq!(pkt.filename.len(), 64);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..400)) {
        let _ = decode(&data);
    }

    #[test]
    fn tagged_garbage_never_panics(tail in proptest::collection::vec(any::<u8>(), 0..400)) {
        let mut data = b"FPPD".to_vec();
        data.extend_from_slice(&tail);
        match decode(&data) {
            Ok(Datagram::Sync(pkt)) => prop_assert!(pkt.filename.chars().count() <= 64),
            Ok(_) | Err(_) => {}
        }
    }
}
