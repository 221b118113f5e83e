//! Discovery beacons and ping replies.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use fseq_wire::BROADCAST_ADDR;

use crate::identity::DeviceIdentity;

/// A datagram to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub dest: SocketAddr,
    pub payload: BytesMut,
}

pub struct DiscoveryResponder {
    identity: Arc<DeviceIdentity>,
    interval: Duration,
    port: u16,
}

impl DiscoveryResponder {
    pub fn new(identity: Arc<DeviceIdentity>, interval: Duration, port: u16) -> Self {
        Self {
            identity,
            interval,
            port,
        }
    }

    /// True when no beacon was sent yet or the last one is more than one
    /// interval old.
    pub fn heartbeat_due(&self, last_announce: Option<Instant>, now: Instant) -> bool {
        match last_announce {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Broadcast beacon.
    pub fn heartbeat(&self, ip: Ipv4Addr) -> Outbound {
        Outbound {
            dest: SocketAddr::new(IpAddr::V4(BROADCAST_ADDR), self.port),
            payload: self.identity.ping_packet(ip).encode(),
        }
    }

    /// Unicast reply to a ping from `peer`, sent to the multi-sync port on
    /// the peer's address.
    pub fn reply(&self, ip: Ipv4Addr, peer: SocketAddr) -> Outbound {
        Outbound {
            dest: SocketAddr::new(peer.ip(), self.port),
            payload: self.identity.ping_packet(ip).encode(),
        }
    }
}
