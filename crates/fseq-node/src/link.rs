//! Network link state.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use fseq_wire::{MULTISYNC_GROUP, MULTISYNC_PORT};

/// Reports whether the host is on a network and which address it uses.
pub trait NetworkLink: Send + Sync {
    fn local_ipv4(&self) -> Option<Ipv4Addr>;

    fn is_connected(&self) -> bool {
        self.local_ipv4().is_some()
    }
}

/// Asks the routing table which source address multi-sync traffic would
/// leave from. Connecting a UDP socket sends nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteProbe;

impl NetworkLink for RouteProbe {
    fn local_ipv4(&self) -> Option<Ipv4Addr> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket
            .connect(SocketAddrV4::new(MULTISYNC_GROUP, MULTISYNC_PORT))
            .ok()?;
        match socket.local_addr().ok()?.ip() {
            std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
            _ => None,
        }
    }
}

/// Fixed address from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticLink(pub Option<Ipv4Addr>);

impl NetworkLink for StaticLink {
    fn local_ipv4(&self) -> Option<Ipv4Addr> {
        self.0
    }
}
