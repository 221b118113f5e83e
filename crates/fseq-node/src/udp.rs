//! UDP multi-sync service.
//!
//! Lazily opens the multi-sync socket once the link is up, sends the
//! discovery beacon on schedule and dispatches inbound datagrams. Sync and
//! blank packets go to the session controller; pings are answered straight
//! back to the sender.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};

use fseq_wire::{decode, Datagram, DecodeError, MULTISYNC_GROUP};

use crate::discovery::{DiscoveryResponder, Outbound};
use crate::link::NetworkLink;
use crate::state::NodeState;
use crate::sync::SyncSessionController;

/// How often `run` ticks the service.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Minimum gap between replies to the same peer. Two followers answering
/// each other's replies would otherwise ping-pong forever.
pub const REPLY_COOLDOWN: Duration = Duration::from_secs(1);

const RECV_BUF_LEN: usize = 1500;

pub struct UdpSyncService {
    link: Arc<dyn NetworkLink>,
    discovery: DiscoveryResponder,
    controller: Arc<Mutex<SyncSessionController>>,
    port: u16,
    socket: Option<UdpSocket>,
    last_announce: Option<Instant>,
    last_reply: HashMap<IpAddr, Instant>,
}

impl UdpSyncService {
    pub fn new(state: &NodeState) -> Self {
        let cfg = &state.config.multisync;
        Self {
            link: state.link.clone(),
            discovery: DiscoveryResponder::new(
                state.identity.clone(),
                cfg.heartbeat_interval,
                cfg.port,
            ),
            controller: state.controller.clone(),
            port: cfg.port,
            socket: None,
            last_announce: None,
            last_reply: HashMap::new(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.socket.is_some()
    }

    /// Periodic work: start listening once the link is up, then send the
    /// beacon when due.
    pub async fn tick(&mut self) {
        if self.socket.is_none() {
            if !self.link.is_connected() {
                return;
            }
            match open_socket(self.port).await {
                Ok(socket) => {
                    tracing::info!(
                        port = self.port,
                        group = %MULTISYNC_GROUP,
                        "multi-sync listener started"
                    );
                    self.socket = Some(socket);
                }
                Err(e) => {
                    tracing::warn!(port = self.port, error = %e, "multi-sync listener failed, retrying");
                    return;
                }
            }
        }

        if let Some(out) = self.due_heartbeat(Instant::now()) {
            self.send(out).await;
        }
    }

    /// The beacon to send at `now`, if listening and due.
    pub fn due_heartbeat(&mut self, now: Instant) -> Option<Outbound> {
        if self.socket.is_none() || !self.discovery.heartbeat_due(self.last_announce, now) {
            return None;
        }
        let ip = self.link.local_ipv4()?;
        self.last_announce = Some(now);
        tracing::trace!(%ip, "heartbeat");
        Some(self.discovery.heartbeat(ip))
    }

    /// Process one inbound datagram and return the reply to send, if any.
    pub async fn on_datagram(&mut self, data: &[u8], peer: SocketAddr) -> Option<Outbound> {
        match decode(data) {
            Ok(Datagram::Sync(pkt)) => {
                tracing::debug!(
                    %peer,
                    action = %pkt.action,
                    file = %pkt.filename,
                    elapsed = pkt.seconds_elapsed,
                    frame = pkt.frame_number,
                    "sync packet"
                );
                self.controller
                    .lock()
                    .await
                    .handle_action(pkt.action, &pkt.filename, pkt.seconds_elapsed);
                None
            }
            Ok(Datagram::Blank) => {
                tracing::debug!(%peer, "blank packet");
                self.controller.lock().await.blank();
                None
            }
            Ok(Datagram::Ping(req)) => self.ping_reply(peer, req.subtype, Instant::now()),
            Err(DecodeError::NotMultiSync) => {
                tracing::trace!(%peer, len = data.len(), "ignoring foreign datagram");
                None
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "dropping datagram");
                None
            }
        }
    }

    fn ping_reply(&mut self, peer: SocketAddr, subtype: u8, now: Instant) -> Option<Outbound> {
        let ip = self.link.local_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
        if peer.ip() == IpAddr::V4(ip) {
            // Our own beacon looped back.
            return None;
        }
        if let Some(last) = self.last_reply.get(&peer.ip()) {
            if now.saturating_duration_since(*last) < REPLY_COOLDOWN {
                tracing::trace!(%peer, "ping reply suppressed");
                return None;
            }
        }
        self.last_reply
            .retain(|_, t| now.saturating_duration_since(*t) < REPLY_COOLDOWN);
        self.last_reply.insert(peer.ip(), now);
        tracing::debug!(%peer, subtype, "answering ping");
        Some(self.discovery.reply(ip, peer))
    }

    async fn send(&self, out: Outbound) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        if let Err(e) = socket.send_to(&out.payload, out.dest).await {
            tracing::warn!(dest = %out.dest, error = %e, "multi-sync send failed");
        }
    }

    /// Drive the service until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        let mut buf = vec![0u8; RECV_BUF_LEN];

        loop {
            let event = tokio::select! {
                _ = interval.tick() => Event::Tick,
                res = recv_from(self.socket.as_ref(), &mut buf) => Event::Received(res),
                _ = shutdown.changed() => Event::Shutdown,
            };

            match event {
                Event::Tick => self.tick().await,
                Event::Received(Ok((n, peer))) => {
                    if let Some(out) = self.on_datagram(&buf[..n], peer).await {
                        self.send(out).await;
                    }
                }
                Event::Received(Err(e)) => {
                    tracing::warn!(error = %e, "multi-sync receive failed");
                }
                Event::Shutdown => {
                    if *shutdown.borrow() || shutdown.has_changed().is_err() {
                        tracing::info!("multi-sync service stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}

enum Event {
    Tick,
    Received(std::io::Result<(usize, SocketAddr)>),
    Shutdown,
}

async fn recv_from(
    socket: Option<&UdpSocket>,
    buf: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(s) => s.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

async fn open_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).await?;
    socket.set_broadcast(true)?;
    socket.join_multicast_v4(MULTISYNC_GROUP, Ipv4Addr::UNSPECIFIED)?;
    Ok(socket)
}
