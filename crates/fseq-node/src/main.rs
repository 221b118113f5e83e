//! fseq-node
//!
//! Follower daemon for FPP-style multi-sync shows.
//!
//! - Joins the multi-sync group and follows start / stop / resync / blank
//!   commands from a show controller
//! - Announces itself with a ping beacon and answers controller pings
//! - Serves device info, playback control and sequence uploads over HTTP
//!
//! `fseq-node send ...` turns the binary into a one-shot controller for
//! exercising followers on the local network.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use fseq_node::config::{NodeConfig, NodeConfigInput};
use fseq_node::link::{NetworkLink, RouteProbe, StaticLink};
use fseq_node::playback::SIM_FRAME_INTERVAL;
use fseq_node::state::NodeState;
use fseq_node::storage::DirStorage;
use fseq_node::udp::UdpSyncService;
use fseq_node::{api, identity};
use fseq_wire::{encode_blank, SyncAction, SyncPacket, MULTISYNC_GROUP, MULTISYNC_PORT};

/// Multi-sync follower daemon.
#[derive(Parser, Debug)]
#[command(name = "fseq-node", about = "FPP multi-sync follower")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding sequence files.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// HTTP listen address.
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Host name to advertise.
    #[arg(long)]
    hostname: Option<String>,

    /// Discovery beacon interval in milliseconds.
    #[arg(long)]
    heartbeat_interval_ms: Option<u64>,

    /// Multi-sync UDP port.
    #[arg(long)]
    multicast_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a single multi-sync packet, acting as a controller.
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Destination address.
    #[arg(long, default_value_t = SocketAddr::from((MULTISYNC_GROUP, MULTISYNC_PORT)))]
    to: SocketAddr,

    /// start, stop, resync, blank or ping.
    action: String,

    /// Sequence file name (sync actions).
    #[arg(default_value = "")]
    file: String,

    /// Seconds into the sequence.
    #[arg(long, default_value_t = 0.0)]
    elapsed: f32,

    /// Use the compact sync layout.
    #[arg(long, default_value_t = false)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Some(Command::Send(args)) = cli.command {
        return send(args).await;
    }

    let config = load_config(&cli)?;
    tracing::info!(
        hostname = %config.identity.hostname,
        http_addr = %config.http_addr,
        storage_dir = %config.storage_dir.display(),
        port = config.multisync.port,
        "fseq-node starting"
    );

    let storage = Arc::new(DirStorage::open(&config.storage_dir)?);
    let link: Arc<dyn NetworkLink> = match config.identity.ip {
        Some(ip) => Arc::new(StaticLink(Some(ip))),
        None => Arc::new(RouteProbe),
    };
    let http_addr = config.http_addr;
    let state = Arc::new(NodeState::simulated(config, link, storage));

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Task 1: Multi-sync UDP service ──────────────────────────
    let udp = UdpSyncService::new(&state);
    let udp_shutdown = shutdown_rx.clone();
    let udp_handle = tokio::spawn(async move { udp.run(udp_shutdown).await });

    // ── Task 2: Render loop ─────────────────────────────────────
    let render_state = state.clone();
    let mut render_shutdown = shutdown_rx.clone();
    let _render_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SIM_FRAME_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => render_state.controller.lock().await.render_tick(),
                _ = render_shutdown.changed() => return,
            }
        }
    });

    // ── Task 3: HTTP API ────────────────────────────────────────
    let app = api::router(state.clone());
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!("http api on http://{http_addr}");
    let mut http_shutdown = shutdown_rx.clone();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    // ── Shutdown handling ───────────────────────────────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            let _ = shutdown_tx.send(true);
        }
        result = udp_handle => {
            match result {
                Ok(Err(e)) => tracing::error!("udp service failed: {e}"),
                Err(e) => tracing::error!("udp task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
        result = http_handle => {
            match result {
                Ok(Err(e)) => tracing::error!("http server failed: {e}"),
                Err(e) => tracing::error!("http task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
    }

    state.controller.lock().await.stop_local();
    tracing::info!("fseq-node stopped");
    Ok(())
}

/// Config file (or defaults) with CLI flags applied on top.
fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfigInput::default().resolve()?,
    };
    if let Some(dir) = &cli.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(addr) = cli.http_addr {
        config.http_addr = addr;
    }
    if let Some(hostname) = &cli.hostname {
        config.identity.hostname = hostname.clone();
    }
    if let Some(ms) = cli.heartbeat_interval_ms {
        config.multisync.heartbeat_interval = std::time::Duration::from_millis(ms.max(100));
    }
    if let Some(port) = cli.multicast_port {
        config.multisync.port = port;
    }
    Ok(config)
}

async fn send(args: SendArgs) -> anyhow::Result<()> {
    let payload = match args.action.as_str() {
        "blank" => encode_blank(),
        "ping" => {
            let cfg = NodeConfigInput::default().resolve()?;
            let ip = RouteProbe.local_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED);
            let mut ping = identity::DeviceIdentity::from_config(&cfg.identity).ping_packet(ip);
            ping.subtype = 1;
            ping.encode()
        }
        other => {
            let action = match other {
                "start" => SyncAction::Start,
                "stop" => SyncAction::Stop,
                "resync" => SyncAction::Resync,
                "open" => SyncAction::Open,
                _ => anyhow::bail!("unknown action {other:?}"),
            };
            let pkt = SyncPacket::new(action, args.file.as_str(), args.elapsed);
            if args.compact {
                pkt.compact().encode()
            } else {
                pkt.encode()
            }
        }
    };

    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    socket.send_to(&payload, args.to).await?;
    tracing::info!(to = %args.to, action = %args.action, bytes = payload.len(), "sent");
    Ok(())
}
