//! Shared node state.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::NodeConfig;
use crate::identity::DeviceIdentity;
use crate::link::NetworkLink;
use crate::playback::{EffectBridge, LoggingBridge, PlaybackEngine, SimulatedEngine};
use crate::storage::Storage;
use crate::sync::SyncSessionController;
use crate::upload::UploadEndpoint;

/// State shared by the UDP task, the render task and the HTTP handlers.
///
/// Each mutex is held for one mutate-then-read step and never across
/// network I/O.
pub struct NodeState {
    pub config: NodeConfig,
    pub identity: Arc<DeviceIdentity>,
    pub link: Arc<dyn NetworkLink>,
    pub storage: Arc<dyn Storage>,
    pub controller: Arc<Mutex<SyncSessionController>>,
    pub uploads: Mutex<UploadEndpoint>,
}

impl NodeState {
    pub fn new(
        config: NodeConfig,
        link: Arc<dyn NetworkLink>,
        storage: Arc<dyn Storage>,
        engine: Box<dyn PlaybackEngine>,
        bridge: Box<dyn EffectBridge>,
    ) -> Self {
        let identity = Arc::new(DeviceIdentity::from_config(&config.identity));
        let uploads = UploadEndpoint::new(storage.clone(), config.upload.clone());
        Self {
            identity,
            link,
            controller: Arc::new(Mutex::new(SyncSessionController::new(engine, bridge))),
            uploads: Mutex::new(uploads),
            storage,
            config,
        }
    }

    /// State backed by the wall-clock engine and the logging bridge.
    pub fn simulated(
        config: NodeConfig,
        link: Arc<dyn NetworkLink>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let engine = Box::new(SimulatedEngine::new(storage.clone()));
        Self::new(config, link, storage, engine, Box::new(LoggingBridge::default()))
    }

    /// Address to advertise; unspecified while the link is down.
    pub fn local_ip(&self) -> Ipv4Addr {
        self.link.local_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}
