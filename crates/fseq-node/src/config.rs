//! Node configuration.
//!
//! A TOML file is parsed into [`NodeConfigInput`] where every field is
//! optional, then resolved into a validated [`NodeConfig`]. CLI flags are
//! applied on top of the resolved value by `main`.
//!
//! ```toml
//! version = 1
//!
//! [http]
//! addr = "0.0.0.0:8080"
//!
//! [storage]
//! dir = "/var/lib/fseq-node"
//!
//! [multisync]
//! port = 32320
//! heartbeat_interval_ms = 5000
//!
//! [upload]
//! buffer_size = 8192
//! idle_timeout_ms = 30000
//!
//! [identity]
//! hostname = "porch-lights"
//! version = "16.0"
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use fseq_wire::ping::DEFAULT_HARDWARE_TYPE;
use fseq_wire::MULTISYNC_PORT;

pub const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_STORAGE_DIR: &str = "./sequences";
pub const DEFAULT_HEARTBEAT_MS: u64 = 5000;
pub const DEFAULT_UPLOAD_BUFFER: usize = 8192;
pub const DEFAULT_UPLOAD_IDLE_MS: u64 = 30_000;
pub const DEFAULT_UPLOAD_NAME: &str = "/default.fseq";
pub const DEFAULT_VERSION: &str = "16.0";
pub const DEFAULT_HARDWARE: &str = "WLED";
pub const DEFAULT_CHANNEL_COUNT: u32 = 510;

const MIN_HEARTBEAT_MS: u64 = 100;
const MIN_UPLOAD_BUFFER: usize = 64;
const MIN_UPLOAD_IDLE_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid http address {0:?}")]
    HttpAddr(String),
}

// ── Input (as written in the file) ──────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfigInput {
    pub version: u32,
    pub http: HttpConfigInput,
    pub storage: StorageConfigInput,
    pub multisync: MultiSyncConfigInput,
    pub upload: UploadConfigInput,
    pub identity: IdentityConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpConfigInput {
    pub addr: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfigInput {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MultiSyncConfigInput {
    pub port: Option<u16>,
    pub heartbeat_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UploadConfigInput {
    pub buffer_size: Option<usize>,
    pub idle_timeout_ms: Option<u64>,
    pub default_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentityConfigInput {
    pub hostname: Option<String>,
    pub version: Option<String>,
    pub hardware: Option<String>,
    pub hardware_type: Option<u8>,
    pub uuid: Option<String>,
    pub channel_count: Option<u32>,
    /// Address to advertise instead of probing the routing table.
    pub ip: Option<Ipv4Addr>,
}

// ── Resolved ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MultiSyncConfig {
    pub port: u16,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub buffer_size: usize,
    pub idle_timeout: Duration,
    /// Absolute device path used when an upload names no file.
    pub default_name: String,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub hostname: String,
    pub version: String,
    pub hardware: String,
    pub hardware_type: u8,
    /// Stable unique id; derived from the host name when unset.
    pub uuid: Option<String>,
    pub channel_count: u32,
    pub ip: Option<Ipv4Addr>,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub version: u32,
    pub http_addr: SocketAddr,
    pub storage_dir: PathBuf,
    pub multisync: MultiSyncConfig,
    pub upload: UploadConfig,
    pub identity: IdentityConfig,
}

impl NodeConfigInput {
    pub fn resolve(self) -> Result<NodeConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let addr = non_empty(self.http.addr).unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::HttpAddr(addr.clone()))?;

        let multisync = MultiSyncConfig {
            port: self.multisync.port.unwrap_or(MULTISYNC_PORT),
            heartbeat_interval: Duration::from_millis(
                self.multisync
                    .heartbeat_interval_ms
                    .unwrap_or(DEFAULT_HEARTBEAT_MS)
                    .max(MIN_HEARTBEAT_MS),
            ),
        };

        let upload = UploadConfig {
            buffer_size: self
                .upload
                .buffer_size
                .unwrap_or(DEFAULT_UPLOAD_BUFFER)
                .max(MIN_UPLOAD_BUFFER),
            idle_timeout: Duration::from_millis(
                self.upload
                    .idle_timeout_ms
                    .unwrap_or(DEFAULT_UPLOAD_IDLE_MS)
                    .max(MIN_UPLOAD_IDLE_MS),
            ),
            default_name: non_empty(self.upload.default_name)
                .map(|n| crate::sync::normalize_path(&n))
                .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string()),
        };

        let id = self.identity;
        let identity = IdentityConfig {
            hostname: non_empty(id.hostname).unwrap_or_else(system_hostname),
            version: non_empty(id.version).unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            hardware: non_empty(id.hardware).unwrap_or_else(|| DEFAULT_HARDWARE.to_string()),
            hardware_type: id.hardware_type.unwrap_or(DEFAULT_HARDWARE_TYPE),
            uuid: non_empty(id.uuid),
            channel_count: id.channel_count.unwrap_or(DEFAULT_CHANNEL_COUNT),
            ip: id.ip,
        };

        Ok(NodeConfig {
            version,
            http_addr,
            storage_dir: self
                .storage
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            multisync,
            upload,
            identity,
        })
    }
}

impl NodeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return NodeConfigInput::default().resolve();
        }
        let parsed: NodeConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn system_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "fseq-node".into())
}
