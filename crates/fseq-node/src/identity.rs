//! Device identity as advertised in pings and the HTTP info documents.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;
use std::time::Instant;

use fseq_common::models::{MultiSyncSystem, MultiSyncSystems, SystemInfo, Utilization};
use fseq_wire::ping::MODE_REMOTE;
use fseq_wire::PingPacket;

use crate::config::IdentityConfig;

/// `typeId` reported by `/api/system/info`.
pub const INFO_TYPE_ID: u16 = 195;

/// `type` reported in the multi-sync system list and `advancedView`.
pub const MULTISYNC_TYPE_ID: u16 = 165;

pub const MODE_NAME: &str = "remote";

#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub hostname: String,
    pub version: String,
    pub hardware: String,
    pub hardware_type: u8,
    pub uuid: String,
    pub channel_count: u32,
    pub version_major: u16,
    pub version_minor: u16,
    started_at: Instant,
}

impl DeviceIdentity {
    pub fn from_config(cfg: &IdentityConfig) -> Self {
        let (version_major, version_minor) = parse_version(&cfg.version);
        Self {
            hostname: cfg.hostname.clone(),
            version: cfg.version.clone(),
            hardware: cfg.hardware.clone(),
            hardware_type: cfg.hardware_type,
            uuid: cfg
                .uuid
                .clone()
                .unwrap_or_else(|| derived_uuid(&cfg.hostname)),
            channel_count: cfg.channel_count,
            version_major,
            version_minor,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Ping carrying this identity at `ip`.
    pub fn ping_packet(&self, ip: Ipv4Addr) -> PingPacket {
        PingPacket {
            subtype: 0,
            hardware_type: self.hardware_type,
            version_major: self.version_major,
            version_minor: self.version_minor,
            mode_flags: MODE_REMOTE,
            ip,
            hostname: self.hostname.clone(),
            version: self.version.clone(),
            hardware: self.hardware.clone(),
            channel_ranges: String::new(),
        }
    }

    /// Document for `/api/system/info`.
    pub fn system_info(&self, ip: Ipv4Addr) -> SystemInfo {
        self.info_block(ip, INFO_TYPE_ID)
    }

    /// `advancedView` block of the status document.
    pub fn advanced_view(&self, ip: Ipv4Addr) -> SystemInfo {
        self.info_block(ip, MULTISYNC_TYPE_ID)
    }

    pub fn multi_sync_systems(&self, ip: Ipv4Addr) -> MultiSyncSystems {
        MultiSyncSystems {
            systems: vec![MultiSyncSystem {
                hostname: self.hostname.clone(),
                id: self.uuid.clone(),
                ip: ip.to_string(),
                version: self.version.clone(),
                hardware_type: self.hardware.clone(),
                type_id: MULTISYNC_TYPE_ID,
                num_chan: self.channel_count,
                num_pixel_port: 1,
                num_serial_port: 0,
                mode: MODE_NAME.into(),
            }],
        }
    }

    fn info_block(&self, ip: Ipv4Addr, type_id: u16) -> SystemInfo {
        SystemInfo {
            host_name: self.hostname.clone(),
            host_description: self.hardware.clone(),
            platform: std::env::consts::OS.into(),
            variant: self.hardware.clone(),
            mode: MODE_NAME.into(),
            version: self.version.clone(),
            major_version: self.version_major,
            minor_version: self.version_minor,
            type_id,
            uuid: self.uuid.clone(),
            utilization: Utilization {
                memory_free: available_memory(),
                uptime: self.uptime_ms(),
            },
            rssi: 0,
            ips: vec![ip.to_string()],
        }
    }
}

/// Split `"16.2-beta"` into `(16, 2)`.
///
/// Anything after the first `-` is ignored. A missing or non-numeric part
/// reads as zero, and only leading digits count (`"2.1"` gives 2).
pub fn parse_version(version: &str) -> (u16, u16) {
    let core = match version.find('-') {
        Some(i) if i > 0 => &version[..i],
        _ => version,
    };
    match core.split_once('.') {
        Some((major, minor)) if !major.is_empty() => (leading_number(major), leading_number(minor)),
        _ => (leading_number(core), 0),
    }
}

fn leading_number(s: &str) -> u16 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().unwrap_or(0)
}

/// Locally administered MAC-style id, stable for a host name.
fn derived_uuid(hostname: &str) -> String {
    let mut hasher = DefaultHasher::new();
    hostname.hash(&mut hasher);
    let h = hasher.finish().to_be_bytes();
    format!(
        "02:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        h[0], h[1], h[2], h[3], h[4]
    )
}

fn available_memory() -> u64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    sys.available_memory()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_config(&IdentityConfig {
            hostname: "porch".into(),
            version: "16.0-alpha".into(),
            hardware: "WLED".into(),
            hardware_type: 0xC3,
            uuid: None,
            channel_count: 450,
            ip: None,
        })
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("16.0-alpha"), (16, 0));
        assert_eq!(parse_version("16.2"), (16, 2));
        assert_eq!(parse_version("16"), (16, 0));
        assert_eq!(parse_version("16.2.1"), (16, 2));
        assert_eq!(parse_version("dev"), (0, 0));
        assert_eq!(parse_version("-rc1"), (0, 0));
        assert_eq!(parse_version(""), (0, 0));
    }

    #[test]
    fn ping_carries_identity() {
        let ip = Ipv4Addr::new(10, 0, 0, 9);
        let ping = identity().ping_packet(ip);
        assert_eq!(ping.hostname, "porch");
        assert_eq!(ping.version, "16.0-alpha");
        assert_eq!(ping.hardware, "WLED");
        assert_eq!(ping.hardware_type, 0xC3);
        assert_eq!((ping.version_major, ping.version_minor), (16, 0));
        assert_eq!(ping.mode_flags, MODE_REMOTE);
        assert_eq!(ping.ip, ip);
        assert_eq!(ping.encode().len(), fseq_wire::ping::PING_PACKET_LEN);
    }

    #[test]
    fn derived_uuid_is_stable_and_mac_shaped() {
        let a = identity();
        let b = identity();
        assert_eq!(a.uuid, b.uuid);
        assert_eq!(a.uuid.len(), 17);
        assert!(a.uuid.starts_with("02:"));
    }

    #[test]
    fn info_documents() {
        let id = identity();
        let ip = Ipv4Addr::new(10, 0, 0, 9);
        let info = id.system_info(ip);
        assert_eq!(info.type_id, 195);
        assert_eq!(info.ips, vec!["10.0.0.9".to_string()]);
        assert_eq!(id.advanced_view(ip).type_id, 165);

        let systems = id.multi_sync_systems(ip);
        assert_eq!(systems.systems.len(), 1);
        assert_eq!(systems.systems[0].num_chan, 450);
        assert_eq!(systems.systems[0].mode, "remote");
    }
}
