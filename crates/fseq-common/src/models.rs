//! JSON models served over HTTP.
//!
//! Controllers and show-management tools poll these endpoints and match on
//! exact field names, including the odd casing. Keep the serde renames in
//! step with what deployed controllers expect.

use serde::{Deserialize, Serialize};

// ── System Info ─────────────────────────────────────────────────────

/// Runtime resource counters reported under `Utilization`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    #[serde(rename = "MemoryFree")]
    pub memory_free: u64,
    /// Milliseconds since the daemon started.
    #[serde(rename = "Uptime")]
    pub uptime: u64,
}

/// Identity block served at `/api/system/info` and nested as
/// `advancedView` in the status document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "HostName")]
    pub host_name: String,
    #[serde(rename = "HostDescription")]
    pub host_description: String,
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "Variant")]
    pub variant: String,
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "majorVersion")]
    pub major_version: u16,
    #[serde(rename = "minorVersion")]
    pub minor_version: u16,
    #[serde(rename = "typeId")]
    pub type_id: u16,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Utilization")]
    pub utilization: Utilization,
    pub rssi: i32,
    #[serde(rename = "IPS")]
    pub ips: Vec<String>,
}

// ── System Status ───────────────────────────────────────────────────

/// Numeric playback state: 0 idle, 1 playing.
pub const STATUS_IDLE: u8 = 0;
pub const STATUS_PLAYING: u8 = 1;

/// Operating mode code for a remote-controlled follower.
pub const MODE_REMOTE: u8 = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MqttStatus {
    pub configured: bool,
    pub connected: bool,
}

/// Playlists are not supported; every field is reported empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistStatus {
    pub count: String,
    pub description: String,
    pub index: String,
    pub playlist: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for PlaylistStatus {
    fn default() -> Self {
        PlaylistStatus {
            count: "0".into(),
            description: String::new(),
            index: "0".into(),
            playlist: String::new(),
            kind: String::new(),
        }
    }
}

/// Document served at `/api/system/status`.
///
/// Second counters are strings on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(rename = "MQTT")]
    pub mqtt: MqttStatus,
    pub current_playlist: PlaylistStatus,
    pub volume: u8,
    pub media_filename: String,
    pub fppd: String,
    pub current_song: String,
    pub current_sequence: String,
    pub playlist: String,
    pub seconds_elapsed: String,
    pub seconds_played: String,
    pub seconds_remaining: String,
    pub sequence_filename: String,
    pub time_elapsed: String,
    pub time_remaining: String,
    pub status: u8,
    pub status_name: String,
    pub mode: u8,
    pub mode_name: String,
    #[serde(rename = "advancedView")]
    pub advanced_view: SystemInfo,
}

impl SystemStatus {
    /// Status for an idle follower.
    pub fn idle(advanced_view: SystemInfo) -> Self {
        Self::build(None, 0, advanced_view)
    }

    /// Status while `file` is playing, `elapsed_secs` into the sequence.
    pub fn playing(file: &str, elapsed_secs: u32, advanced_view: SystemInfo) -> Self {
        Self::build(Some(file), elapsed_secs, advanced_view)
    }

    fn build(file: Option<&str>, elapsed: u32, advanced_view: SystemInfo) -> Self {
        let (status, status_name) = match file {
            Some(_) => (STATUS_PLAYING, "playing"),
            None => (STATUS_IDLE, "idle"),
        };
        let name = file.unwrap_or_default().to_string();
        SystemStatus {
            mqtt: MqttStatus::default(),
            current_playlist: PlaylistStatus::default(),
            volume: 70,
            media_filename: String::new(),
            fppd: "running".into(),
            current_song: String::new(),
            current_sequence: name.clone(),
            playlist: String::new(),
            seconds_elapsed: elapsed.to_string(),
            seconds_played: elapsed.to_string(),
            seconds_remaining: "0".into(),
            sequence_filename: name,
            time_elapsed: format_mm_ss(elapsed),
            time_remaining: "00:00".into(),
            status,
            status_name: status_name.into(),
            mode: MODE_REMOTE,
            mode_name: "remote".into(),
            advanced_view,
        }
    }
}

/// `MM:SS` with at least two digits per part. Minutes are not wrapped at
/// an hour.
pub fn format_mm_ss(total_secs: u32) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

// ── Multi-sync Systems ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSyncSystem {
    pub hostname: String,
    /// MAC-style unique id.
    pub id: String,
    pub ip: String,
    pub version: String,
    #[serde(rename = "hardwareType")]
    pub hardware_type: String,
    #[serde(rename = "type")]
    pub type_id: u16,
    pub num_chan: u32,
    #[serde(rename = "NumPixelPort")]
    pub num_pixel_port: u32,
    #[serde(rename = "NumSerialPort")]
    pub num_serial_port: u32,
    pub mode: String,
}

/// Document served at `/api/fppd/multiSyncSystems`. A follower only ever
/// lists itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSyncSystems {
    pub systems: Vec<MultiSyncSystem>,
}

// ── File Listings ───────────────────────────────────────────────────

/// Entry of `/fseqfilelist`; `size` is in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFile {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFileList {
    pub files: Vec<SequenceFile>,
}

/// Entry of `/api/fseq/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceName {
    pub name: String,
}

/// Entry of `/api/sd/list`; `size` is in kilobytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageFile {
    pub name: String,
    pub size: f64,
}

/// Document served at `/api/sd/list`. Sizes are fractional kilobytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageListing {
    pub files: Vec<StorageFile>,
    #[serde(rename = "usedKB")]
    pub used_kb: f64,
    #[serde(rename = "totalKB")]
    pub total_kb: f64,
}

/// Document served at `/api/fseq/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playing: bool,
    pub file: String,
}
