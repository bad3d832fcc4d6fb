//! Domain types shared by the store, the reconciler and the wire decoder.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Revision cursor handed out by the daemon (`rid`).
///
/// Monotonic but not contiguous; the daemon decides the granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rid(pub u64);

impl Rid {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Downloading from peers.
    Downloading,
    /// Seeding to peers.
    Seeding,
    /// Download or upload is paused.
    Paused,
    /// Checking file integrity.
    Checking,
    /// Queued for download.
    Queued,
    /// Stalled (no peers).
    Stalled,
    /// Error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl TorrentState {
    /// Map a qBittorrent state string.
    pub fn from_qbittorrent(state: &str) -> Self {
        match state {
            "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" => {
                TorrentState::Downloading
            }
            "uploading" | "forcedUP" => TorrentState::Seeding,
            "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
            "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => {
                TorrentState::Checking
            }
            "queuedDL" | "queuedUP" => TorrentState::Queued,
            "stalledDL" | "stalledUP" => TorrentState::Stalled,
            "error" | "missingFiles" => TorrentState::Error,
            _ => TorrentState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Checking => "checking",
            TorrentState::Queued => "queued",
            TorrentState::Stalled => "stalled",
            TorrentState::Error => "error",
            TorrentState::Unknown => "unknown",
        }
    }
}

/// One tracked torrent.
///
/// `hash` is the primary key and never changes; every other field is
/// replaced in place by later snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    pub hash: String,
    pub name: String,
    pub state: TorrentState,
    /// Raw daemon state string (e.g. "stalledUP").
    pub raw_state: String,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    pub size_bytes: u64,
    pub total_size_bytes: u64,
    pub downloaded_bytes: u64,
    pub uploaded_bytes: u64,
    /// Bytes/second.
    pub download_speed: u64,
    /// Bytes/second.
    pub upload_speed: u64,
    /// Seconds, as reported (8640000 means "infinite" to qBittorrent).
    pub eta_secs: i64,
    pub ratio: f64,
    pub seeders: u32,
    pub leechers: u32,
    /// Empty when uncategorized.
    pub category: String,
    /// Comma-separated tag list, verbatim from the daemon.
    pub tags: String,
    pub save_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl TorrentRecord {
    /// An empty record for a hash seen for the first time.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            name: String::new(),
            state: TorrentState::Unknown,
            raw_state: String::new(),
            progress: 0.0,
            size_bytes: 0,
            total_size_bytes: 0,
            downloaded_bytes: 0,
            uploaded_bytes: 0,
            download_speed: 0,
            upload_speed: 0,
            eta_secs: 0,
            ratio: 0.0,
            seeders: 0,
            leechers: 0,
            category: String::new(),
            tags: String::new(),
            save_path: String::new(),
            added_at: None,
            completed_at: None,
            last_activity_at: None,
        }
    }

    /// Build a record from a patch, as for a first sighting.
    pub fn from_patch(hash: impl Into<String>, patch: &TorrentPatch) -> Self {
        let mut record = Self::new(hash);
        record.apply(patch);
        record
    }

    /// Overwrite every field the patch carries. Fields are replaced, never
    /// accumulated, so applying the same patch twice is harmless.
    pub fn apply(&mut self, patch: &TorrentPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(state) = &patch.state {
            self.state = TorrentState::from_qbittorrent(state);
            self.raw_state.clone_from(state);
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(size) = patch.size {
            self.size_bytes = non_negative(size);
        }
        if let Some(total_size) = patch.total_size {
            self.total_size_bytes = non_negative(total_size);
        }
        if let Some(downloaded) = patch.downloaded {
            self.downloaded_bytes = non_negative(downloaded);
        }
        if let Some(uploaded) = patch.uploaded {
            self.uploaded_bytes = non_negative(uploaded);
        }
        if let Some(dlspeed) = patch.dlspeed {
            self.download_speed = non_negative(dlspeed);
        }
        if let Some(upspeed) = patch.upspeed {
            self.upload_speed = non_negative(upspeed);
        }
        if let Some(eta) = patch.eta {
            self.eta_secs = eta;
        }
        if let Some(ratio) = patch.ratio {
            self.ratio = ratio;
        }
        if let Some(seeds) = patch.num_seeds {
            self.seeders = u32::try_from(seeds.max(0)).unwrap_or(u32::MAX);
        }
        if let Some(leechs) = patch.num_leechs {
            self.leechers = u32::try_from(leechs.max(0)).unwrap_or(u32::MAX);
        }
        if let Some(category) = &patch.category {
            self.category.clone_from(category);
        }
        if let Some(tags) = &patch.tags {
            self.tags.clone_from(tags);
        }
        if let Some(save_path) = &patch.save_path {
            self.save_path.clone_from(save_path);
        }
        if let Some(ts) = patch.added_on {
            self.added_at = timestamp_to_datetime(ts);
        }
        if let Some(ts) = patch.completion_on {
            self.completed_at = timestamp_to_datetime(ts);
        }
        if let Some(ts) = patch.last_activity {
            self.last_activity_at = timestamp_to_datetime(ts);
        }
    }

    /// Whether the comma-separated tag list contains `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.split(',').map(str::trim).any(|t| t == tag)
    }

    /// Progress has reached 100%.
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Fields of one torrent as sent by `sync/maindata`.
///
/// Partial snapshots only carry the fields that changed, so every field is
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlspeed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upspeed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_seeds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_leechs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_on: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_on: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<i64>,
}

impl TorrentPatch {
    pub fn is_empty(&self) -> bool {
        self == &TorrentPatch::default()
    }

    /// Fold a later patch into this one; fields set in `later` win.
    pub fn merge(&mut self, later: &TorrentPatch) {
        fn take<T: Clone>(slot: &mut Option<T>, later: &Option<T>) {
            if later.is_some() {
                slot.clone_from(later);
            }
        }
        take(&mut self.name, &later.name);
        take(&mut self.state, &later.state);
        take(&mut self.progress, &later.progress);
        take(&mut self.size, &later.size);
        take(&mut self.total_size, &later.total_size);
        take(&mut self.downloaded, &later.downloaded);
        take(&mut self.uploaded, &later.uploaded);
        take(&mut self.dlspeed, &later.dlspeed);
        take(&mut self.upspeed, &later.upspeed);
        take(&mut self.eta, &later.eta);
        take(&mut self.ratio, &later.ratio);
        take(&mut self.num_seeds, &later.num_seeds);
        take(&mut self.num_leechs, &later.num_leechs);
        take(&mut self.category, &later.category);
        take(&mut self.tags, &later.tags);
        take(&mut self.save_path, &later.save_path);
        take(&mut self.added_on, &later.added_on);
        take(&mut self.completion_on, &later.completion_on);
        take(&mut self.last_activity, &later.last_activity);
    }
}

/// A download category as known to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(rename = "savePath", default)]
    pub save_path: String,
}

/// Global transfer state from `server_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub downloaded_session: u64,
    pub uploaded_session: u64,
    pub alltime_downloaded: u64,
    pub alltime_uploaded: u64,
    pub free_space_on_disk: u64,
    pub connection_status: String,
    pub dht_nodes: u64,
}

impl ServerState {
    /// Replace the fields the patch carries. Session totals are absolute
    /// values on the wire, so replacing them keeps re-application idempotent.
    pub fn apply(&mut self, patch: &ServerStatePatch) {
        if let Some(v) = patch.dl_info_speed {
            self.download_speed = v;
        }
        if let Some(v) = patch.up_info_speed {
            self.upload_speed = v;
        }
        if let Some(v) = patch.dl_info_data {
            self.downloaded_session = v;
        }
        if let Some(v) = patch.up_info_data {
            self.uploaded_session = v;
        }
        if let Some(v) = patch.alltime_dl {
            self.alltime_downloaded = v;
        }
        if let Some(v) = patch.alltime_ul {
            self.alltime_uploaded = v;
        }
        if let Some(v) = patch.free_space_on_disk {
            self.free_space_on_disk = v;
        }
        if let Some(v) = &patch.connection_status {
            self.connection_status.clone_from(v);
        }
        if let Some(v) = patch.dht_nodes {
            self.dht_nodes = v;
        }
    }
}

/// Partial `server_state` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerStatePatch {
    pub dl_info_speed: Option<u64>,
    pub up_info_speed: Option<u64>,
    pub dl_info_data: Option<u64>,
    pub up_info_data: Option<u64>,
    pub alltime_dl: Option<u64>,
    pub alltime_ul: Option<u64>,
    pub free_space_on_disk: Option<u64>,
    pub connection_status: Option<String>,
    pub dht_nodes: Option<u64>,
}

fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}
