use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub qbittorrent: QBittorrentConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the browser UI bundle (served as SPA fallback).
    #[serde(default)]
    pub ui_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ui_dir: None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// qBittorrent WebUI connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// WebUI base URL (e.g., "http://localhost:8081")
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    10
}

/// Synchronization engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Delay between two polls of the maindata endpoint.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls before connectivity is reported degraded.
    #[serde(default = "default_degraded_after_failures")]
    pub degraded_after_failures: u32,
    /// Capacity of the change-notification channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// What a confirmed delete does with files when the user made no choice.
    #[serde(default)]
    pub delete_files_by_default: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            degraded_after_failures: default_degraded_after_failures(),
            event_buffer: default_event_buffer(),
            delete_files_by_default: false,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_degraded_after_failures() -> u32 {
    3
}

fn default_event_buffer() -> usize {
    256
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub qbittorrent: SanitizedQBittorrentConfig,
    pub sync: SyncConfig,
}

/// qBittorrent settings with the password hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            qbittorrent: SanitizedQBittorrentConfig {
                url: config.qbittorrent.url.clone(),
                username: config.qbittorrent.username.clone(),
                password_configured: !config.qbittorrent.password.is_empty(),
                timeout_secs: config.qbittorrent.timeout_secs,
            },
            sync: config.sync.clone(),
        }
    }
}
