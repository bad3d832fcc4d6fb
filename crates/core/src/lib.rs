pub mod config;
pub mod metrics;
pub mod sync;
pub mod testing;
pub mod torrent_client;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, QBittorrentConfig,
    SanitizedConfig, ServerConfig, SyncConfig,
};
pub use sync::{
    BatchAction, BatchResult, BatchStatus, EngineStatus, SyncEngine, SyncError, SyncEvent,
    TorrentRecord, ViewSpec, ViewWindow,
};
pub use torrent_client::{QBittorrentClient, TorrentClient, TorrentClientError};
