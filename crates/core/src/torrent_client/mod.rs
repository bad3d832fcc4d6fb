//! Torrent client abstraction.
//!
//! This module provides a `TorrentClient` trait for the remote daemon: one
//! call to fetch a sync snapshot, one to apply a batch action.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;
