//! Testing utilities and mock implementations.
//!
//! This module provides an in-memory daemon behind the `TorrentClient` trait,
//! allowing the sync engine and the server to be tested without qBittorrent.
//!
//! # Example
//!
//! ```rust,ignore
//! use qbdeck_core::testing::{fixtures, MockTorrentClient};
//!
//! let client = MockTorrentClient::new();
//! client.upsert("abc123", fixtures::named("Debian ISO")).await;
//! client.fail_hash("def456", "torrent is locked").await;
//!
//! // Use in SyncEngine...
//! ```

mod mock_torrent_client;

pub use mock_torrent_client::{MockTorrentClient, RecordedAction};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::sync::{Rid, Snapshot, TorrentPatch};

    /// A patch carrying only a name.
    pub fn named(name: &str) -> TorrentPatch {
        TorrentPatch {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// A patch carrying only progress.
    pub fn progress(value: f64) -> TorrentPatch {
        TorrentPatch {
            progress: Some(value),
            ..Default::default()
        }
    }

    /// A patch with the fields a first sighting usually carries.
    pub fn record_patch(name: &str, state: &str, progress: f64) -> TorrentPatch {
        let size = 1024 * 1024 * 700; // 700 MB
        TorrentPatch {
            name: Some(name.to_string()),
            state: Some(state.to_string()),
            progress: Some(progress),
            size: Some(size),
            total_size: Some(size),
            downloaded: Some((size as f64 * progress) as i64),
            uploaded: Some(0),
            dlspeed: Some(0),
            upspeed: Some(0),
            eta: Some(8_640_000),
            ratio: Some(0.0),
            num_seeds: Some(12),
            num_leechs: Some(3),
            category: Some(String::new()),
            tags: Some(String::new()),
            save_path: Some("/downloads".to_string()),
            added_on: Some(1_703_980_800),
            completion_on: Some(0),
            last_activity: Some(1_703_980_800),
        }
    }

    /// A full snapshot at `cursor` holding exactly `torrents`.
    pub fn full_snapshot<'a>(
        cursor: u64,
        torrents: impl IntoIterator<Item = (&'a str, TorrentPatch)>,
    ) -> Snapshot {
        torrents
            .into_iter()
            .fold(Snapshot::full(Rid(cursor)), |snapshot, (hash, patch)| {
                snapshot.with_torrent(hash, patch)
            })
    }

    /// A partial snapshot taking the store from `base` to `cursor`.
    pub fn partial_snapshot<'a>(
        base: u64,
        cursor: u64,
        upserts: impl IntoIterator<Item = (&'a str, TorrentPatch)>,
        removed: impl IntoIterator<Item = &'a str>,
    ) -> Snapshot {
        let snapshot = upserts.into_iter().fold(
            Snapshot::partial(Rid(base), Rid(cursor)),
            |snapshot, (hash, patch)| snapshot.with_torrent(hash, patch),
        );
        removed
            .into_iter()
            .fold(snapshot, |snapshot, hash| snapshot.with_removed(hash))
    }
}
