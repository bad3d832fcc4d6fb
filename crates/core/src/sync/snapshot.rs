//! Snapshots decoded from `sync/maindata` responses.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Rid, ServerStatePatch, TorrentPatch};

/// Schema violations found while decoding a maindata payload.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid maindata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Torrent entry with an empty hash")]
    EmptyHash,

    #[error("Progress {value} out of range for torrent {hash}")]
    ProgressOutOfRange { hash: String, value: f64 },

    #[error("Full snapshot carries a removal list")]
    RemovalInFullSnapshot,

    #[error("Torrent {0} is both updated and removed")]
    UpsertAndRemove(String),
}

/// Whether a snapshot replaces the store or patches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Full,
    Partial,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Full => "full",
            SnapshotKind::Partial => "partial",
        }
    }
}

/// Category fields as sent on the wire (keyed by name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPatch {
    #[serde(rename = "savePath", skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
}

/// One validated daemon response.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    /// Cursor the request was issued with; a partial only applies on top of it.
    pub base: Option<Rid>,
    /// Cursor to store once applied.
    pub cursor: Rid,
    /// Every torrent for a full snapshot, added-or-changed ones for a partial.
    pub torrents: BTreeMap<String, TorrentPatch>,
    pub removed: Vec<String>,
    pub categories: BTreeMap<String, CategoryPatch>,
    pub categories_removed: Vec<String>,
    pub tags: Vec<String>,
    pub tags_removed: Vec<String>,
    pub server_state: Option<ServerStatePatch>,
}

#[derive(Debug, Deserialize)]
struct MainData {
    rid: u64,
    #[serde(default)]
    full_update: bool,
    #[serde(default)]
    torrents: HashMap<String, TorrentPatch>,
    #[serde(default)]
    torrents_removed: Vec<String>,
    #[serde(default)]
    categories: HashMap<String, CategoryPatch>,
    #[serde(default)]
    categories_removed: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    tags_removed: Vec<String>,
    #[serde(default)]
    server_state: Option<ServerStatePatch>,
}

impl Snapshot {
    /// An empty full snapshot at `cursor`.
    pub fn full(cursor: Rid) -> Self {
        Self::empty(SnapshotKind::Full, None, cursor)
    }

    /// An empty partial snapshot taking the store from `base` to `cursor`.
    pub fn partial(base: Rid, cursor: Rid) -> Self {
        Self::empty(SnapshotKind::Partial, Some(base), cursor)
    }

    fn empty(kind: SnapshotKind, base: Option<Rid>, cursor: Rid) -> Self {
        Self {
            kind,
            base,
            cursor,
            torrents: BTreeMap::new(),
            removed: Vec::new(),
            categories: BTreeMap::new(),
            categories_removed: Vec::new(),
            tags: Vec::new(),
            tags_removed: Vec::new(),
            server_state: None,
        }
    }

    pub fn with_torrent(mut self, hash: impl Into<String>, patch: TorrentPatch) -> Self {
        self.torrents.insert(hash.into(), patch);
        self
    }

    pub fn with_removed(mut self, hash: impl Into<String>) -> Self {
        self.removed.push(hash.into());
        self
    }

    pub fn with_category(mut self, name: impl Into<String>, save_path: impl Into<String>) -> Self {
        self.categories.insert(
            name.into(),
            CategoryPatch {
                save_path: Some(save_path.into()),
            },
        );
        self
    }

    pub fn is_full(&self) -> bool {
        self.kind == SnapshotKind::Full
    }

    /// Nothing but a cursor bump.
    pub fn is_heartbeat(&self) -> bool {
        self.kind == SnapshotKind::Partial
            && self.torrents.is_empty()
            && self.removed.is_empty()
            && self.categories.is_empty()
            && self.categories_removed.is_empty()
            && self.tags.is_empty()
            && self.tags_removed.is_empty()
            && self.server_state.is_none()
    }

    /// Decode and validate a maindata body fetched with cursor `base`.
    pub fn decode(base: Option<Rid>, body: &str) -> Result<Self, SnapshotError> {
        let data: MainData = serde_json::from_str(body)?;

        let kind = if data.full_update {
            SnapshotKind::Full
        } else {
            SnapshotKind::Partial
        };

        let snapshot = Self {
            kind,
            base,
            cursor: Rid(data.rid),
            torrents: data.torrents.into_iter().collect(),
            removed: data.torrents_removed,
            categories: data.categories.into_iter().collect(),
            categories_removed: data.categories_removed,
            tags: data.tags,
            tags_removed: data.tags_removed,
            server_state: data.server_state,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for (hash, patch) in &self.torrents {
            if hash.is_empty() {
                return Err(SnapshotError::EmptyHash);
            }
            if let Some(progress) = patch.progress {
                if !progress.is_finite() || !(0.0..=1.0).contains(&progress) {
                    return Err(SnapshotError::ProgressOutOfRange {
                        hash: hash.clone(),
                        value: progress,
                    });
                }
            }
        }

        let has_removals = !(self.removed.is_empty()
            && self.categories_removed.is_empty()
            && self.tags_removed.is_empty());
        if self.is_full() && has_removals {
            return Err(SnapshotError::RemovalInFullSnapshot);
        }

        for hash in &self.removed {
            if hash.is_empty() {
                return Err(SnapshotError::EmptyHash);
            }
            if self.torrents.contains_key(hash) {
                return Err(SnapshotError::UpsertAndRemove(hash.clone()));
            }
        }

        Ok(())
    }
}
