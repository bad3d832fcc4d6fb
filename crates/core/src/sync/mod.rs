//! Torrent state synchronization.
//!
//! Keeps a local copy of the daemon's torrent list in step with
//! `sync/maindata`, tracks the user's multi-select and fans actions out over
//! it. [`SyncEngine`] ties the pieces together; the other types are usable on
//! their own.

mod batch;
mod engine;
pub mod reconciler;
mod selection;
mod snapshot;
mod store;
mod types;

pub use batch::{
    BatchAction, BatchError, BatchExecutor, BatchOperation, BatchResult, BatchStatus, BatchTicket,
    HashOutcome,
};
pub use engine::{EngineStatus, SyncEngine, SyncError, SyncEvent};
pub use reconciler::{ReconcileError, ReconcileOutcome};
pub use selection::{SelectionManager, SelectionSnapshot};
pub use snapshot::{CategoryPatch, Snapshot, SnapshotError, SnapshotKind};
pub use store::{
    SortKey, StatusFilter, TorrentFilter, TorrentStore, TorrentView, ViewSpec, ViewWindow,
};
pub use types::{
    Category, Rid, ServerState, ServerStatePatch, TorrentPatch, TorrentRecord, TorrentState,
};
