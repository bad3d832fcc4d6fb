//! Mock torrent client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::sync::{BatchAction, CategoryPatch, Rid, ServerStatePatch, Snapshot, TorrentPatch};
use crate::torrent_client::{TorrentClient, TorrentClientError};

/// A recorded batch action for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAction {
    pub action: BatchAction,
    pub hashes: Vec<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum Change {
    Torrent(String, Option<TorrentPatch>),
    Category(String, Option<String>),
}

/// The simulated daemon: current state plus a change log keyed by rid.
#[derive(Debug)]
struct Daemon {
    rid: u64,
    torrents: BTreeMap<String, TorrentPatch>,
    categories: BTreeMap<String, String>,
    log: Vec<(u64, Change)>,
}

impl Daemon {
    fn record(&mut self, change: Change) {
        self.rid += 1;
        self.log.push((self.rid, change));
    }

    fn upsert(&mut self, hash: &str, patch: TorrentPatch) {
        self.torrents
            .entry(hash.to_string())
            .or_default()
            .merge(&patch);
        self.record(Change::Torrent(hash.to_string(), Some(patch)));
    }

    fn remove(&mut self, hash: &str) -> bool {
        if self.torrents.remove(hash).is_some() {
            self.record(Change::Torrent(hash.to_string(), None));
            true
        } else {
            false
        }
    }

    fn full(&self) -> Snapshot {
        let mut snapshot = Snapshot::full(Rid(self.rid));
        snapshot.torrents = self.torrents.clone();
        snapshot.categories = self
            .categories
            .iter()
            .map(|(name, path)| {
                (
                    name.clone(),
                    CategoryPatch {
                        save_path: Some(path.clone()),
                    },
                )
            })
            .collect();
        snapshot.server_state = Some(ServerStatePatch {
            connection_status: Some("connected".to_string()),
            ..Default::default()
        });
        snapshot
    }

    /// Changes since `base`, folded the way the daemon reports them.
    fn since(&self, base: Rid) -> Snapshot {
        let mut upserts: BTreeMap<String, TorrentPatch> = BTreeMap::new();
        let mut removed: BTreeSet<String> = BTreeSet::new();
        let mut categories: BTreeMap<String, CategoryPatch> = BTreeMap::new();
        let mut categories_removed: BTreeSet<String> = BTreeSet::new();

        for (_, change) in self.log.iter().filter(|(rid, _)| *rid > base.get()) {
            match change {
                Change::Torrent(hash, Some(patch)) => {
                    removed.remove(hash);
                    upserts.entry(hash.clone()).or_default().merge(patch);
                }
                Change::Torrent(hash, None) => {
                    upserts.remove(hash);
                    removed.insert(hash.clone());
                }
                Change::Category(name, Some(path)) => {
                    categories_removed.remove(name);
                    categories.insert(
                        name.clone(),
                        CategoryPatch {
                            save_path: Some(path.clone()),
                        },
                    );
                }
                Change::Category(name, None) => {
                    categories.remove(name);
                    categories_removed.insert(name.clone());
                }
            }
        }

        let mut snapshot = Snapshot::partial(base, Rid(self.rid));
        snapshot.torrents = upserts;
        snapshot.removed = removed.into_iter().collect();
        snapshot.categories = categories;
        snapshot.categories_removed = categories_removed.into_iter().collect();
        snapshot
    }

    fn apply_action(&mut self, action: &BatchAction, hashes: &[String]) {
        for hash in hashes {
            let Some(current) = self.torrents.get(hash) else {
                continue;
            };
            let complete = current.progress.unwrap_or(0.0) >= 1.0;
            let patch = match action {
                BatchAction::Pause => TorrentPatch {
                    state: Some(if complete { "pausedUP" } else { "pausedDL" }.to_string()),
                    dlspeed: Some(0),
                    upspeed: Some(0),
                    ..Default::default()
                },
                BatchAction::Resume => TorrentPatch {
                    state: Some(if complete { "uploading" } else { "downloading" }.to_string()),
                    ..Default::default()
                },
                BatchAction::SetCategory { name } => TorrentPatch {
                    category: Some(name.clone()),
                    ..Default::default()
                },
                BatchAction::Delete { .. } => {
                    self.remove(hash);
                    continue;
                }
            };
            self.upsert(hash, patch);
        }
    }
}

/// Mock implementation of the TorrentClient trait.
///
/// Behaves like a small qBittorrent daemon:
/// - Serves full snapshots for no cursor, real diffs for a known cursor
/// - Applies batch actions to its own state
/// - Records fetch cursors and action calls for assertions
/// - Simulates failures (next call, per hash) and slow actions
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.upsert("abc123", fixtures::named("Some Linux ISO")).await;
///
/// let full = client.fetch_snapshot(None).await?;
/// client.remove("abc123").await;
/// let diff = client.fetch_snapshot(Some(full.cursor)).await?;
/// assert_eq!(diff.removed, vec!["abc123"]);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    daemon: Arc<RwLock<Daemon>>,
    /// Scripted snapshots, served before the daemon's own.
    scripted: Arc<RwLock<VecDeque<Snapshot>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    /// Hashes whose actions fail, with the reason.
    failing: Arc<RwLock<BTreeMap<String, String>>>,
    fetches: Arc<RwLock<Vec<Option<Rid>>>>,
    actions: Arc<RwLock<Vec<RecordedAction>>>,
    supports_batch: AtomicBool,
    hold_tx: watch::Sender<bool>,
    pending_actions: AtomicUsize,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a new mock client with an empty daemon at rid 1.
    pub fn new() -> Self {
        let (hold_tx, _) = watch::channel(false);
        Self {
            daemon: Arc::new(RwLock::new(Daemon {
                rid: 1,
                torrents: BTreeMap::new(),
                categories: BTreeMap::new(),
                log: Vec::new(),
            })),
            scripted: Arc::new(RwLock::new(VecDeque::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing: Arc::new(RwLock::new(BTreeMap::new())),
            fetches: Arc::new(RwLock::new(Vec::new())),
            actions: Arc::new(RwLock::new(Vec::new())),
            supports_batch: AtomicBool::new(true),
            hold_tx,
            pending_actions: AtomicUsize::new(0),
        }
    }

    /// Add a torrent or change some of its fields.
    pub async fn upsert(&self, hash: &str, patch: TorrentPatch) {
        self.daemon.write().await.upsert(hash, patch);
    }

    /// Remove a torrent from the daemon.
    pub async fn remove(&self, hash: &str) {
        self.daemon.write().await.remove(hash);
    }

    pub async fn add_category(&self, name: &str, save_path: &str) {
        let mut daemon = self.daemon.write().await;
        daemon
            .categories
            .insert(name.to_string(), save_path.to_string());
        daemon.record(Change::Category(name.to_string(), Some(save_path.to_string())));
    }

    pub async fn remove_category(&self, name: &str) {
        let mut daemon = self.daemon.write().await;
        if daemon.categories.remove(name).is_some() {
            daemon.record(Change::Category(name.to_string(), None));
        }
    }

    /// Current fields of a torrent on the daemon side.
    pub async fn torrent(&self, hash: &str) -> Option<TorrentPatch> {
        self.daemon.read().await.torrents.get(hash).cloned()
    }

    pub async fn rid(&self) -> Rid {
        Rid(self.daemon.read().await.rid)
    }

    /// Serve `snapshot` on the next fetch, whatever the cursor.
    pub async fn push_snapshot(&self, snapshot: Snapshot) {
        self.scripted.write().await.push_back(snapshot);
    }

    /// Make the next operation (fetch or action) fail.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every action touching `hash` fail with `reason`.
    pub async fn fail_hash(&self, hash: &str, reason: &str) {
        self.failing
            .write()
            .await
            .insert(hash.to_string(), reason.to_string());
    }

    pub fn set_supports_batch(&self, supported: bool) {
        self.supports_batch.store(supported, Ordering::SeqCst);
    }

    /// Block actions until [`MockTorrentClient::release_actions`].
    pub fn hold_actions(&self) {
        self.hold_tx.send_replace(true);
    }

    pub fn release_actions(&self) {
        self.hold_tx.send_replace(false);
    }

    /// Wait until `count` actions are blocked by [`MockTorrentClient::hold_actions`].
    pub async fn wait_for_pending_actions(&self, count: usize) {
        while self.pending_actions.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Cursors passed to each fetch, in call order.
    pub async fn fetch_cursors(&self) -> Vec<Option<Rid>> {
        self.fetches.read().await.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Wait until at least `count` fetches have been made.
    pub async fn wait_for_fetches(&self, count: usize) {
        while self.fetch_count().await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Get all recorded action calls.
    pub async fn action_calls(&self) -> Vec<RecordedAction> {
        self.actions.read().await.clone()
    }

    async fn take_error(&self) -> Option<TorrentClientError> {
        self.next_error.write().await.take()
    }

    async fn wait_if_held(&self) {
        let mut hold = self.hold_tx.subscribe();
        if !*hold.borrow() {
            return;
        }
        self.pending_actions.fetch_add(1, Ordering::SeqCst);
        // The sender lives as long as self, so this only ends on release.
        let _ = hold.wait_for(|held| !*held).await;
        self.pending_actions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_snapshot(&self, cursor: Option<Rid>) -> Result<Snapshot, TorrentClientError> {
        self.fetches.write().await.push(cursor);

        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        if let Some(snapshot) = self.scripted.write().await.pop_front() {
            return Ok(snapshot);
        }

        let daemon = self.daemon.read().await;
        let snapshot = match cursor {
            Some(base) if base.get() > 0 && base.get() <= daemon.rid => daemon.since(base),
            _ => daemon.full(),
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    async fn apply_action(
        &self,
        action: &BatchAction,
        hashes: &[String],
    ) -> Result<(), TorrentClientError> {
        self.actions.write().await.push(RecordedAction {
            action: action.clone(),
            hashes: hashes.to_vec(),
            timestamp: Utc::now(),
        });

        self.wait_if_held().await;

        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        {
            let failing = self.failing.read().await;
            if let Some(reason) = hashes.iter().find_map(|h| failing.get(h)) {
                return Err(TorrentClientError::ApiError(reason.clone()));
            }
        }

        self.daemon.write().await.apply_action(action, hashes);
        Ok(())
    }

    fn supports_batch(&self, _action: &BatchAction) -> bool {
        self.supports_batch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{named, progress};

    #[tokio::test]
    async fn test_full_then_diff() {
        let client = MockTorrentClient::new();
        client.upsert("A", named("alpha")).await;
        client.upsert("B", named("beta")).await;

        let full = client.fetch_snapshot(None).await.unwrap();
        assert!(full.is_full());
        assert_eq!(full.torrents.len(), 2);

        client.upsert("A", progress(0.5)).await;
        client.remove("B").await;

        let diff = client.fetch_snapshot(Some(full.cursor)).await.unwrap();
        assert!(!diff.is_full());
        assert_eq!(diff.base, Some(full.cursor));
        assert_eq!(diff.torrents["A"], progress(0.5));
        assert_eq!(diff.removed, vec!["B"]);

        let heartbeat = client.fetch_snapshot(Some(diff.cursor)).await.unwrap();
        assert!(heartbeat.is_heartbeat());
    }

    #[tokio::test]
    async fn test_unknown_cursor_gets_full_snapshot() {
        let client = MockTorrentClient::new();
        client.upsert("A", named("alpha")).await;
        let snapshot = client.fetch_snapshot(Some(Rid(999))).await.unwrap();
        assert!(snapshot.is_full());
    }

    #[tokio::test]
    async fn test_actions_change_daemon_state() {
        let client = MockTorrentClient::new();
        client.upsert("A", named("alpha")).await;
        client.upsert("B", named("beta")).await;

        let hashes = vec!["A".to_string(), "B".to_string()];
        client.apply_action(&BatchAction::Pause, &hashes).await.unwrap();
        assert_eq!(
            client.torrent("A").await.unwrap().state.as_deref(),
            Some("pausedDL")
        );

        client
            .apply_action(&BatchAction::Delete { delete_files: true }, &hashes[..1])
            .await
            .unwrap();
        assert!(client.torrent("A").await.is_none());
        assert_eq!(client.action_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_hash() {
        let client = MockTorrentClient::new();
        client.fail_hash("B", "locked").await;
        let err = client
            .apply_action(&BatchAction::Resume, &["B".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("locked"));
    }

    #[tokio::test]
    async fn test_next_error_fails_once() {
        let client = MockTorrentClient::new();
        client.set_next_error(TorrentClientError::Timeout).await;
        assert!(client.fetch_snapshot(None).await.is_err());
        assert!(client.fetch_snapshot(None).await.is_ok());
        assert_eq!(client.fetch_cursors().await, vec![None, None]);
    }
}
