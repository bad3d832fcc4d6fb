//! Sync engine.
//!
//! Owns the store, the selection and the batch executor, and drives them:
//! - Polling: one fetch in flight at a time, applied in request order
//! - Connectivity: consecutive transport failures raise a degraded signal
//! - Batches: selection snapshot in, succeeded hashes deselected after

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::metrics::{
    CONNECTIVITY_DEGRADED, POLLS, POLL_DURATION, RECONCILIATIONS, SELECTION_SIZE, STORE_TORRENTS,
};
use crate::torrent_client::{TorrentClient, TorrentClientError};

use super::batch::{BatchAction, BatchError, BatchExecutor, BatchOperation, BatchResult};
use super::reconciler::{self, ReconcileError, ReconcileOutcome};
use super::selection::{SelectionManager, SelectionSnapshot};
use super::snapshot::SnapshotKind;
use super::store::{TorrentStore, ViewSpec, ViewWindow};
use super::types::{Category, Rid, ServerState, TorrentRecord};

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Client(#[from] TorrentClientError),

    #[error("Snapshot rejected: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("Unknown torrent: {0}")]
    UnknownTorrent(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Selection is empty")]
    EmptySelection,

    #[error("Batch task failed: {0}")]
    BatchTask(String),
}

/// Change notification, sent once per completed state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Reconciled {
        revision: u64,
        cursor: Rid,
        kind: SnapshotKind,
        added: usize,
        updated: usize,
        removed: usize,
    },
    SelectionChanged {
        size: usize,
    },
    ViewChanged {
        revision: u64,
    },
    Connectivity {
        degraded: bool,
        consecutive_failures: u32,
    },
    BatchStarted {
        id: Uuid,
        action: BatchAction,
        targets: usize,
    },
    BatchCompleted {
        result: BatchResult,
    },
}

/// Point-in-time engine status.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub cursor: Option<Rid>,
    pub revision: u64,
    pub torrents: usize,
    pub visible: usize,
    pub selected: usize,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub batch_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub server_state: ServerState,
}

struct SyncState {
    store: TorrentStore,
    selection: SelectionManager,
    last_poll_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// The sync engine - the only writer of the store and the selection.
pub struct SyncEngine {
    config: SyncConfig,
    client: Arc<dyn TorrentClient>,
    state: RwLock<SyncState>,
    poll_lock: Mutex<()>,
    executor: BatchExecutor,
    refresh: Notify,
    events: broadcast::Sender<SyncEvent>,
    failures: AtomicU32,

    // Runtime state
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, client: Arc<dyn TorrentClient>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            executor: BatchExecutor::new(Arc::clone(&client)),
            config,
            client,
            state: RwLock::new(SyncState {
                store: TorrentStore::new(),
                selection: SelectionManager::new(),
                last_poll_at: None,
                last_error: None,
            }),
            poll_lock: Mutex::new(()),
            refresh: Notify::new(),
            events,
            failures: AtomicU32::new(0),
            running: AtomicBool::new(false),
            shutdown_tx,
            poll_task: Mutex::new(None),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the poll loop. The first poll happens immediately.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sync engine already running");
            return;
        }

        info!(
            client = self.client.name(),
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting sync engine"
        );

        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        let handle = tokio::spawn(async move {
            info!("Poll loop started");
            loop {
                if let Err(e) = engine.poll_once().await {
                    debug!("Poll cycle ended with error: {}", e);
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Poll loop received shutdown signal");
                        break;
                    }
                    _ = engine.refresh.notified() => {
                        debug!("Immediate refresh requested");
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                if !engine.running.load(Ordering::Relaxed) {
                    break;
                }
            }
            info!("Poll loop stopped");
        });

        *self.poll_task.lock().await = Some(handle);
    }

    /// Stop the poll loop and wait for it to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Sync engine not running");
            return;
        }

        info!("Stopping sync engine");
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.poll_task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Poll loop task failed: {}", e);
            }
        }
        info!("Sync engine stopped");
    }

    /// Wake the poll loop now instead of at the next tick.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Fetch one snapshot and reconcile it.
    ///
    /// Transport and schema errors leave the store and cursor untouched. A
    /// snapshot the reconciler rejects clears the cursor so the next poll
    /// asks for a full snapshot.
    pub async fn poll_once(&self) -> Result<ReconcileOutcome, SyncError> {
        let _in_flight = self.poll_lock.lock().await;

        let cursor = self.state.read().await.store.cursor();
        let started = Instant::now();
        let fetched = self.client.fetch_snapshot(cursor).await;
        POLL_DURATION.observe(started.elapsed().as_secs_f64());

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.record_poll_failure(&e).await;
                return Err(e.into());
            }
        };
        POLLS.with_label_values(&["ok"]).inc();
        self.record_poll_success();

        let kind = snapshot.kind;
        let mut state = self.state.write().await;
        let SyncState {
            store,
            selection,
            last_poll_at,
            last_error,
        } = &mut *state;
        *last_poll_at = Some(Utc::now());
        *last_error = None;

        match reconciler::apply(store, selection, snapshot) {
            Ok(outcome) => {
                RECONCILIATIONS
                    .with_label_values(&[kind.as_str(), "applied"])
                    .inc();
                STORE_TORRENTS.set(store.len() as i64);
                SELECTION_SIZE.set(selection.len() as i64);

                self.emit(SyncEvent::Reconciled {
                    revision: outcome.revision,
                    cursor: outcome.cursor,
                    kind: outcome.kind,
                    added: outcome.added,
                    updated: outcome.updated,
                    removed: outcome.removed,
                });
                if outcome.pruned_selection > 0 {
                    self.emit(SyncEvent::SelectionChanged {
                        size: selection.len(),
                    });
                }
                Ok(outcome)
            }
            Err(e) => {
                RECONCILIATIONS
                    .with_label_values(&[kind.as_str(), "rejected"])
                    .inc();
                warn!(error = %e, "Snapshot rejected, forcing full resync");
                store.reset_cursor();
                *last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn record_poll_failure(&self, error: &TorrentClientError) {
        {
            let mut state = self.state.write().await;
            state.last_error = Some(error.to_string());
        }

        if !error.is_transport() {
            POLLS.with_label_values(&["error"]).inc();
            warn!(error = %error, "Poll discarded");
            return;
        }

        POLLS.with_label_values(&["transport_error"]).inc();
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(consecutive_failures = failures, error = %error, "Poll failed");

        if failures == self.config.degraded_after_failures {
            warn!(
                consecutive_failures = failures,
                "Connectivity degraded"
            );
            CONNECTIVITY_DEGRADED.set(1.0);
            self.emit(SyncEvent::Connectivity {
                degraded: true,
                consecutive_failures: failures,
            });
        }
    }

    fn record_poll_success(&self) {
        let previous = self.failures.swap(0, Ordering::SeqCst);
        if previous >= self.config.degraded_after_failures {
            info!(after_failures = previous, "Connectivity restored");
            CONNECTIVITY_DEGRADED.set(0.0);
            self.emit(SyncEvent::Connectivity {
                degraded: false,
                consecutive_failures: 0,
            });
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures() >= self.config.degraded_after_failures
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn status(&self) -> EngineStatus {
        let state = self.state.read().await;
        EngineStatus {
            running: self.is_running(),
            cursor: state.store.cursor(),
            revision: state.store.revision(),
            torrents: state.store.len(),
            visible: state.store.view().len(),
            selected: state.selection.len(),
            degraded: self.is_degraded(),
            consecutive_failures: self.consecutive_failures(),
            batch_pending: self.executor.is_pending(),
            last_poll_at: state.last_poll_at,
            last_error: state.last_error.clone(),
            server_state: state.store.server_state().clone(),
        }
    }

    pub async fn window(&self, offset: usize, limit: usize) -> ViewWindow {
        self.state.read().await.store.window(offset, limit)
    }

    pub async fn torrent(&self, hash: &str) -> Option<Arc<TorrentRecord>> {
        self.state.read().await.store.get(hash)
    }

    pub async fn view_spec(&self) -> ViewSpec {
        self.state.read().await.store.view_spec().clone()
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.state
            .read()
            .await
            .store
            .categories()
            .values()
            .cloned()
            .collect()
    }

    pub async fn tags(&self) -> Vec<String> {
        self.state.read().await.store.tags().iter().cloned().collect()
    }

    pub async fn selection(&self) -> SelectionSnapshot {
        self.state.read().await.selection.snapshot()
    }

    /// The pending batch, if any.
    pub fn current_batch(&self) -> Option<BatchOperation> {
        self.executor.current()
    }

    // =========================================================================
    // View and selection
    // =========================================================================

    /// Replace the view definition and prune the selection to what is still
    /// visible.
    pub async fn set_view(&self, spec: ViewSpec) -> usize {
        let mut state = self.state.write().await;
        let SyncState {
            store, selection, ..
        } = &mut *state;

        store.set_view_spec(spec);
        let visible: HashSet<String> = store.visible_hashes().into_iter().collect();
        let pruned = selection.retain(|hash| visible.contains(hash));

        self.emit(SyncEvent::ViewChanged {
            revision: store.revision(),
        });
        if pruned > 0 {
            debug!(pruned, "Selection pruned to visible set");
            self.selection_changed(selection);
        }
        visible.len()
    }

    /// Toggle one torrent. Returns whether it is selected afterwards.
    pub async fn toggle(&self, hash: &str) -> Result<bool, SyncError> {
        let mut state = self.state.write().await;
        let SyncState {
            store, selection, ..
        } = &mut *state;

        // Deselecting a vanished hash is impossible: pruning already removed it.
        if !store.contains(hash) {
            return Err(SyncError::UnknownTorrent(hash.to_string()));
        }
        let selected = selection.toggle(hash);
        self.selection_changed(selection);
        Ok(selected)
    }

    /// Select exactly the torrents visible under the current view.
    pub async fn select_all_visible(&self) -> usize {
        let mut state = self.state.write().await;
        let SyncState {
            store, selection, ..
        } = &mut *state;

        selection.select_all(store.visible_hashes());
        self.selection_changed(selection);
        selection.len()
    }

    pub async fn clear_selection(&self) {
        let mut state = self.state.write().await;
        state.selection.clear();
        self.selection_changed(&state.selection);
    }

    fn selection_changed(&self, selection: &SelectionManager) {
        SELECTION_SIZE.set(selection.len() as i64);
        self.emit(SyncEvent::SelectionChanged {
            size: selection.len(),
        });
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Run `action` over the current selection.
    ///
    /// Succeeded hashes are deselected and, if anything succeeded, a poll is
    /// requested right away. The store itself only changes through that poll.
    ///
    /// Once accepted, the batch runs on its own task: dropping the returned
    /// future does not cancel it, and the completion step still runs.
    pub async fn execute_batch(
        self: &Arc<Self>,
        action: BatchAction,
    ) -> Result<BatchResult, SyncError> {
        let targets = {
            let state = self.state.read().await;
            if state.selection.is_empty() {
                return Err(SyncError::EmptySelection);
            }
            if let BatchAction::SetCategory { name } = &action {
                if !name.is_empty() && !state.store.has_category(name) {
                    return Err(SyncError::UnknownCategory(name.clone()));
                }
            }
            state.selection.snapshot()
        };

        let batched = self.client.supports_batch(&action);
        let ticket = self.executor.begin(&action, targets, batched)?;
        let op = ticket.operation();
        self.emit(SyncEvent::BatchStarted {
            id: op.id,
            action: op.action.clone(),
            targets: op.targets.len(),
        });

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = engine.executor.run(ticket).await;
            engine.complete_batch(&result).await;
            result
        });

        task.await.map_err(|e| SyncError::BatchTask(e.to_string()))
    }

    async fn complete_batch(&self, result: &BatchResult) {
        if !result.succeeded.is_empty() {
            let mut state = self.state.write().await;
            let cleared = state
                .selection
                .deselect(result.succeeded.iter().map(String::as_str));
            if cleared > 0 {
                self.selection_changed(&state.selection);
            }
            drop(state);
            self.request_refresh();
        }

        self.emit(SyncEvent::BatchCompleted {
            result: result.clone(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
