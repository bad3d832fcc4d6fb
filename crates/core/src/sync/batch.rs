//! Fan-out of one user action over a fixed set of torrents.
//!
//! The default path sends every hash in a single remote call. Actions without
//! a server-side batch form fall back to one call per hash, all in flight at
//! once, with the result assembled only after every call resolves.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::{BATCH_DURATION, BATCH_OPERATIONS};
use crate::torrent_client::TorrentClient;

/// An action applied to every target of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BatchAction {
    Pause,
    Resume,
    Delete { delete_files: bool },
    SetCategory { name: String },
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchAction::Pause => "pause",
            BatchAction::Resume => "resume",
            BatchAction::Delete { .. } => "delete",
            BatchAction::SetCategory { .. } => "set_category",
        }
    }
}

/// Outcome for one target hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum HashOutcome {
    Pending,
    Succeeded,
    Failed(String),
}

/// Overall state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Succeeded,
    Failed,
    PartiallyFailed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Failed => "failed",
            BatchStatus::PartiallyFailed => "partially_failed",
        }
    }
}

/// One in-flight fan-out. Targets are fixed at start.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOperation {
    pub id: Uuid,
    pub action: BatchAction,
    pub targets: Arc<[String]>,
    pub outcomes: BTreeMap<String, HashOutcome>,
    pub batched: bool,
    pub started_at: DateTime<Utc>,
}

impl BatchOperation {
    fn new(action: BatchAction, targets: Arc<[String]>, batched: bool) -> Self {
        let outcomes = targets
            .iter()
            .map(|h| (h.clone(), HashOutcome::Pending))
            .collect();
        Self {
            id: Uuid::new_v4(),
            action,
            targets,
            outcomes,
            batched,
            started_at: Utc::now(),
        }
    }
}

/// Final result of a batch, handed back to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub id: Uuid,
    pub action: BatchAction,
    pub status: BatchStatus,
    pub succeeded: Vec<String>,
    /// Failed hash and reason, in target order.
    pub failed: Vec<(String, String)>,
    /// Single error for a total failure of the batch call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Succeeded
    }

    /// Human-readable summary naming the action and any failed targets.
    pub fn summary(&self) -> String {
        let action = self.action.as_str();
        match self.status {
            BatchStatus::Succeeded => {
                format!("{} succeeded for {} torrent(s)", action, self.succeeded.len())
            }
            BatchStatus::Failed if self.failed.is_empty() => format!(
                "{} failed: {}",
                action,
                self.error.as_deref().unwrap_or("unknown error")
            ),
            _ => {
                let failed: Vec<&str> = self.failed.iter().map(|(h, _)| h.as_str()).collect();
                format!(
                    "{} failed for {} of {} torrent(s): {}",
                    action,
                    self.failed.len(),
                    self.failed.len() + self.succeeded.len(),
                    failed.join(", ")
                )
            }
        }
    }
}

/// Reasons a batch was refused before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Another batch operation is still pending")]
    Busy,

    #[error("Batch has no targets")]
    EmptyTargets,
}

/// Runs at most one batch at a time against the remote API.
pub struct BatchExecutor {
    client: Arc<dyn TorrentClient>,
    current: Arc<Mutex<Option<BatchOperation>>>,
}

/// Owns the pending slot for one batch and clears it when dropped, even if
/// the batch future is dropped mid-flight.
struct PendingSlot {
    id: Uuid,
    current: Arc<Mutex<Option<BatchOperation>>>,
}

impl PendingSlot {
    fn record(&self, hash: &str, outcome: HashOutcome) {
        if let Some(op) = lock(&self.current).as_mut() {
            if op.id == self.id {
                op.outcomes.insert(hash.to_string(), outcome);
            }
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let mut current = lock(&self.current);
        if current.as_ref().is_some_and(|op| op.id == self.id) {
            *current = None;
        }
    }
}

/// Proof that a batch won the pending slot. Only [`BatchExecutor::begin`]
/// hands these out and [`BatchExecutor::run`] consumes them, so no operation
/// can run without passing the busy check. Dropping an unused ticket frees
/// the slot.
pub struct BatchTicket {
    op: BatchOperation,
    slot: PendingSlot,
}

impl BatchTicket {
    pub fn operation(&self) -> &BatchOperation {
        &self.op
    }
}

fn lock(slot: &Mutex<Option<BatchOperation>>) -> MutexGuard<'_, Option<BatchOperation>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BatchExecutor {
    pub fn new(client: Arc<dyn TorrentClient>) -> Self {
        Self {
            client,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.current).is_some()
    }

    /// Copy of the pending operation, with per-hash outcomes so far.
    pub fn current(&self) -> Option<BatchOperation> {
        lock(&self.current).clone()
    }

    /// Claim the pending slot for a new operation, or refuse if one is running.
    pub fn begin(
        &self,
        action: &BatchAction,
        hashes: Arc<[String]>,
        api_batch_capable: bool,
    ) -> Result<BatchTicket, BatchError> {
        if hashes.is_empty() {
            return Err(BatchError::EmptyTargets);
        }
        let mut current = lock(&self.current);
        if current.is_some() {
            return Err(BatchError::Busy);
        }
        let op = BatchOperation::new(action.clone(), hashes, api_batch_capable);
        *current = Some(op.clone());
        Ok(BatchTicket {
            slot: PendingSlot {
                id: op.id,
                current: Arc::clone(&self.current),
            },
            op,
        })
    }

    /// Execute `action` over `hashes`.
    ///
    /// Refused with [`BatchError::Busy`] while another batch is pending; the
    /// pending batch is not affected.
    pub async fn execute(
        &self,
        action: BatchAction,
        hashes: Arc<[String]>,
        api_batch_capable: bool,
    ) -> Result<BatchResult, BatchError> {
        let ticket = self.begin(&action, hashes, api_batch_capable)?;
        Ok(self.run(ticket).await)
    }

    /// Drive the operation a ticket was issued for.
    pub async fn run(&self, ticket: BatchTicket) -> BatchResult {
        let BatchTicket { op, slot } = ticket;
        let started = Instant::now();
        info!(
            batch_id = %op.id,
            action = op.action.as_str(),
            targets = op.targets.len(),
            batched = op.batched,
            "Batch operation started"
        );

        let result = if op.batched {
            self.run_batched(&op, &slot).await
        } else {
            self.run_per_hash(&op, &slot).await
        };

        BATCH_OPERATIONS
            .with_label_values(&[result.action.as_str(), result.status.as_str()])
            .inc();
        BATCH_DURATION
            .with_label_values(&[result.action.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            batch_id = %result.id,
            status = result.status.as_str(),
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Batch operation finished"
        );
        drop(slot);
        result
    }

    async fn run_batched(&self, op: &BatchOperation, slot: &PendingSlot) -> BatchResult {
        match self.client.apply_action(&op.action, &op.targets).await {
            Ok(()) => {
                for hash in op.targets.iter() {
                    slot.record(hash, HashOutcome::Succeeded);
                }
                finish(op, op.targets.to_vec(), Vec::new(), None)
            }
            Err(e) => {
                warn!(batch_id = %op.id, error = %e, "Batch call failed");
                finish(op, Vec::new(), Vec::new(), Some(e.to_string()))
            }
        }
    }

    async fn run_per_hash(&self, op: &BatchOperation, slot: &PendingSlot) -> BatchResult {
        let mut calls: FuturesUnordered<_> = op
            .targets
            .iter()
            .map(|hash| {
                let client = Arc::clone(&self.client);
                let action = op.action.clone();
                let hash = hash.clone();
                async move {
                    let result = client.apply_action(&action, std::slice::from_ref(&hash)).await;
                    (hash, result)
                }
            })
            .collect();

        let mut outcomes: BTreeMap<String, Result<(), String>> = BTreeMap::new();
        while let Some((hash, result)) = calls.next().await {
            match &result {
                Ok(()) => slot.record(&hash, HashOutcome::Succeeded),
                Err(e) => {
                    warn!(batch_id = %op.id, hash = %hash, error = %e, "Batch target failed");
                    slot.record(&hash, HashOutcome::Failed(e.to_string()));
                }
            }
            outcomes.insert(hash, result.map_err(|e| e.to_string()));
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for hash in op.targets.iter() {
            match outcomes.remove(hash) {
                Some(Ok(())) => succeeded.push(hash.clone()),
                Some(Err(reason)) => failed.push((hash.clone(), reason)),
                None => failed.push((hash.clone(), "no outcome".to_string())),
            }
        }
        finish(op, succeeded, failed, None)
    }
}

fn finish(
    op: &BatchOperation,
    succeeded: Vec<String>,
    failed: Vec<(String, String)>,
    error: Option<String>,
) -> BatchResult {
    let status = if error.is_some() || succeeded.is_empty() {
        BatchStatus::Failed
    } else if failed.is_empty() {
        BatchStatus::Succeeded
    } else {
        BatchStatus::PartiallyFailed
    };
    BatchResult {
        id: op.id,
        action: op.action.clone(),
        status,
        succeeded,
        failed,
        error,
        started_at: op.started_at,
        finished_at: Utc::now(),
    }
}
