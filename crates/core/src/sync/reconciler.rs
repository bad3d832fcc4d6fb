//! Merges snapshots into the store and prunes the selection.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::selection::SelectionManager;
use super::snapshot::{Snapshot, SnapshotKind};
use super::store::TorrentStore;
use super::types::{Category, Rid, TorrentRecord};

/// Why a snapshot was not applied. The store is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("Partial snapshot received before any full snapshot")]
    NotSynced,

    #[error("Partial snapshot based on rid {got:?}, store is at rid {expected}")]
    OutOfOrder { expected: Rid, got: Option<Rid> },

    #[error("Partial snapshot moves cursor backwards ({base} -> {cursor})")]
    NonMonotonic { base: Rid, cursor: Rid },
}

/// What one reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub kind: SnapshotKind,
    pub cursor: Rid,
    pub revision: u64,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Selected hashes dropped because their torrent disappeared.
    pub pruned_selection: usize,
}

/// Apply `snapshot` to `store`, then prune `selection`.
///
/// Runs to completion or not at all: a rejected snapshot leaves both the
/// store and the selection unchanged.
pub fn apply(
    store: &mut TorrentStore,
    selection: &mut SelectionManager,
    snapshot: Snapshot,
) -> Result<ReconcileOutcome, ReconcileError> {
    if snapshot.kind == SnapshotKind::Partial {
        check_partial(store.cursor(), &snapshot)?;
    }

    let kind = snapshot.kind;
    let cursor = snapshot.cursor;
    let (added, updated, removed) = match kind {
        SnapshotKind::Full => apply_full(store, snapshot),
        SnapshotKind::Partial => apply_partial(store, snapshot),
    };

    store.commit(cursor);
    let pruned_selection = selection.retain(|hash| store.contains(hash));

    debug!(
        kind = kind.as_str(),
        %cursor,
        added,
        updated,
        removed,
        pruned_selection,
        "Snapshot reconciled"
    );

    Ok(ReconcileOutcome {
        kind,
        cursor,
        revision: store.revision(),
        added,
        updated,
        removed,
        pruned_selection,
    })
}

fn check_partial(current: Option<Rid>, snapshot: &Snapshot) -> Result<(), ReconcileError> {
    let Some(expected) = current else {
        return Err(ReconcileError::NotSynced);
    };
    if snapshot.base != Some(expected) {
        return Err(ReconcileError::OutOfOrder {
            expected,
            got: snapshot.base,
        });
    }
    if snapshot.cursor < expected {
        return Err(ReconcileError::NonMonotonic {
            base: expected,
            cursor: snapshot.cursor,
        });
    }
    Ok(())
}

fn apply_full(store: &mut TorrentStore, snapshot: Snapshot) -> (usize, usize, usize) {
    let mut added = 0;
    let mut updated = 0;
    let mut records = HashMap::with_capacity(snapshot.torrents.len());
    for (hash, patch) in snapshot.torrents {
        if store.contains(&hash) {
            updated += 1;
        } else {
            added += 1;
        }
        let record = TorrentRecord::from_patch(hash.clone(), &patch);
        records.insert(hash, Arc::new(record));
    }
    let removed = store.hashes().filter(|h| !records.contains_key(*h)).count();
    store.replace_records(records);

    let categories = snapshot
        .categories
        .into_iter()
        .map(|(name, patch)| {
            let category = Category {
                name: name.clone(),
                save_path: patch.save_path.unwrap_or_default(),
            };
            (name, category)
        })
        .collect();
    *store.categories_mut() = categories;
    *store.tags_mut() = snapshot.tags.into_iter().collect();

    let server_state = store.server_state_mut();
    *server_state = Default::default();
    if let Some(patch) = &snapshot.server_state {
        server_state.apply(patch);
    }

    (added, updated, removed)
}

fn apply_partial(store: &mut TorrentStore, snapshot: Snapshot) -> (usize, usize, usize) {
    let mut added = 0;
    let mut updated = 0;
    let mut removed = 0;

    let records = store.records_mut();
    for (hash, patch) in snapshot.torrents {
        match records.get_mut(&hash) {
            Some(existing) => {
                Arc::make_mut(existing).apply(&patch);
                updated += 1;
            }
            None => {
                let record = TorrentRecord::from_patch(hash.clone(), &patch);
                records.insert(hash, Arc::new(record));
                added += 1;
            }
        }
    }
    for hash in &snapshot.removed {
        if records.remove(hash).is_some() {
            removed += 1;
        }
    }

    let categories = store.categories_mut();
    for (name, patch) in snapshot.categories {
        let entry = categories.entry(name.clone()).or_insert_with(|| Category {
            name,
            save_path: String::new(),
        });
        if let Some(save_path) = patch.save_path {
            entry.save_path = save_path;
        }
    }
    for name in &snapshot.categories_removed {
        categories.remove(name);
    }

    let tags = store.tags_mut();
    tags.extend(snapshot.tags);
    for tag in &snapshot.tags_removed {
        tags.remove(tag);
    }

    if let Some(patch) = &snapshot.server_state {
        store.server_state_mut().apply(patch);
    }

    (added, updated, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{ServerStatePatch, TorrentPatch};
    use crate::testing::fixtures::{full_snapshot, named, partial_snapshot, progress};

    fn synced_abc() -> (TorrentStore, SelectionManager) {
        let mut store = TorrentStore::new();
        let mut selection = SelectionManager::new();
        apply(
            &mut store,
            &mut selection,
            full_snapshot(1, [("A", named("a")), ("B", named("b")), ("C", named("c"))]),
        )
        .unwrap();
        (store, selection)
    }

    #[test]
    fn test_full_snapshot_populates_store() {
        let (store, _) = synced_abc();
        assert_eq!(store.len(), 3);
        assert_eq!(store.cursor(), Some(Rid(1)));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.get("B").unwrap().name, "b");
    }

    #[test]
    fn test_full_snapshot_is_idempotent() {
        let snapshot = full_snapshot(5, [("A", named("a")), ("B", named("b"))])
            .with_category("linux", "/data/linux");

        let mut once = TorrentStore::new();
        let mut sel_once = SelectionManager::new();
        apply(&mut once, &mut sel_once, snapshot.clone()).unwrap();

        let mut twice = TorrentStore::new();
        let mut sel_twice = SelectionManager::new();
        apply(&mut twice, &mut sel_twice, snapshot.clone()).unwrap();
        let outcome = apply(&mut twice, &mut sel_twice, snapshot).unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.updated, 2);
        assert_eq!(once.cursor(), twice.cursor());
        assert_eq!(once.view(), twice.view());
        assert_eq!(once.categories(), twice.categories());
    }

    #[test]
    fn test_full_snapshot_removes_missing() {
        let (mut store, mut selection) = synced_abc();
        let outcome = apply(&mut store, &mut selection, full_snapshot(9, [("A", named("a"))]))
            .unwrap();
        assert_eq!(outcome.removed, 2);
        assert_eq!(store.visible_hashes(), vec!["A"]);
    }

    #[test]
    fn test_full_snapshot_with_no_torrents_empties_store() {
        let (mut store, mut selection) = synced_abc();
        let outcome = apply(
            &mut store,
            &mut selection,
            full_snapshot(2, std::iter::empty::<(&str, TorrentPatch)>()),
        )
        .unwrap();
        assert_eq!(outcome.removed, 3);
        assert!(store.is_empty());
        assert_eq!(store.cursor(), Some(Rid(2)));
    }

    #[test]
    fn test_full_snapshot_replaces_records_wholesale() {
        let (mut store, mut selection) = synced_abc();
        apply(
            &mut store,
            &mut selection,
            partial_snapshot(1, 2, [("A", progress(0.7))], []),
        )
        .unwrap();
        apply(&mut store, &mut selection, full_snapshot(3, [("A", named("a"))])).unwrap();
        let record = store.get("A").unwrap();
        assert_eq!(record.progress, 0.0);
    }

    #[test]
    fn test_partial_merge() {
        let (mut store, mut selection) = synced_abc();
        let before_a = store.get("A").unwrap();

        let outcome = apply(
            &mut store,
            &mut selection,
            partial_snapshot(1, 2, [("B", named("b2"))], ["C"]),
        )
        .unwrap();

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.removed, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("A").unwrap(), before_a);
        assert_eq!(store.get("B").unwrap().name, "b2");
        assert!(!store.contains("C"));
        assert_eq!(store.cursor(), Some(Rid(2)));
    }

    #[test]
    fn test_partial_inserts_unknown_hash() {
        let (mut store, mut selection) = synced_abc();
        let outcome = apply(
            &mut store,
            &mut selection,
            partial_snapshot(1, 2, [("D", named("d"))], []),
        )
        .unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(store.get("D").unwrap().name, "d");
    }

    #[test]
    fn test_partial_removal_of_absent_hash_is_ignored() {
        let (mut store, mut selection) = synced_abc();
        let outcome = apply(
            &mut store,
            &mut selection,
            partial_snapshot(1, 2, [], ["ZZZ"]),
        )
        .unwrap();
        assert_eq!(outcome.removed, 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_heartbeat_advances_cursor() {
        let (mut store, mut selection) = synced_abc();
        let outcome = apply(&mut store, &mut selection, partial_snapshot(1, 4, [], [])).unwrap();
        assert_eq!(outcome.cursor, Rid(4));
        assert_eq!(store.cursor(), Some(Rid(4)));
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_partial_before_full_is_rejected() {
        let mut store = TorrentStore::new();
        let mut selection = SelectionManager::new();
        let err = apply(
            &mut store,
            &mut selection,
            partial_snapshot(0, 1, [("A", named("a"))], []),
        )
        .unwrap_err();
        assert_eq!(err, ReconcileError::NotSynced);
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_out_of_order_partial_is_rejected() {
        let (mut store, mut selection) = synced_abc();
        let err = apply(
            &mut store,
            &mut selection,
            partial_snapshot(7, 8, [], ["A"]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::OutOfOrder {
                expected: Rid(1),
                got: Some(Rid(7))
            }
        );
        assert!(store.contains("A"));
        assert_eq!(store.cursor(), Some(Rid(1)));

        apply(&mut store, &mut selection, full_snapshot(8, [("A", named("a"))])).unwrap();
        assert_eq!(store.cursor(), Some(Rid(8)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_partial_is_not_applied_twice() {
        let (mut store, mut selection) = synced_abc();
        let partial = partial_snapshot(1, 2, [], ["C"]);
        apply(&mut store, &mut selection, partial.clone()).unwrap();
        let err = apply(&mut store, &mut selection, partial).unwrap_err();
        assert!(matches!(err, ReconcileError::OutOfOrder { .. }));
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_backwards_partial_is_rejected() {
        let (mut store, mut selection) = synced_abc();
        let err = apply(&mut store, &mut selection, partial_snapshot(1, 0, [], [])).unwrap_err();
        assert!(matches!(err, ReconcileError::NonMonotonic { .. }));
    }

    #[test]
    fn test_selection_pruned_on_removal() {
        let (mut store, mut selection) = synced_abc();
        selection.toggle("A");
        selection.toggle("B");

        let outcome = apply(
            &mut store,
            &mut selection,
            partial_snapshot(1, 2, [], ["B"]),
        )
        .unwrap();

        assert_eq!(outcome.pruned_selection, 1);
        assert_eq!(&*selection.snapshot(), &["A".to_string()]);
    }

    #[test]
    fn test_selection_untouched_when_rejected() {
        let (mut store, mut selection) = synced_abc();
        selection.toggle("C");
        let _ = apply(&mut store, &mut selection, partial_snapshot(3, 4, [], ["C"]));
        assert!(selection.is_selected("C"));
    }

    #[test]
    fn test_categories_tags_and_server_state() {
        let (mut store, mut selection) = synced_abc();

        let mut partial = partial_snapshot(1, 2, [], []).with_category("tv", "/data/tv");
        partial.tags = vec!["hd".to_string(), "new".to_string()];
        partial.server_state = Some(ServerStatePatch {
            dl_info_speed: Some(42),
            ..Default::default()
        });
        apply(&mut store, &mut selection, partial).unwrap();
        assert!(store.has_category("tv"));
        assert_eq!(store.tags().len(), 2);
        assert_eq!(store.server_state().download_speed, 42);

        let mut partial = partial_snapshot(2, 3, [], []);
        partial.categories_removed = vec!["tv".to_string()];
        partial.tags_removed = vec!["new".to_string()];
        apply(&mut store, &mut selection, partial).unwrap();
        assert!(!store.has_category("tv"));
        assert!(store.tags().contains("hd"));
        assert!(!store.tags().contains("new"));
        assert_eq!(store.server_state().download_speed, 42);
    }
}
