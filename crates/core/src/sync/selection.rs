//! Multi-select state, independent of the store's contents.

use std::collections::HashSet;
use std::sync::Arc;

/// Immutable copy of the selection, handed to the batch executor.
pub type SelectionSnapshot = Arc<[String]>;

/// The user's current multi-select.
///
/// Mutated only through these operations; the reconciler calls
/// [`SelectionManager::retain`] to drop hashes that left the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionManager {
    selected: HashSet<String>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the hash if absent, remove it if present. Returns whether it is
    /// selected afterwards.
    pub fn toggle(&mut self, hash: &str) -> bool {
        if self.selected.remove(hash) {
            false
        } else {
            self.selected.insert(hash.to_string());
            true
        }
    }

    /// Replace the selection with exactly the visible hashes.
    pub fn select_all<I, S>(&mut self, visible: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected = visible.into_iter().map(Into::into).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, hash: &str) -> bool {
        self.selected.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Sorted immutable copy.
    pub fn snapshot(&self) -> SelectionSnapshot {
        let mut hashes: Vec<String> = self.selected.iter().cloned().collect();
        hashes.sort_unstable();
        hashes.into()
    }

    /// Keep only hashes accepted by `keep`. Returns how many were dropped.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.selected.len();
        self.selected.retain(|hash| keep(hash));
        before - self.selected.len()
    }

    /// Deselect the given hashes (e.g. the ones a batch handled).
    pub fn deselect<'a, I>(&mut self, hashes: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let before = self.selected.len();
        for hash in hashes {
            self.selected.remove(hash);
        }
        before - self.selected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let mut selection = SelectionManager::new();
        assert!(selection.toggle("a"));
        assert!(selection.is_selected("a"));
        assert!(!selection.toggle("a"));
        assert!(!selection.is_selected("a"));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_select_all_replaces() {
        let mut selection = SelectionManager::new();
        selection.toggle("c");
        selection.select_all(["a", "b"]);
        assert_eq!(selection.len(), 2);
        assert!(selection.is_selected("a"));
        assert!(selection.is_selected("b"));
        assert!(!selection.is_selected("c"));
    }

    #[test]
    fn test_select_all_after_narrowing_drops_hidden() {
        let mut selection = SelectionManager::new();
        selection.select_all(["a", "b", "c"]);
        selection.select_all(["a"]);
        assert_eq!(&*selection.snapshot(), &["a".to_string()]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut selection = SelectionManager::new();
        selection.select_all(["b", "a"]);
        let snapshot = selection.snapshot();
        selection.clear();
        assert_eq!(&*snapshot, &["a".to_string(), "b".to_string()]);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_retain_reports_pruned() {
        let mut selection = SelectionManager::new();
        selection.select_all(["a", "b"]);
        let pruned = selection.retain(|h| h == "a");
        assert_eq!(pruned, 1);
        assert!(selection.is_selected("a"));
        assert!(!selection.is_selected("b"));
    }

    #[test]
    fn test_deselect() {
        let mut selection = SelectionManager::new();
        selection.select_all(["a", "b", "c"]);
        let removed = selection.deselect(["a", "c", "zz"]);
        assert_eq!(removed, 2);
        assert_eq!(&*selection.snapshot(), &["b".to_string()]);
    }
}
