//! The authoritative in-memory torrent map and its derived view.
//!
//! Only the reconciler mutates records. The ordered/filtered view is computed
//! lazily on first read after a change, so several snapshots landing between
//! two renders cost a single sort.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::types::{Category, Rid, ServerState, TorrentRecord, TorrentState};

/// Shared, immutable ordered view handed to renderers.
pub type TorrentView = Arc<[Arc<TorrentRecord>]>;

/// Status filter buckets offered by the torrent list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Downloading,
    Seeding,
    Completed,
    Paused,
    /// Moving data in either direction right now.
    Active,
    Inactive,
    Stalled,
    Checking,
    Errored,
}

impl StatusFilter {
    pub fn matches(&self, record: &TorrentRecord) -> bool {
        let transferring = record.download_speed > 0 || record.upload_speed > 0;
        match self {
            StatusFilter::All => true,
            StatusFilter::Downloading => record.state == TorrentState::Downloading,
            StatusFilter::Seeding => record.state == TorrentState::Seeding,
            StatusFilter::Completed => record.is_complete(),
            StatusFilter::Paused => record.state == TorrentState::Paused,
            StatusFilter::Active => transferring,
            StatusFilter::Inactive => !transferring,
            StatusFilter::Stalled => record.state == TorrentState::Stalled,
            StatusFilter::Checking => record.state == TorrentState::Checking,
            StatusFilter::Errored => record.state == TorrentState::Error,
        }
    }
}

/// Filters for the derived view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentFilter {
    pub status: StatusFilter,
    /// Exact category; `Some("")` selects uncategorized torrents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Case-insensitive substring of the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl TorrentFilter {
    /// Check if any filters are set.
    pub fn is_empty(&self) -> bool {
        self.status == StatusFilter::All
            && self.category.is_none()
            && self.tag.is_none()
            && self.search.as_deref().map_or(true, str::is_empty)
    }

    pub fn matches(&self, record: &TorrentRecord) -> bool {
        if !self.status.matches(record) {
            return false;
        }
        if let Some(category) = &self.category {
            if &record.category != category {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !record.has_tag(tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !search.is_empty() && !record.name.to_lowercase().contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Column the view is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Progress,
    State,
    DownloadSpeed,
    UploadSpeed,
    AddedOn,
    Ratio,
    Eta,
    Category,
}

impl SortKey {
    fn compare(&self, a: &TorrentRecord, b: &TorrentRecord) -> Ordering {
        match self {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Size => a.size_bytes.cmp(&b.size_bytes),
            SortKey::Progress => a.progress.total_cmp(&b.progress),
            SortKey::State => a.state.as_str().cmp(b.state.as_str()),
            SortKey::DownloadSpeed => a.download_speed.cmp(&b.download_speed),
            SortKey::UploadSpeed => a.upload_speed.cmp(&b.upload_speed),
            SortKey::AddedOn => a.added_at.cmp(&b.added_at),
            SortKey::Ratio => a.ratio.total_cmp(&b.ratio),
            SortKey::Eta => a.eta_secs.cmp(&b.eta_secs),
            SortKey::Category => a.category.cmp(&b.category),
        }
    }
}

/// Definition of the visible set: filter plus ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSpec {
    pub filter: TorrentFilter,
    pub sort: SortKey,
    pub descending: bool,
}

/// A slice of the derived view for windowed rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ViewWindow {
    pub revision: u64,
    pub total: usize,
    pub offset: usize,
    pub torrents: Vec<Arc<TorrentRecord>>,
}

/// Authoritative torrent map plus revision bookkeeping.
#[derive(Debug, Default)]
pub struct TorrentStore {
    records: HashMap<String, Arc<TorrentRecord>>,
    cursor: Option<Rid>,
    categories: BTreeMap<String, Category>,
    tags: BTreeSet<String>,
    server_state: ServerState,
    revision: u64,
    view_spec: ViewSpec,
    view: OnceLock<TorrentView>,
}

impl TorrentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied cursor; `None` until a full snapshot lands.
    pub fn cursor(&self) -> Option<Rid> {
        self.cursor
    }

    /// Number of completed reconciliations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.records.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<Arc<TorrentRecord>> {
        self.records.get(hash).cloned()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn categories(&self) -> &BTreeMap<String, Category> {
        &self.categories
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn server_state(&self) -> &ServerState {
        &self.server_state
    }

    pub fn view_spec(&self) -> &ViewSpec {
        &self.view_spec
    }

    /// Replace the view definition. The caller prunes the selection against
    /// the new visible set.
    pub fn set_view_spec(&mut self, spec: ViewSpec) {
        if self.view_spec != spec {
            self.view_spec = spec;
            self.view = OnceLock::new();
        }
    }

    /// Ordered, filtered records under the current view spec.
    pub fn view(&self) -> TorrentView {
        self.view.get_or_init(|| self.compute_view()).clone()
    }

    /// Hashes of the visible records, in view order.
    pub fn visible_hashes(&self) -> Vec<String> {
        self.view().iter().map(|r| r.hash.clone()).collect()
    }

    /// A window of the view, clamped to its bounds.
    pub fn window(&self, offset: usize, limit: usize) -> ViewWindow {
        let view = self.view();
        let start = offset.min(view.len());
        let end = start.saturating_add(limit).min(view.len());
        ViewWindow {
            revision: self.revision,
            total: view.len(),
            offset: start,
            torrents: view[start..end].to_vec(),
        }
    }

    fn compute_view(&self) -> TorrentView {
        let spec = &self.view_spec;
        let mut rows: Vec<Arc<TorrentRecord>> = self
            .records
            .values()
            .filter(|r| spec.filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let ord = spec.sort.compare(a, b);
            let ord = if spec.descending { ord.reverse() } else { ord };
            ord.then_with(|| a.hash.cmp(&b.hash))
        });
        rows.into()
    }

    /// Forget the cursor so the next poll asks for a full snapshot.
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    // Mutators below are reserved for the reconciler.

    pub(crate) fn records_mut(&mut self) -> &mut HashMap<String, Arc<TorrentRecord>> {
        &mut self.records
    }

    pub(crate) fn replace_records(&mut self, records: HashMap<String, Arc<TorrentRecord>>) {
        self.records = records;
    }

    pub(crate) fn categories_mut(&mut self) -> &mut BTreeMap<String, Category> {
        &mut self.categories
    }

    pub(crate) fn tags_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.tags
    }

    pub(crate) fn server_state_mut(&mut self) -> &mut ServerState {
        &mut self.server_state
    }

    /// Close a reconciliation: record the cursor, bump the revision and drop
    /// the cached view.
    pub(crate) fn commit(&mut self, cursor: Rid) {
        self.cursor = Some(cursor);
        self.revision += 1;
        self.view = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::TorrentPatch;

    fn insert(store: &mut TorrentStore, hash: &str, patch: TorrentPatch) {
        store
            .records_mut()
            .insert(hash.to_string(), Arc::new(TorrentRecord::from_patch(hash, &patch)));
    }

    fn named(name: &str, state: &str, size: i64) -> TorrentPatch {
        TorrentPatch {
            name: Some(name.to_string()),
            state: Some(state.to_string()),
            size: Some(size),
            ..Default::default()
        }
    }

    fn populated() -> TorrentStore {
        let mut store = TorrentStore::new();
        insert(&mut store, "c", named("charlie", "downloading", 30));
        insert(&mut store, "a", named("Alpha", "pausedDL", 10));
        insert(&mut store, "b", named("bravo", "uploading", 20));
        store.commit(Rid(1));
        store
    }

    #[test]
    fn test_view_sorted_by_name_case_insensitive() {
        let store = populated();
        assert_eq!(store.visible_hashes(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_view_descending_size() {
        let mut store = populated();
        store.set_view_spec(ViewSpec {
            sort: SortKey::Size,
            descending: true,
            ..Default::default()
        });
        assert_eq!(store.visible_hashes(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_view_ties_broken_by_hash() {
        let mut store = TorrentStore::new();
        insert(&mut store, "z", named("same", "downloading", 1));
        insert(&mut store, "y", named("same", "downloading", 1));
        store.commit(Rid(1));
        assert_eq!(store.visible_hashes(), vec!["y", "z"]);
    }

    #[test]
    fn test_view_filters() {
        let mut store = populated();
        store.set_view_spec(ViewSpec {
            filter: TorrentFilter {
                status: StatusFilter::Paused,
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(store.visible_hashes(), vec!["a"]);

        store.set_view_spec(ViewSpec {
            filter: TorrentFilter {
                search: Some("RAV".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(store.visible_hashes(), vec!["b"]);
    }

    #[test]
    fn test_view_is_cached_until_commit() {
        let mut store = populated();
        let first = store.view();
        let second = store.view();
        assert!(Arc::ptr_eq(&first, &second));

        store.commit(Rid(2));
        let third = store.view();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_window_clamps() {
        let store = populated();
        let window = store.window(1, 10);
        assert_eq!(window.total, 3);
        assert_eq!(window.offset, 1);
        assert_eq!(window.torrents.len(), 2);
        assert_eq!(window.revision, 1);

        let past_end = store.window(10, 5);
        assert_eq!(past_end.offset, 3);
        assert!(past_end.torrents.is_empty());
    }

    #[test]
    fn test_filter_is_empty() {
        assert!(TorrentFilter::default().is_empty());
        let filter = TorrentFilter {
            category: Some("tv".to_string()),
            ..Default::default()
        };
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_uncategorized_filter() {
        let mut store = populated();
        insert(
            &mut store,
            "d",
            TorrentPatch {
                name: Some("delta".to_string()),
                category: Some("tv".to_string()),
                ..Default::default()
            },
        );
        store.commit(Rid(2));
        store.set_view_spec(ViewSpec {
            filter: TorrentFilter {
                category: Some(String::new()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(store.visible_hashes(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reset_cursor() {
        let mut store = populated();
        assert_eq!(store.cursor(), Some(Rid(1)));
        store.reset_cursor();
        assert_eq!(store.cursor(), None);
        assert_eq!(store.len(), 3);
    }
}
