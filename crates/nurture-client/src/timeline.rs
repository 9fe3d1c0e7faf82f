//! Per-profile timeline: three category feeds merged into one ordering.
//!
//! Each category has its own watch and owns one partition of the timeline.
//! An update replaces only that category's partition; the merged view is then
//! rebuilt by concatenating all partitions and sorting newest first. Entries
//! are shared as `Arc`s, so entries in untouched partitions keep their
//! identity across merges.
//!
//! ```text
//!  developmentLogs ──▶ partition[0] ─┐
//!  routineLogs     ──▶ partition[1] ─┼─▶ concat ─▶ stable sort by created_at desc
//!  healthLogs      ──▶ partition[2] ─┘              (pending sorts as 0, last)
//! ```

use std::sync::Arc;

use nurture_types::{Category, LogEntry, ProfileId};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::CoreConfig;
use crate::engine::{CoreEvent, EventSender};
use crate::store::{DocumentStore, SnapshotResult, Subscription};

/// Published timeline state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimelineView {
    /// The profile these entries belong to.
    pub profile: Option<ProfileId>,
    /// Newest first; pending timestamps last.
    pub entries: Vec<Arc<LogEntry>>,
    pub loading: bool,
}

/// Merge partitions into one newest-first sequence.
///
/// The sort is stable: entries with equal keys keep partition order, then
/// their order within the partition.
pub fn merge_partitions<'a>(
    partitions: impl IntoIterator<Item = &'a [Arc<LogEntry>]>,
) -> Vec<Arc<LogEntry>> {
    let mut merged: Vec<Arc<LogEntry>> = partitions
        .into_iter()
        .flat_map(|p| p.iter().cloned())
        .collect();
    merged.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    merged
}

#[derive(Debug, Default)]
struct Partition {
    entries: Vec<Arc<LogEntry>>,
    /// Whether this feed has delivered anything (snapshot or error) since
    /// the current selection was opened.
    received: bool,
}

pub struct TimelineAggregator {
    store: Arc<dyn DocumentStore>,
    config: Arc<CoreConfig>,
    events: EventSender,
    profile: Option<ProfileId>,
    /// Bumped on every selection change; category snapshots tagged with an
    /// older generation are discarded.
    generation: u64,
    partitions: [Partition; 3],
    subscriptions: Vec<Subscription>,
    entries: Vec<Arc<LogEntry>>,
    state_tx: watch::Sender<TimelineView>,
}

impl TimelineAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<CoreConfig>, events: EventSender) -> Self {
        let (state_tx, _) = watch::channel(TimelineView::default());
        Self {
            store,
            config,
            events,
            profile: None,
            generation: 0,
            partitions: Default::default(),
            subscriptions: Vec::new(),
            entries: Vec::new(),
            state_tx,
        }
    }

    /// React to a selection change.
    ///
    /// All watches for the previous profile are released before any watch
    /// for the new one is opened. Re-selecting the same id is a no-op.
    pub fn on_selection(&mut self, profile: Option<&ProfileId>) {
        if self.profile.as_ref() == profile {
            return;
        }

        self.release();
        self.generation += 1;
        self.partitions = Default::default();
        self.entries.clear();
        self.profile = profile.cloned();

        if let Some(id) = profile {
            info!(profile = %id, "TimelineAggregator: watching category feeds");
            for category in Category::ALL {
                self.open(id, category);
            }
        } else {
            debug!("TimelineAggregator: no selection, timeline cleared");
        }
        self.publish();
    }

    /// Apply one category feed delivery.
    ///
    /// Returns false if the delivery belonged to a released watch.
    pub fn apply_partition(
        &mut self,
        generation: u64,
        category: Category,
        result: SnapshotResult,
    ) -> bool {
        if generation != self.generation || self.profile.is_none() {
            trace!(
                %category,
                generation,
                current = self.generation,
                "TimelineAggregator: discarding stale delivery"
            );
            return false;
        }

        let config = self.config.clone();
        let partition = &mut self.partitions[category.index()];
        partition.received = true;
        match result {
            Ok(docs) => {
                partition.entries = docs
                    .iter()
                    .map(|doc| LogEntry::from_document(category, &config.canonical_document(doc)))
                    .filter_map(|decoded| match decoded {
                        Ok(entry) => Some(Arc::new(entry)),
                        Err(e) => {
                            warn!(%category, "TimelineAggregator: dropping invalid entry: {e}");
                            None
                        }
                    })
                    .collect();
                debug!(
                    %category,
                    count = partition.entries.len(),
                    "TimelineAggregator: partition replaced"
                );
            }
            Err(e) => {
                // Keep the last known partition so other categories stay intact.
                error!(%category, "TimelineAggregator: error fetching {}: {e}", category.collection_name());
            }
        }

        self.entries = merge_partitions(self.partitions.iter().map(|p| p.entries.as_slice()));
        self.publish();
        true
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    pub fn entries(&self) -> &[Arc<LogEntry>] {
        &self.entries
    }

    /// Entries currently held for one category.
    pub fn partition(&self, category: Category) -> &[Arc<LogEntry>] {
        &self.partitions[category.index()].entries
    }

    pub fn profile(&self) -> Option<&ProfileId> {
        self.profile.as_ref()
    }

    /// True until every open feed has delivered once.
    pub fn is_loading(&self) -> bool {
        self.profile.is_some() && !self.partitions.iter().all(|p| p.received)
    }

    pub fn view(&self) -> TimelineView {
        TimelineView {
            profile: self.profile.clone(),
            entries: self.entries.clone(),
            loading: self.is_loading(),
        }
    }

    pub fn observe(&self) -> watch::Receiver<TimelineView> {
        self.state_tx.subscribe()
    }

    /// Number of category watches currently held.
    pub fn open_feeds(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }

    /// Release every feed. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.release();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn open(&mut self, profile: &ProfileId, category: Category) {
        let generation = self.generation;
        let events = self.events.clone();
        let subscription = self.store.watch(
            self.config.category_query(profile, category),
            Box::new(move |result| {
                let event = CoreEvent::CategorySnapshot {
                    generation,
                    category,
                    result,
                };
                if events.send(event).is_err() {
                    trace!(%category, generation, "TimelineAggregator: core gone, dropping delivery");
                }
            }),
        );
        self.subscriptions.push(subscription);
    }

    fn release(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        debug!(
            count = self.subscriptions.len(),
            "TimelineAggregator: cleaning up category feeds"
        );
        for mut sub in self.subscriptions.drain(..) {
            sub.release();
        }
    }

    fn publish(&self) {
        let view = self.view();
        self.state_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, WatchEvent};
    use crate::store::StoreError;
    use nurture_types::{DevelopmentLog, Document, LogId, LogKind, Measure, OrderingKey};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn entry(id: &str, created: OrderingKey) -> Arc<LogEntry> {
        Arc::new(LogEntry {
            id: LogId::new(id),
            kind: LogKind::Development(DevelopmentLog {
                measure: Measure::Weight,
                value: 4.0,
            }),
            notes: None,
            created_at: created,
        })
    }

    fn at(id: &str, t: u64) -> Arc<LogEntry> {
        entry(id, OrderingKey::Resolved(t))
    }

    fn keys(entries: &[Arc<LogEntry>]) -> Vec<u64> {
        entries.iter().map(|e| e.sort_key()).collect()
    }

    // =========================================================================
    // Merge
    // =========================================================================

    #[test]
    fn test_merge_descending() {
        let a = vec![at("a5", 5), at("a3", 3)];
        let b = vec![at("b4", 4)];
        let c = vec![at("c1", 1)];
        let merged = merge_partitions([a.as_slice(), b.as_slice(), c.as_slice()]);
        assert_eq!(keys(&merged), vec![5, 4, 3, 1]);
    }

    #[test]
    fn test_merge_replacing_one_partition_keeps_others() {
        let a = vec![at("a5", 5), at("a3", 3)];
        let b = vec![at("b4", 4)];
        let c = vec![at("c9", 9)];
        let merged = merge_partitions([a.as_slice(), b.as_slice(), c.as_slice()]);
        assert_eq!(keys(&merged), vec![9, 5, 4, 3]);
        assert!(Arc::ptr_eq(&merged[1], &a[0]));
        assert!(Arc::ptr_eq(&merged[2], &b[0]));
        assert!(Arc::ptr_eq(&merged[3], &a[1]));
    }

    #[test]
    fn test_merge_pending_sorts_last() {
        let a = vec![entry("pending", OrderingKey::Pending), at("a2", 2)];
        let b = vec![at("b7", 7)];
        let merged = merge_partitions([a.as_slice(), b.as_slice()]);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b7", "a2", "pending"]);
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge_partitions(std::iter::empty::<&[Arc<LogEntry>]>());
        assert!(merged.is_empty());
    }

    // =========================================================================
    // Aggregator
    // =========================================================================

    struct Harness {
        store: MemoryStore,
        agg: TimelineAggregator,
        rx: mpsc::UnboundedReceiver<CoreEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let store = MemoryStore::new();
            let (tx, rx) = mpsc::unbounded_channel();
            let agg = TimelineAggregator::new(
                Arc::new(store.clone()),
                Arc::new(CoreConfig::default()),
                tx,
            );
            Self { store, agg, rx }
        }

        fn drain(&mut self) {
            while let Ok(event) = self.rx.try_recv() {
                if let CoreEvent::CategorySnapshot {
                    generation,
                    category,
                    result,
                } = event
                {
                    self.agg.apply_partition(generation, category, result);
                }
            }
        }
    }

    fn log_doc(id: &str, created: u64) -> Document {
        Document::new(id, json!({"type": "weight", "value": 3.5, "createdAt": created}))
    }

    fn routine_doc(id: &str, created: u64) -> Document {
        Document::new(id, json!({"type": "feeding", "createdAt": created}))
    }

    fn health_doc(id: &str, created: u64) -> Document {
        Document::new(
            id,
            json!({"type": "vaccination", "eventName": "BCG", "eventDate": "2024-02-01", "createdAt": created}),
        )
    }

    #[test]
    fn test_no_selection_no_feeds() {
        let mut h = Harness::new();
        h.agg.on_selection(None);
        assert_eq!(h.store.open_watches(), 0);
        assert!(!h.agg.is_loading());
    }

    #[test]
    fn test_one_feed_per_category() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("b1")));
        assert_eq!(h.store.open_watches(), 3);
        assert_eq!(h.agg.open_feeds(), 3);
        assert!(h.agg.is_loading());
    }

    #[test]
    fn test_loading_until_every_feed_delivers() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("b1")));
        let g = h.agg.generation;
        h.agg
            .apply_partition(g, Category::Development, Ok(vec![log_doc("d1", 1)]));
        h.agg.apply_partition(g, Category::Routine, Ok(vec![]));
        assert!(h.agg.is_loading());
        h.agg.apply_partition(
            g,
            Category::Health,
            Err(StoreError::Unavailable("offline".into())),
        );
        assert!(!h.agg.is_loading());
    }

    #[test]
    fn test_partition_update_rebuilds_merge() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("b1")));
        let g = h.agg.generation;
        h.agg.apply_partition(
            g,
            Category::Development,
            Ok(vec![log_doc("d5", 5), log_doc("d3", 3)]),
        );
        h.agg
            .apply_partition(g, Category::Routine, Ok(vec![routine_doc("r4", 4)]));
        h.agg
            .apply_partition(g, Category::Health, Ok(vec![health_doc("h1", 1)]));
        assert_eq!(keys(h.agg.entries()), vec![5, 4, 3, 1]);

        let before = h.agg.partition(Category::Development).to_vec();
        let routine_before = h.agg.partition(Category::Routine).to_vec();
        h.agg
            .apply_partition(g, Category::Health, Ok(vec![health_doc("h9", 9)]));
        assert_eq!(keys(h.agg.entries()), vec![9, 5, 4, 3]);
        assert!(Arc::ptr_eq(&h.agg.partition(Category::Development)[0], &before[0]));
        assert!(Arc::ptr_eq(&h.agg.partition(Category::Routine)[0], &routine_before[0]));
        assert!(Arc::ptr_eq(&h.agg.entries()[1], &before[0]));
    }

    #[test]
    fn test_category_error_keeps_last_known() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("b1")));
        let g = h.agg.generation;
        h.agg
            .apply_partition(g, Category::Development, Ok(vec![log_doc("d5", 5)]));
        h.agg
            .apply_partition(g, Category::Routine, Ok(vec![routine_doc("r4", 4)]));
        h.agg.apply_partition(
            g,
            Category::Routine,
            Err(StoreError::PermissionDenied("routineLogs".into())),
        );
        assert_eq!(keys(h.agg.entries()), vec![5, 4]);
    }

    #[test]
    fn test_invalid_entries_dropped() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("b1")));
        let g = h.agg.generation;
        h.agg.apply_partition(
            g,
            Category::Development,
            Ok(vec![
                log_doc("d5", 5),
                Document::new("bad", json!({"type": "sleep", "createdAt": 6})),
            ]),
        );
        assert_eq!(h.agg.entries().len(), 1);
    }

    #[test]
    fn test_switch_releases_before_opening() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("a")));
        h.agg.on_selection(Some(&ProfileId::new("b")));
        assert_eq!(h.store.open_watches(), 3);

        let journal = h.store.journal();
        let last_release_of_a = journal
            .iter()
            .rposition(|e| matches!(e, WatchEvent::Released(p) if p.starts_with("babies/a/")))
            .unwrap();
        let first_open_of_b = journal
            .iter()
            .position(|e| matches!(e, WatchEvent::Opened(p) if p.starts_with("babies/b/")))
            .unwrap();
        assert!(last_release_of_a < first_open_of_b);
        let released_a = journal
            .iter()
            .filter(|e| matches!(e, WatchEvent::Released(p) if p.starts_with("babies/a/")))
            .count();
        assert_eq!(released_a, 3);
    }

    #[test]
    fn test_stale_delivery_after_switch_ignored() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("a")));
        let old = h.agg.generation;
        h.agg.on_selection(Some(&ProfileId::new("b")));
        assert!(!h.agg.apply_partition(
            old,
            Category::Development,
            Ok(vec![log_doc("d5", 5)])
        ));
        assert!(h.agg.entries().is_empty());
    }

    #[test]
    fn test_clear_selection_releases_all() {
        let mut h = Harness::new();
        h.agg.on_selection(Some(&ProfileId::new("a")));
        h.drain();
        h.agg.on_selection(None);
        assert_eq!(h.store.open_watches(), 0);
        assert!(h.agg.entries().is_empty());
        assert!(!h.agg.is_loading());
    }

    #[test]
    fn test_reselect_same_profile_keeps_feeds() {
        let mut h = Harness::new();
        let id = ProfileId::new("a");
        h.agg.on_selection(Some(&id));
        let g = h.agg.generation;
        h.agg.on_selection(Some(&id));
        assert_eq!(h.agg.generation, g);
        assert_eq!(h.store.journal().len(), 3);
    }

    #[test]
    fn test_live_store_feeds() {
        let mut h = Harness::new();
        let config = CoreConfig::default();
        let id = ProfileId::new("b1");
        h.agg.on_selection(Some(&id));
        h.drain();
        assert!(!h.agg.is_loading());

        h.store.put(
            &config.logs_path(&id, Category::Development),
            "d1",
            json!({"type": "height", "value": 52.0, "createdAt": 30}),
        );
        h.store.put(
            &config.logs_path(&id, Category::Routine),
            "r1",
            json!({"type": "diaper", "createdAt": 40}),
        );
        h.drain();
        let ids: Vec<_> = h.agg.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "d1"]);
    }
}
