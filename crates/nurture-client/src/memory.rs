//! In-memory collaborators.
//!
//! [`MemoryOracle`] and [`MemoryStore`] implement the collaborator traits
//! without any network. They deliver synchronously on the caller's thread,
//! keep a journal of watch open/release calls, and count outstanding
//! registrations, which makes them the test doubles for the core as well as
//! the backend of the replay harness.
//!
//! The store mimics a hosted document database closely enough for the core:
//! equality filter plus one sort field, full result sets on every change, and
//! server timestamps that land after the write is already visible.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use nurture_types::{Document, Identity};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::constants::CREATED_AT_FIELD;
use crate::store::{
    AuthOracle, CollectionPath, Direction, DocumentStore, Listener, Query, SnapshotResult,
    StoreError, Subscription,
};

type SharedListener<T> = Arc<Mutex<Listener<T>>>;

// ============================================================================
// MemoryOracle
// ============================================================================

#[derive(Default)]
struct OracleState {
    /// None until the first sign-in/sign-out.
    current: Option<Option<Identity>>,
    listeners: BTreeMap<u64, SharedListener<Option<Identity>>>,
    next_id: u64,
}

/// An auth oracle driven by explicit calls.
///
/// Starts unresolved: listeners registered before the first
/// [`sign_in`](Self::sign_in)/[`sign_out`](Self::sign_out) hear nothing until
/// then. Listeners registered afterwards get the current state immediately.
#[derive(Clone, Default)]
pub struct MemoryOracle {
    inner: Arc<Mutex<OracleState>>,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle that has already resolved to `identity`.
    pub fn signed_in(identity: &str) -> Self {
        let oracle = Self::new();
        oracle.sign_in(identity);
        oracle
    }

    pub fn sign_in(&self, identity: &str) {
        self.emit(Some(Identity::new(identity)));
    }

    pub fn sign_out(&self) {
        self.emit(None);
    }

    /// Re-report the current state, as a token refresh would.
    pub fn refresh(&self) {
        let current = self.inner.lock().current.clone();
        if let Some(current) = current {
            self.emit(current);
        }
    }

    /// Registrations not yet released.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    fn emit(&self, identity: Option<Identity>) {
        let listeners: Vec<_> = {
            let mut state = self.inner.lock();
            state.current = Some(identity.clone());
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            (listener.lock())(identity.clone());
        }
    }
}

impl AuthOracle for MemoryOracle {
    fn on_identity_changed(&self, listener: Listener<Option<Identity>>) -> Subscription {
        let listener = Arc::new(Mutex::new(listener));
        let (id, current) = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.insert(id, listener.clone());
            (id, state.current.clone())
        };
        if let Some(current) = current {
            (listener.lock())(current);
        }

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(format!("auth#{id}"), move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock().listeners.remove(&id);
            }
        })
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// One entry in the watch journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    Opened(String),
    Released(String),
}

struct Watcher {
    query: Query,
    listener: SharedListener<SnapshotResult>,
}

#[derive(Default)]
struct StoreState {
    /// Documents per collection, in insertion order.
    collections: HashMap<CollectionPath, Vec<Document>>,
    watchers: BTreeMap<u64, Watcher>,
    journal: Vec<WatchEvent>,
    next_watch: u64,
    next_doc: u64,
    /// Server clock (Unix millis) used to stamp pending timestamps.
    clock: u64,
    /// Leave pending timestamps for [`MemoryStore::resolve_pending`].
    manual_timestamps: bool,
    /// Field receiving server timestamps; `createdAt` when unset.
    timestamp_field: Option<String>,
}

impl StoreState {
    fn timestamp_field(&self) -> &str {
        self.timestamp_field.as_deref().unwrap_or(CREATED_AT_FIELD)
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| match &query.filter {
                        Some(f) => d.data.get(&f.field) == Some(&f.value),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Pending timestamps are estimated as "now", i.e. newest.
        let key = |d: &Document| {
            d.data
                .get(&query.order_by.field)
                .and_then(|v| v.as_f64())
                .unwrap_or(f64::INFINITY)
        };
        docs.sort_by(|a, b| {
            let ord = key(a).total_cmp(&key(b));
            match query.order_by.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
        docs
    }

    /// Listeners watching `collection`, each with its fresh result set.
    fn deliveries(&self, collection: &CollectionPath) -> Vec<(SharedListener<SnapshotResult>, Vec<Document>)> {
        self.watchers
            .values()
            .filter(|w| &w.query.collection == collection)
            .map(|w| (w.listener.clone(), self.snapshot(&w.query)))
            .collect()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// A document store held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose server timestamps only land on
    /// [`resolve_pending`](Self::resolve_pending).
    pub fn with_manual_timestamps() -> Self {
        let store = Self::new();
        store.inner.lock().manual_timestamps = true;
        store
    }

    /// Stamp server timestamps into `field` instead of `createdAt`.
    pub fn with_timestamp_field(self, field: impl Into<String>) -> Self {
        self.inner.lock().timestamp_field = Some(field.into());
        self
    }

    /// Set the server clock (Unix millis).
    pub fn set_clock(&self, millis: u64) {
        self.inner.lock().clock = millis;
    }

    /// Insert or replace a document with an explicit id.
    pub fn put(&self, collection: &CollectionPath, id: &str, data: serde_json::Value) {
        let deliveries = {
            let mut state = self.inner.lock();
            let docs = state.collections.entry(collection.clone()).or_default();
            match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => existing.data = data,
                None => docs.push(Document::new(id, data)),
            }
            state.deliveries(collection)
        };
        trace!(%collection, id, "MemoryStore: put");
        deliver(deliveries);
    }

    /// Stamp every pending server timestamp in `collection` and notify watchers.
    pub fn resolve_pending(&self, collection: &CollectionPath) -> usize {
        let (stamped, deliveries) = {
            let mut state = self.inner.lock();
            let field = state.timestamp_field().to_string();
            let pending: Vec<usize> = state
                .collections
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .enumerate()
                        .filter(|(_, d)| {
                            d.data
                                .get(&field)
                                .is_none_or(|v| v.is_null())
                        })
                        .map(|(i, _)| i)
                        .collect()
                })
                .unwrap_or_default();
            for i in &pending {
                let now = state.tick();
                if let Some(doc) = state.collections.get_mut(collection).and_then(|d| d.get_mut(*i)) {
                    doc.data[field.as_str()] = serde_json::json!(now);
                }
            }
            let deliveries = if pending.is_empty() {
                Vec::new()
            } else {
                state.deliveries(collection)
            };
            (pending.len(), deliveries)
        };
        deliver(deliveries);
        stamped
    }

    /// Push an error to every watcher of `collection`.
    pub fn inject_error(&self, collection: &CollectionPath, error: StoreError) {
        let listeners: Vec<_> = {
            let state = self.inner.lock();
            state
                .watchers
                .values()
                .filter(|w| &w.query.collection == collection)
                .map(|w| w.listener.clone())
                .collect()
        };
        debug!(%collection, "MemoryStore: injecting error: {error}");
        for listener in listeners {
            (listener.lock())(Err(error.clone()));
        }
    }

    /// Current documents of a collection, in insertion order.
    pub fn documents(&self, collection: &CollectionPath) -> Vec<Document> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Watches opened and not yet released.
    pub fn open_watches(&self) -> usize {
        self.inner.lock().watchers.len()
    }

    /// Every watch open/release, in order.
    pub fn journal(&self) -> Vec<WatchEvent> {
        self.inner.lock().journal.clone()
    }
}

fn deliver(deliveries: Vec<(SharedListener<SnapshotResult>, Vec<Document>)>) {
    for (listener, docs) in deliveries {
        (listener.lock())(Ok(docs));
    }
}

impl DocumentStore for MemoryStore {
    fn watch(&self, query: Query, listener: Listener<SnapshotResult>) -> Subscription {
        let listener = Arc::new(Mutex::new(listener));
        let label = query.collection.to_string();
        let (id, initial) = {
            let mut state = self.inner.lock();
            let id = state.next_watch;
            state.next_watch += 1;
            state.journal.push(WatchEvent::Opened(label.clone()));
            let initial = state.snapshot(&query);
            state.watchers.insert(
                id,
                Watcher {
                    query,
                    listener: listener.clone(),
                },
            );
            (id, initial)
        };
        (listener.lock())(Ok(initial));

        let inner = Arc::downgrade(&self.inner);
        let path = label.clone();
        Subscription::new(format!("watch#{id} {label}"), move || {
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.lock();
                if state.watchers.remove(&id).is_some() {
                    state.journal.push(WatchEvent::Released(path));
                }
            }
        })
    }

    fn add(
        &self,
        collection: &CollectionPath,
        mut fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        let (id, manual) = {
            let mut state = self.inner.lock();
            fields.insert(state.timestamp_field().to_string(), serde_json::Value::Null);
            state.next_doc += 1;
            (format!("doc{:04}", state.next_doc), state.manual_timestamps)
        };
        // Visible first with a pending timestamp, then stamped.
        self.put(collection, &id, serde_json::Value::Object(fields));
        if !manual {
            self.resolve_pending(collection);
        }
        Ok(id)
    }

    fn remove(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let deliveries = {
            let mut state = self.inner.lock();
            let docs = state.collections.get_mut(collection).ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
            let before = docs.len();
            docs.retain(|d| d.id != id);
            if docs.len() == before {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            state.deliveries(collection)
        };
        deliver(deliveries);
        Ok(())
    }
}
