//! Collaborator seams: the auth oracle, the document store, and the
//! [`Subscription`] guard both of them hand back.
//!
//! Both collaborators are push-based. A listener is registered once and
//! invoked with every change; the returned [`Subscription`] unregisters it.
//! Listeners inside the core never do work themselves; they forward a
//! [`CoreEvent`](crate::CoreEvent) into the core's queue.

use std::fmt;

use nurture_types::{Document, Identity};
use thiserror::Error;
use tracing::trace;

/// Callback registered with a collaborator.
pub type Listener<T> = Box<dyn FnMut(T) + Send + 'static>;

/// What a store watch delivers: a full ordered result set, or an error.
pub type SnapshotResult = Result<Vec<Document>, StoreError>;

// ============================================================================
// Subscription guard
// ============================================================================

/// Scoped ownership of one collaborator registration.
///
/// Releasing runs the collaborator's unsubscribe exactly once; further calls
/// are no-ops. Dropping the guard releases it, so a registration never
/// outlives its owner, including when a panic unwinds through the owner.
#[must_use = "dropping a Subscription releases it immediately"]
pub struct Subscription {
    label: String,
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    /// Wrap an unsubscribe callback.
    pub fn new(label: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            release: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the unsubscribe callback has yet to run.
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Unregister. Idempotent.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            trace!(subscription = %self.label, "releasing subscription");
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Slash-separated collection address, e.g. `babies/b1/routineLogs`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// A subcollection under document `doc_id` of this collection.
    pub fn child(&self, doc_id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(doc_id.into());
        segments.push(name.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A live query: one collection, an optional equality filter, one sort field.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filter: Option<FieldFilter>,
    pub order_by: OrderBy,
}

impl Query {
    pub fn new(collection: CollectionPath, order_field: impl Into<String>, direction: Direction) -> Self {
        Self {
            collection,
            filter: None,
            order_by: OrderBy {
                field: order_field.into(),
                direction,
            },
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Errors reported by the document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied on {0}")]
    PermissionDenied(String),
    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: String },
    #[error("store error: {0}")]
    Failed(String),
}

/// The external authentication service.
///
/// Reports "current identity or none" on every change. Sign-in, sign-out and
/// token refresh are indistinguishable. There is no error channel.
pub trait AuthOracle: Send + Sync {
    fn on_identity_changed(&self, listener: Listener<Option<Identity>>) -> Subscription;
}

/// The hosted document store.
pub trait DocumentStore: Send + Sync {
    /// Open a live query. The listener receives the complete ordered result
    /// set on every change, or an error.
    fn watch(&self, query: Query, listener: Listener<SnapshotResult>) -> Subscription;

    /// Create a document, returning its id. Fields named after a server
    /// timestamp should be `null`; the store assigns them.
    fn add(
        &self,
        collection: &CollectionPath,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError>;

    /// Delete a document.
    fn remove(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Subscription {
        let c = counter.clone();
        Subscription::new("test", move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_release_is_idempotent() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut sub = counting(&released);
        assert!(sub.is_active());
        sub.release();
        sub.release();
        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let _sub = counting(&released);
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let released = Arc::new(AtomicUsize::new(0));
        let r = released.clone();
        let result = std::panic::catch_unwind(move || {
            let _sub = counting(&r);
            panic!("listener blew up");
        });
        assert!(result.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collection_path_display() {
        let path = CollectionPath::root("babies").child("b1", "healthLogs");
        assert_eq!(path.to_string(), "babies/b1/healthLogs");
        assert_eq!(path.segments().len(), 3);
    }

    #[test]
    fn test_query_builder() {
        let q = Query::new(CollectionPath::root("babies"), "createdAt", Direction::Ascending)
            .where_eq("userId", "u1");
        let filter = q.filter.unwrap();
        assert_eq!(filter.field, "userId");
        assert_eq!(filter.value, serde_json::json!("u1"));
    }
}
