//! nurture sync core
//!
//! Keeps a UI-facing view of "who is signed in, which children they track,
//! which child is selected, and what has been logged for it" consistent with
//! two push-based collaborators: an [`AuthOracle`] and a [`DocumentStore`].
//!
//! All collaborator callbacks are forwarded into one event queue and applied
//! in order by [`Core`], which cascades each change through:
//!
//! ```text
//! SessionTracker ─► ProfileSetSynchronizer ─► TimelineAggregator
//!        └────────────────┴──────► NavigationDriver
//! ```
//!
//! State is observed through `tokio::sync::watch` receivers handed out by
//! [`CoreHandle`]. Nothing is polled and nothing is pushed back to the
//! collaborators except subscription opens and releases.

pub mod commands;
pub mod config;
pub mod constants;
pub mod engine;
pub mod memory;
pub mod navigation;
pub mod profiles;
pub mod session;
pub mod store;
pub mod timeline;

pub use commands::{
    CommandError, LogDraft, ProfileDraft, add_log, add_profile, remove_log, remove_profile,
};
pub use config::{ConfigError, CoreConfig};
pub use engine::{Core, CoreError, CoreEvent, CoreHandle, spawn_core};
pub use memory::{MemoryOracle, MemoryStore, WatchEvent};
pub use navigation::{NavigationDriver, NavigationInputs, NavigationState, resolve};
pub use profiles::{ProfileSetSynchronizer, ProfileSetView, SelectError};
pub use session::{SessionState, SessionTracker};
pub use store::{
    AuthOracle, CollectionPath, Direction, DocumentStore, Listener, Query, SnapshotResult,
    StoreError, Subscription,
};
pub use timeline::{TimelineAggregator, TimelineView, merge_partitions};
