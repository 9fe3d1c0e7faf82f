//! Core configuration constants.
//!
//! Defaults for [`CoreConfig`](crate::CoreConfig); every value here can be
//! overridden from a config file.

/// Top-level collection holding profile documents.
pub const PROFILES_COLLECTION: &str = "babies";

/// Profile field naming the owning identity.
pub const OWNER_FIELD: &str = "userId";

/// Server-assigned creation timestamp field, shared by profiles and logs.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Buffered navigation transitions per receiver before it starts lagging.
pub const TRANSITION_CHANNEL_CAPACITY: usize = 16;
