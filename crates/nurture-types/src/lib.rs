//! Shared data model for nurture.
//!
//! This crate is the leaf of the workspace: typed ids, profiles, log entries,
//! and the server-assigned ordering key. It has **no internal nurture
//! dependencies** and knows nothing about subscriptions.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Identity ← the signed-in user, reported by the auth oracle
//!     └── owns Profile (ProfileId, ordered by created_at ascending)
//!             └── has LogEntry per Category (LogId, ordered by created_at descending)
//!                     ├── developmentLogs
//!                     ├── routineLogs
//!                     └── healthLogs
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`Identity`]      | Who is signed in                             |
//! | [`Profile`]       | A tracked child (owner + name + birth date)  |
//! | [`LogEntry`]      | One recorded event, payload tagged by kind   |
//! | [`Category`]      | Which feed an entry belongs to               |
//! | [`OrderingKey`]   | Server timestamp, possibly still pending     |
//! | [`Document`]      | Raw store document before validation         |
//! |-------------------|----------------------------------------------|

pub mod document;
pub mod error;
pub mod ids;
pub mod log;
pub mod ordering;
pub mod profile;

pub use document::Document;
pub use error::IngestError;
pub use ids::{Identity, LogId, PrefixError, ProfileId, resolve_profile_prefix};
pub use log::{
    Category, DevelopmentLog, HealthEvent, HealthLog, LogEntry, LogKind, Measure, RoutineActivity,
    RoutineLog,
};
pub use ordering::OrderingKey;
pub use profile::{AgeLabel, GENDER_ATTRIBUTE, Gender, Profile, ProfileRecord};
