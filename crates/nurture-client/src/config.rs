//! Core configuration, loaded from RON.
//!
//! ```ron
//! (
//!     profiles_collection: "babies",
//!     owner_field: "userId",
//!     order_field: "createdAt",
//!     log_filter: "nurture_client=debug,info",
//! )
//! ```
//!
//! Every field is optional; missing fields take the defaults in
//! [`constants`](crate::constants).

use std::borrow::Cow;
use std::path::Path;

use nurture_types::{Category, Document, Identity, ProfileId};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CREATED_AT_FIELD, DEFAULT_LOG_FILTER, OWNER_FIELD, PROFILES_COLLECTION,
    TRANSITION_CHANNEL_CAPACITY,
};
use crate::store::{CollectionPath, Direction, Query};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Top-level collection holding profiles.
    pub profiles_collection: String,
    /// Profile field compared against the signed-in identity.
    pub owner_field: String,
    /// Server timestamp field used to order both profiles and logs.
    pub order_field: String,
    /// Default `tracing` filter for binaries embedding the core.
    pub log_filter: String,
    /// Capacity of the navigation transition broadcast.
    pub transition_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            profiles_collection: PROFILES_COLLECTION.to_string(),
            owner_field: OWNER_FIELD.to_string(),
            order_field: CREATED_AT_FIELD.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            transition_capacity: TRANSITION_CHANNEL_CAPACITY,
        }
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl CoreConfig {
    /// Parse a RON config document.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Load from `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn profiles_path(&self) -> CollectionPath {
        CollectionPath::root(&self.profiles_collection)
    }

    pub fn logs_path(&self, profile: &ProfileId, category: Category) -> CollectionPath {
        self.profiles_path()
            .child(profile.as_str(), category.collection_name())
    }

    /// The profile-set query: owned by `owner`, oldest first.
    pub fn profiles_query(&self, owner: &Identity) -> Query {
        Query::new(self.profiles_path(), &self.order_field, Direction::Ascending)
            .where_eq(&self.owner_field, owner.as_str())
    }

    /// One category feed for a profile: newest first.
    pub fn category_query(&self, profile: &ProfileId, category: Category) -> Query {
        Query::new(
            self.logs_path(profile, category),
            &self.order_field,
            Direction::Descending,
        )
    }

    // =========================================================================
    // Wire field names
    // =========================================================================

    /// Whether the owner and order fields use the data model's own names.
    pub fn uses_default_fields(&self) -> bool {
        self.owner_field == OWNER_FIELD && self.order_field == CREATED_AT_FIELD
    }

    /// A delivered document with the configured owner and order fields
    /// renamed to `userId`/`createdAt`, the names the data model decodes.
    pub fn canonical_document<'a>(&self, doc: &'a Document) -> Cow<'a, Document> {
        if self.uses_default_fields() {
            return Cow::Borrowed(doc);
        }
        let mut doc = doc.clone();
        if let serde_json::Value::Object(map) = &mut doc.data {
            rename_field(map, &self.owner_field, OWNER_FIELD);
            rename_field(map, &self.order_field, CREATED_AT_FIELD);
        }
        Cow::Owned(doc)
    }

    /// Outgoing fields renamed from the data model's names to the configured
    /// ones. Inverse of [`canonical_document`](Self::canonical_document).
    pub fn wire_fields(
        &self,
        mut fields: serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Map<String, serde_json::Value> {
        rename_field(&mut fields, OWNER_FIELD, &self.owner_field);
        rename_field(&mut fields, CREATED_AT_FIELD, &self.order_field);
        fields
    }
}

fn rename_field(map: &mut serde_json::Map<String, serde_json::Value>, from: &str, to: &str) {
    if from == to {
        return;
    }
    if let Some(value) = map.remove(from) {
        map.insert(to.to_string(), value);
    }
}
