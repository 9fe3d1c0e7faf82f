//! Raw documents as delivered by the store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// One document from a store snapshot: its id plus untyped field data.
///
/// Typed values are produced from documents at the ingestion boundary
/// ([`Profile::from_document`](crate::Profile::from_document),
/// [`LogEntry::from_document`](crate::LogEntry::from_document)); nothing past
/// that boundary sees a `Document`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Read a string field, if present.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }

    /// Decode the field data into `T`, tagging failures with the document id.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, IngestError> {
        if !self.data.is_object() {
            return Err(IngestError::NotAnObject {
                id: self.id.clone(),
            });
        }
        T::deserialize(&self.data).map_err(|source| IngestError::Malformed {
            id: self.id.clone(),
            source,
        })
    }
}
