//! Ingestion errors for documents that fail validation at the store boundary.

use thiserror::Error;

/// A document that could not be turned into a typed value.
///
/// Rejected documents are dropped by the synchronizers (with a warning); they
/// never reach the published state.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Field data is not a JSON object.
    #[error("document {id}: data is not an object")]
    NotAnObject { id: String },

    /// Missing or mistyped fields, or an unknown `type` value.
    #[error("document {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document declares a category other than its collection's.
    #[error("document {id}: category '{found}' delivered on the {expected} feed")]
    CategoryMismatch {
        id: String,
        expected: crate::Category,
        found: String,
    },
}
