//! Server-assigned ordering keys.
//!
//! The store stamps `createdAt` itself. A freshly written document is visible
//! to listeners before the stamp lands, so the key is either resolved (Unix
//! millis) or still pending. Pending keys sort as `0`, which puts them after
//! every resolved key in a descending merge.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A `createdAt` value that may not have been assigned yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum OrderingKey {
    /// Written locally, server timestamp not yet assigned.
    #[default]
    Pending,
    /// Server timestamp (Unix millis).
    Resolved(u64),
}

impl OrderingKey {
    /// Key used for sorting. Pending maps to `0`.
    pub fn sort_key(&self) -> u64 {
        match self {
            Self::Pending => 0,
            Self::Resolved(ms) => *ms,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The resolved timestamp, if any.
    pub fn millis(&self) -> Option<u64> {
        match self {
            Self::Pending => None,
            Self::Resolved(ms) => Some(*ms),
        }
    }

    /// Total order for ascending sorts (pending first).
    pub fn cmp_ascending(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    /// Total order for descending sorts (pending last).
    pub fn cmp_descending(&self, other: &Self) -> Ordering {
        other.sort_key().cmp(&self.sort_key())
    }
}

impl From<Option<u64>> for OrderingKey {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Self::Pending, Self::Resolved)
    }
}

impl From<OrderingKey> for Option<u64> {
    fn from(key: OrderingKey) -> Self {
        key.millis()
    }
}

impl From<u64> for OrderingKey {
    fn from(ms: u64) -> Self {
        Self::Resolved(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_sorts_last_descending() {
        let mut keys = vec![
            OrderingKey::Pending,
            OrderingKey::Resolved(5),
            OrderingKey::Resolved(9),
        ];
        keys.sort_by(OrderingKey::cmp_descending);
        assert_eq!(
            keys,
            vec![
                OrderingKey::Resolved(9),
                OrderingKey::Resolved(5),
                OrderingKey::Pending
            ]
        );
    }

    #[test]
    fn test_null_and_missing_decode_as_pending() {
        #[derive(Deserialize)]
        struct Doc {
            #[serde(default)]
            created_at: OrderingKey,
        }
        let null: Doc = serde_json::from_str(r#"{"created_at": null}"#).unwrap();
        let missing: Doc = serde_json::from_str("{}").unwrap();
        let set: Doc = serde_json::from_str(r#"{"created_at": 42}"#).unwrap();
        assert!(null.created_at.is_pending());
        assert!(missing.created_at.is_pending());
        assert_eq!(set.created_at, OrderingKey::Resolved(42));
    }

    #[test]
    fn test_serializes_pending_as_null() {
        assert_eq!(serde_json::to_string(&OrderingKey::Pending).unwrap(), "null");
        assert_eq!(serde_json::to_string(&OrderingKey::Resolved(7)).unwrap(), "7");
    }
}
