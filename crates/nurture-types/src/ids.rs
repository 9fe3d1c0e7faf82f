//! Typed identifiers for sessions, profiles, and log entries.
//!
//! Identifiers are assigned by the external collaborators (the auth oracle
//! hands out identities, the document store hands out document ids), so they
//! wrap opaque strings rather than generating anything locally. The `short()`
//! form (first 8 chars) is for human-facing output, never a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The authenticated user, as reported by the auth oracle.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

/// A profile document id.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

/// A log entry document id (unique within its category collection).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap an id handed out by a collaborator.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters, for display only.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((end, _)) => &self.0[..end],
                    None => &self.0,
                }
            }

            /// Check if a query string matches this id by prefix.
            pub fn matches_prefix(&self, prefix: &str) -> bool {
                self.0.starts_with(prefix)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_string_id!(Identity, "Identity");
impl_string_id!(ProfileId, "ProfileId");
impl_string_id!(LogId, "LogId");

// ── Prefix resolution ───────────────────────────────────────────────────────

/// Error from ambiguous prefix resolution.
#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    #[error("no match for '{0}'")]
    NoMatch(String),
    #[error("ambiguous query '{prefix}': matches {candidates:?}")]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
}

/// Resolve a query string against profile ids and names.
///
/// Resolution order:
/// 1. Exact name match
/// 2. Unique name prefix match
/// 3. Unique id prefix match
/// 4. Error (no match or ambiguous)
pub fn resolve_profile_prefix<'a>(
    profiles: impl Iterator<Item = (&'a ProfileId, &'a str)>,
    query: &str,
) -> Result<ProfileId, PrefixError> {
    let entries: Vec<(&ProfileId, &str)> = profiles.collect();

    if let Some((id, _)) = entries.iter().find(|(_, name)| *name == query) {
        return Ok((*id).clone());
    }

    let name_matches: Vec<(&ProfileId, &str)> = entries
        .iter()
        .filter(|(_, name)| name.starts_with(query))
        .copied()
        .collect();

    if name_matches.len() == 1 {
        return Ok(name_matches[0].0.clone());
    }
    if name_matches.len() > 1 {
        return Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: name_matches.iter().map(|(_, n)| n.to_string()).collect(),
        });
    }

    let id_matches: Vec<&ProfileId> = entries
        .iter()
        .filter(|(id, _)| id.matches_prefix(query))
        .map(|(id, _)| *id)
        .collect();

    match id_matches.len() {
        0 => Err(PrefixError::NoMatch(query.to_string())),
        1 => Ok(id_matches[0].clone()),
        _ => Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: id_matches.iter().map(|id| id.to_string()).collect(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_truncates_long_ids() {
        let id = ProfileId::new("kX9fa2LmQ0zz");
        assert_eq!(id.short(), "kX9fa2Lm");
    }

    #[test]
    fn test_short_keeps_short_ids() {
        let id = LogId::new("b1");
        assert_eq!(id.short(), "b1");
    }

    #[test]
    fn test_debug_format() {
        let id = Identity::new("u1");
        assert_eq!(format!("{id:?}"), "Identity(u1)");
    }

    #[test]
    fn test_json_transparent() {
        let id = ProfileId::new("b1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"b1\"");
        let parsed: ProfileId = serde_json::from_str("\"b1\"").unwrap();
        assert_eq!(parsed, id);
    }

    // ── Prefix resolution ───────────────────────────────────────────────

    fn fixtures() -> Vec<(ProfileId, String)> {
        vec![
            (ProfileId::new("a1b2c3"), "Deniz".to_string()),
            (ProfileId::new("a1ffff"), "Defne".to_string()),
            (ProfileId::new("z9z9z9"), "Ada".to_string()),
        ]
    }

    fn resolve(query: &str) -> Result<ProfileId, PrefixError> {
        let f = fixtures();
        resolve_profile_prefix(f.iter().map(|(id, n)| (id, n.as_str())), query)
    }

    #[test]
    fn test_resolve_exact_name() {
        assert_eq!(resolve("Ada").unwrap(), ProfileId::new("z9z9z9"));
    }

    #[test]
    fn test_resolve_unique_name_prefix() {
        assert_eq!(resolve("Den").unwrap(), ProfileId::new("a1b2c3"));
    }

    #[test]
    fn test_resolve_ambiguous_name_prefix() {
        assert!(matches!(resolve("De"), Err(PrefixError::Ambiguous { .. })));
    }

    #[test]
    fn test_resolve_id_prefix() {
        assert_eq!(resolve("z9").unwrap(), ProfileId::new("z9z9z9"));
        assert!(matches!(resolve("a1"), Err(PrefixError::Ambiguous { .. })));
    }

    #[test]
    fn test_resolve_no_match() {
        assert!(matches!(resolve("nope"), Err(PrefixError::NoMatch(_))));
    }
}
