//! Profile entities: one per tracked child.
//!
//! The store keeps profiles in a flat collection keyed by owner. On the wire
//! the owner is `userId` and the birth date is `dateOfBirth`; any other string
//! field (e.g. `gender`) lands in [`Profile::attributes`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::IngestError;
use crate::ids::{Identity, ProfileId};
use crate::ordering::OrderingKey;

/// Attribute key holding the profile's gender.
pub const GENDER_ATTRIBUTE: &str = "gender";

/// A child profile owned by one identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    /// Who owns this profile. Always equal to the current identity while the
    /// profile is part of a live set.
    pub owner: Identity,
    pub name: String,
    pub birth_date: NaiveDate,
    pub attributes: BTreeMap<String, String>,
    pub created_at: OrderingKey,
}

/// Wire form of a profile document (everything but the id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub user_id: Identity,
    pub name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub created_at: OrderingKey,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Profile {
    /// Validate and decode a profile document.
    pub fn from_document(doc: &Document) -> Result<Self, IngestError> {
        let record: ProfileRecord = doc.decode()?;
        Ok(record.into_profile(ProfileId::new(doc.id.clone())))
    }

    /// The `gender` attribute, if present and recognized.
    pub fn gender(&self) -> Option<Gender> {
        self.attributes
            .get(GENDER_ATTRIBUTE)
            .and_then(|g| g.parse().ok())
    }

    /// Whole months elapsed since birth, as of `today`.
    ///
    /// A month only counts once its day-of-month has been reached.
    pub fn age_in_months(&self, today: NaiveDate) -> i32 {
        let birth = self.birth_date;
        let mut months = (today.year() - birth.year()) * 12
            + (today.month() as i32 - birth.month() as i32);
        if today.day() < birth.day() {
            months -= 1;
        }
        months
    }

    /// Human-facing age bucket used on profile cards.
    pub fn age_label(&self, today: NaiveDate) -> AgeLabel {
        match self.age_in_months(today) {
            m if m < 1 => AgeLabel::Newborn,
            m if m < 24 => AgeLabel::Months(m as u32),
            m => AgeLabel::Years((m / 12) as u32),
        }
    }
}

impl ProfileRecord {
    /// Attach a document id, folding string extras into attributes.
    pub fn into_profile(self, id: ProfileId) -> Profile {
        let attributes = self
            .extra
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect();
        Profile {
            id,
            owner: self.user_id,
            name: self.name,
            birth_date: self.date_of_birth,
            attributes,
            created_at: self.created_at,
        }
    }
}

/// Gender as recorded at profile creation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Age display buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeLabel {
    /// Under one month.
    Newborn,
    /// One to 23 months.
    Months(u32),
    /// Two years and up.
    Years(u32),
}

impl fmt::Display for AgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newborn => f.write_str("newborn"),
            Self::Months(1) => f.write_str("1 month"),
            Self::Months(m) => write!(f, "{m} months"),
            Self::Years(1) => f.write_str("1 year"),
            Self::Years(y) => write!(f, "{y} years"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn profile_born(birth: NaiveDate) -> Profile {
        Profile {
            id: ProfileId::new("b1"),
            owner: Identity::new("u1"),
            name: "Deniz".into(),
            birth_date: birth,
            attributes: BTreeMap::new(),
            created_at: OrderingKey::Resolved(10),
        }
    }

    #[test]
    fn test_from_document() {
        let doc = Document::new(
            "b1",
            json!({
                "userId": "u1",
                "name": "Deniz",
                "dateOfBirth": "2024-01-15",
                "gender": "female",
                "createdAt": 10
            }),
        );
        let p = Profile::from_document(&doc).unwrap();
        assert_eq!(p.id, ProfileId::new("b1"));
        assert_eq!(p.owner, Identity::new("u1"));
        assert_eq!(p.birth_date, date(2024, 1, 15));
        assert_eq!(p.created_at, OrderingKey::Resolved(10));
        assert_eq!(p.gender(), Some(Gender::Female));
    }

    #[test]
    fn test_pending_created_at() {
        let doc = Document::new(
            "b2",
            json!({"userId": "u1", "name": "Ada", "dateOfBirth": "2024-01-15", "createdAt": null}),
        );
        let p = Profile::from_document(&doc).unwrap();
        assert!(p.created_at.is_pending());
        assert!(p.attributes.is_empty());
    }

    #[test]
    fn test_missing_owner_rejected() {
        let doc = Document::new("b3", json!({"name": "Ada", "dateOfBirth": "2024-01-15"}));
        assert!(matches!(
            Profile::from_document(&doc),
            Err(IngestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        let doc = Document::new("b4", json!([1, 2, 3]));
        assert!(matches!(
            Profile::from_document(&doc),
            Err(IngestError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_age_in_months_counts_day_of_month() {
        let p = profile_born(date(2024, 1, 20));
        assert_eq!(p.age_in_months(date(2024, 2, 19)), 0);
        assert_eq!(p.age_in_months(date(2024, 2, 20)), 1);
        assert_eq!(p.age_in_months(date(2025, 1, 20)), 12);
    }

    #[test]
    fn test_age_label_buckets() {
        let p = profile_born(date(2022, 3, 1));
        assert_eq!(p.age_label(date(2022, 3, 10)), AgeLabel::Newborn);
        assert_eq!(p.age_label(date(2022, 8, 1)), AgeLabel::Months(5));
        assert_eq!(p.age_label(date(2025, 3, 1)), AgeLabel::Years(3));
        assert_eq!(AgeLabel::Months(5).to_string(), "5 months");
        assert_eq!(AgeLabel::Years(1).to_string(), "1 year");
    }
}
