//! Log entries: the per-category events recorded against a profile.
//!
//! Each category lives in its own collection under the profile
//! (`developmentLogs`, `routineLogs`, `healthLogs`). The document shape
//! differs per category, so [`LogKind`] carries one variant per category and
//! decoding is driven by the collection the document arrived on.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::IngestError;
use crate::ids::LogId;
use crate::ordering::OrderingKey;

/// The fixed set of log categories.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Development,
    Routine,
    Health,
}

impl Category {
    /// Every category, in partition order.
    pub const ALL: [Category; 3] = [Category::Development, Category::Routine, Category::Health];

    /// Name of the per-profile collection holding this category's entries.
    pub fn collection_name(self) -> &'static str {
        match self {
            Self::Development => "developmentLogs",
            Self::Routine => "routineLogs",
            Self::Health => "healthLogs",
        }
    }

    /// Inverse of [`collection_name`](Self::collection_name).
    pub fn from_collection_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.collection_name() == name)
    }

    /// Position in [`Category::ALL`]; used to index partitions.
    pub fn index(self) -> usize {
        match self {
            Self::Development => 0,
            Self::Routine => 1,
            Self::Health => 2,
        }
    }
}

// ============================================================================
// Per-category payloads
// ============================================================================

/// Growth measurements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Measure {
    Weight,
    Height,
}

impl Measure {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Weight => "kg",
            Self::Height => "cm",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DevelopmentLog {
    #[serde(rename = "type")]
    pub measure: Measure,
    pub value: f64,
}

/// Daily routine activities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoutineActivity {
    Sleep,
    Feeding,
    Diaper,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineLog {
    #[serde(rename = "type")]
    pub activity: RoutineActivity,
    /// Unix millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    /// Unix millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_minutes: Option<u32>,
}

impl RoutineLog {
    /// Recorded duration, or the span between start and end when only those
    /// were recorded.
    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_in_minutes.or_else(|| match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => Some(((end - start) / 60_000) as u32),
            _ => None,
        })
    }
}

/// Health events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthEvent {
    Vaccination,
    DoctorVisit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthLog {
    #[serde(rename = "type")]
    pub event: HealthEvent,
    pub event_name: String,
    pub event_date: NaiveDate,
}

/// Category-tagged payload. One constructor per category.
#[derive(Clone, Debug, PartialEq)]
pub enum LogKind {
    Development(DevelopmentLog),
    Routine(RoutineLog),
    Health(HealthLog),
}

impl LogKind {
    pub fn category(&self) -> Category {
        match self {
            Self::Development(_) => Category::Development,
            Self::Routine(_) => Category::Routine,
            Self::Health(_) => Category::Health,
        }
    }

    /// The category-specific `type` string (e.g. `weight`, `doctor_visit`).
    pub fn type_name(&self) -> String {
        match self {
            Self::Development(d) => d.measure.to_string(),
            Self::Routine(r) => r.activity.to_string(),
            Self::Health(h) => h.event.to_string(),
        }
    }

    /// Serialize the payload fields plus the `category` tag.
    pub fn to_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = match self {
            Self::Development(d) => serde_json::to_value(d),
            Self::Routine(r) => serde_json::to_value(r),
            Self::Health(h) => serde_json::to_value(h),
        };
        let mut fields = match value {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        fields.insert(
            "category".into(),
            serde_json::Value::String(self.category().to_string()),
        );
        fields
    }

    fn decode(category: Category, doc: &Document) -> Result<Self, IngestError> {
        Ok(match category {
            Category::Development => Self::Development(doc.decode()?),
            Category::Routine => Self::Routine(doc.decode()?),
            Category::Health => Self::Health(doc.decode()?),
        })
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development(d) => write!(f, "{} {} {}", d.measure, d.value, d.measure.unit()),
            Self::Routine(r) => match r.duration_minutes() {
                Some(m) => write!(f, "{} {m} min", r.activity),
                None => write!(f, "{}", r.activity),
            },
            Self::Health(h) => write!(f, "{}: {} ({})", h.event, h.event_name, h.event_date),
        }
    }
}

// ============================================================================
// LogEntry
// ============================================================================

/// Fields shared by every category.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    created_at: OrderingKey,
}

/// A single log entry. Immutable: updates arrive as whole replacements.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub id: LogId,
    pub kind: LogKind,
    pub notes: Option<String>,
    pub created_at: OrderingKey,
}

impl LogEntry {
    /// Validate and decode a document delivered on `category`'s feed.
    ///
    /// Rejects documents whose own `category` field names a different
    /// category, and documents whose `type` is not valid for the category.
    pub fn from_document(category: Category, doc: &Document) -> Result<Self, IngestError> {
        if let Some(found) = doc.str_field("category")
            && found != <&'static str>::from(category)
        {
            return Err(IngestError::CategoryMismatch {
                id: doc.id.clone(),
                expected: category,
                found: found.to_string(),
            });
        }

        let envelope: Envelope = doc.decode()?;
        let kind = LogKind::decode(category, doc)?;

        Ok(Self {
            id: LogId::new(doc.id.clone()),
            kind,
            notes: envelope.notes.filter(|n| !n.trim().is_empty()),
            created_at: envelope.created_at,
        })
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Merge sort key; pending timestamps sort as `0`.
    pub fn sort_key(&self) -> u64 {
        self.created_at.sort_key()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_names_roundtrip() {
        for c in Category::ALL {
            assert_eq!(Category::from_collection_name(c.collection_name()), Some(c));
        }
        assert_eq!(Category::from_collection_name("sleepLogs"), None);
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(Category::Development.to_string(), "development");
        assert_eq!("health".parse::<Category>().unwrap(), Category::Health);
        assert!("growth".parse::<Category>().is_err());
    }

    #[test]
    fn test_decode_development() {
        let doc = Document::new(
            "l1",
            json!({"type": "weight", "value": 4.2, "notes": "", "createdAt": 100}),
        );
        let e = LogEntry::from_document(Category::Development, &doc).unwrap();
        assert_eq!(e.category(), Category::Development);
        assert_eq!(e.kind.type_name(), "weight");
        assert_eq!(e.notes, None);
        assert_eq!(e.sort_key(), 100);
        assert_eq!(e.kind.to_string(), "weight 4.2 kg");
    }

    #[test]
    fn test_decode_routine_derives_duration() {
        let doc = Document::new(
            "l2",
            json!({"type": "sleep", "startTime": 0, "endTime": 5_400_000, "createdAt": null}),
        );
        let e = LogEntry::from_document(Category::Routine, &doc).unwrap();
        assert!(e.created_at.is_pending());
        match &e.kind {
            LogKind::Routine(r) => assert_eq!(r.duration_minutes(), Some(90)),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_decode_health() {
        let doc = Document::new(
            "l3",
            json!({
                "type": "doctor_visit",
                "eventName": "two month checkup",
                "eventDate": "2024-03-01",
                "notes": "all good",
                "createdAt": 5
            }),
        );
        let e = LogEntry::from_document(Category::Health, &doc).unwrap();
        assert_eq!(e.kind.type_name(), "doctor_visit");
        assert_eq!(e.notes.as_deref(), Some("all good"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let doc = Document::new("l4", json!({"type": "bmi", "value": 1.0}));
        assert!(matches!(
            LogEntry::from_document(Category::Development, &doc),
            Err(IngestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_type_from_other_category_rejected() {
        let doc = Document::new("l5", json!({"type": "sleep"}));
        assert!(LogEntry::from_document(Category::Development, &doc).is_err());
    }

    #[test]
    fn test_category_mismatch_rejected() {
        let doc = Document::new(
            "l6",
            json!({"category": "health", "type": "weight", "value": 3.0}),
        );
        assert!(matches!(
            LogEntry::from_document(Category::Development, &doc),
            Err(IngestError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn test_to_fields_tags_category() {
        let kind = LogKind::Health(HealthLog {
            event: HealthEvent::Vaccination,
            event_name: "Hep B".into(),
            event_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        });
        let fields = kind.to_fields();
        assert_eq!(fields["category"], json!("health"));
        assert_eq!(fields["type"], json!("vaccination"));
        assert_eq!(fields["eventName"], json!("Hep B"));

        let doc = Document::new("l7", serde_json::Value::Object(fields));
        let back = LogEntry::from_document(Category::Health, &doc).unwrap();
        assert_eq!(back.kind, kind);
    }
}
