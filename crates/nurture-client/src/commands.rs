//! Write commands.
//!
//! The core never writes; these helpers are how a UI (or the replay harness)
//! adds and removes profiles and log entries. Writes go straight to the store
//! and come back through the live subscriptions like any other change.
//! Server timestamps are left pending; the store fills them in later.

use chrono::NaiveDate;
use nurture_types::{
    Category, GENDER_ATTRIBUTE, Gender, Identity, LogId, LogKind, OrderingKey, ProfileId,
    ProfileRecord,
};
use thiserror::Error;
use tracing::info;

use crate::config::CoreConfig;
use crate::constants::CREATED_AT_FIELD;
use crate::store::{DocumentStore, StoreError};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("profile name is empty")]
    EmptyName,
    #[error("gender is required")]
    MissingGender,
    #[error("measurement must be a positive number, got {0}")]
    InvalidMeasurement(f64),
    #[error("event name is empty")]
    EmptyEventName,
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart { start: u64, end: u64 },
    #[error("store rejected the write: {0}")]
    Store(#[from] StoreError),
    #[error("could not encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A profile as entered in the add-profile form.
#[derive(Clone, Debug)]
pub struct ProfileDraft {
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: Option<Gender>,
}

impl ProfileDraft {
    pub fn new(name: impl Into<String>, birth_date: NaiveDate, gender: Gender) -> Self {
        Self {
            name: name.into(),
            birth_date,
            gender: Some(gender),
        }
    }

    /// Trim the name and check required fields.
    pub fn validate(mut self) -> Result<Self, CommandError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(CommandError::EmptyName);
        }
        if self.gender.is_none() {
            return Err(CommandError::MissingGender);
        }
        Ok(self)
    }
}

/// A log entry as entered in one of the log forms.
#[derive(Clone, Debug)]
pub struct LogDraft {
    pub kind: LogKind,
    pub notes: Option<String>,
}

impl LogDraft {
    pub fn new(kind: LogKind) -> Self {
        Self { kind, notes: None }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Check the payload and fill in derived fields.
    pub fn validate(mut self) -> Result<Self, CommandError> {
        match &mut self.kind {
            LogKind::Development(d) => {
                if !d.value.is_finite() || d.value <= 0.0 {
                    return Err(CommandError::InvalidMeasurement(d.value));
                }
            }
            LogKind::Routine(r) => {
                if let (Some(start), Some(end)) = (r.start_time, r.end_time)
                    && end < start
                {
                    return Err(CommandError::EndBeforeStart { start, end });
                }
                r.duration_in_minutes = r.duration_minutes();
            }
            LogKind::Health(h) => {
                h.event_name = h.event_name.trim().to_string();
                if h.event_name.is_empty() {
                    return Err(CommandError::EmptyEventName);
                }
            }
        }
        self.notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(self)
    }
}

/// Add a profile owned by `owner`.
pub fn add_profile(
    store: &dyn DocumentStore,
    config: &CoreConfig,
    owner: &Identity,
    draft: ProfileDraft,
) -> Result<ProfileId, CommandError> {
    let draft = draft.validate()?;
    let mut record = ProfileRecord {
        user_id: owner.clone(),
        name: draft.name,
        date_of_birth: draft.birth_date,
        created_at: OrderingKey::Pending,
        extra: Default::default(),
    };
    if let Some(gender) = draft.gender {
        record
            .extra
            .insert(GENDER_ATTRIBUTE.into(), serde_json::Value::String(gender.to_string()));
    }

    let fields = match serde_json::to_value(&record)? {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let id = store.add(&config.profiles_path(), config.wire_fields(fields))?;
    info!(profile = %id, name = %record.name, "added profile");
    Ok(ProfileId::new(id))
}

/// Add a log entry under `profile`.
pub fn add_log(
    store: &dyn DocumentStore,
    config: &CoreConfig,
    profile: &ProfileId,
    draft: LogDraft,
) -> Result<LogId, CommandError> {
    let draft = draft.validate()?;
    let category = draft.category();
    let mut fields = draft.kind.to_fields();
    if let Some(notes) = draft.notes {
        fields.insert("notes".into(), serde_json::Value::String(notes));
    }
    fields.insert(CREATED_AT_FIELD.into(), serde_json::Value::Null);

    let id = store.add(&config.logs_path(profile, category), config.wire_fields(fields))?;
    info!(%profile, %category, log = %id, "added {}", draft.kind.type_name());
    Ok(LogId::new(id))
}

pub fn remove_profile(
    store: &dyn DocumentStore,
    config: &CoreConfig,
    profile: &ProfileId,
) -> Result<(), CommandError> {
    store.remove(&config.profiles_path(), profile.as_str())?;
    info!(%profile, "removed profile");
    Ok(())
}

pub fn remove_log(
    store: &dyn DocumentStore,
    config: &CoreConfig,
    profile: &ProfileId,
    category: Category,
    log: &LogId,
) -> Result<(), CommandError> {
    store.remove(&config.logs_path(profile, category), log.as_str())?;
    info!(%profile, %category, %log, "removed log");
    Ok(())
}
