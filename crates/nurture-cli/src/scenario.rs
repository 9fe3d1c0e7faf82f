//! RON scenario scripts.
//!
//! A scenario is a list of steps played against a [`MemoryOracle`] and
//! [`MemoryStore`]. After every step the core is drained and whatever changed
//! is appended to the transcript: navigation transitions, the selected
//! profile, and the timeline head.
//!
//! ```ron
//! Scenario(
//!     name: "first week",
//!     today: Some("2024-03-08"),
//!     steps: [
//!         SignIn("parent-1"),
//!         AddProfile(name: "Mia", birth_date: "2024-03-01", gender: female),
//!         AddLog(log: Weight(3.4), notes: Some("at birth")),
//!         Show,
//!     ],
//! )
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use nurture_client::{
    Core, CoreConfig, LogDraft, MemoryOracle, MemoryStore, NavigationState, ProfileDraft,
    StoreError, add_log, add_profile, remove_profile,
};
use nurture_types::{
    Category, DevelopmentLog, Gender, HealthEvent, HealthLog, LogKind, Measure, ProfileId,
    RoutineActivity, RoutineLog, resolve_profile_prefix,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Reference date for age labels; defaults to the current date.
    #[serde(default)]
    pub today: Option<NaiveDate>,
    /// Leave server timestamps pending until a `Stamp` step.
    #[serde(default)]
    pub manual_timestamps: bool,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).context("invalid scenario")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_ron_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// One scripted action.
#[derive(Debug, Deserialize)]
pub enum Step {
    SignIn(String),
    SignOut,
    /// Re-report the current identity (token refresh).
    Refresh,
    AddProfile {
        name: String,
        birth_date: NaiveDate,
        gender: Gender,
    },
    /// Remove a profile by name, name prefix, or id prefix.
    RemoveProfile(String),
    Select(String),
    /// Log against `profile`, or the selected profile when omitted.
    AddLog {
        #[serde(default)]
        profile: Option<String>,
        log: LogSpec,
        #[serde(default)]
        notes: Option<String>,
    },
    /// Stamp pending server timestamps everywhere.
    Stamp,
    /// Make the profile query report an error.
    FailProfiles(String),
    /// Make one category feed of the selected profile report an error.
    FailFeed(Category, String),
    /// Print the full profile set and timeline.
    Show,
}

/// Script shorthand for log payloads.
#[derive(Debug, Deserialize)]
pub enum LogSpec {
    Weight(f64),
    Height(f64),
    Sleep(u32),
    Feeding(u32),
    Diaper,
    Vaccination(String, NaiveDate),
    DoctorVisit(String, NaiveDate),
}

impl LogSpec {
    fn into_kind(self) -> LogKind {
        let development = |measure, value| LogKind::Development(DevelopmentLog { measure, value });
        let routine = |activity, minutes| {
            LogKind::Routine(RoutineLog {
                activity,
                start_time: None,
                end_time: None,
                duration_in_minutes: minutes,
            })
        };
        let health = |event, event_name, event_date| {
            LogKind::Health(HealthLog {
                event,
                event_name,
                event_date,
            })
        };
        match self {
            Self::Weight(v) => development(Measure::Weight, v),
            Self::Height(v) => development(Measure::Height, v),
            Self::Sleep(m) => routine(RoutineActivity::Sleep, Some(m)),
            Self::Feeding(m) => routine(RoutineActivity::Feeding, Some(m)),
            Self::Diaper => routine(RoutineActivity::Diaper, None),
            Self::Vaccination(name, date) => health(HealthEvent::Vaccination, name, date),
            Self::DoctorVisit(name, date) => health(HealthEvent::DoctorVisit, name, date),
        }
    }
}

/// A running scenario.
pub struct Replay {
    oracle: MemoryOracle,
    store: MemoryStore,
    config: CoreConfig,
    core: Core,
    transitions: broadcast::Receiver<NavigationState>,
    today: NaiveDate,
    selected: Option<ProfileId>,
    transcript: Vec<String>,
}

impl Replay {
    pub fn new(config: CoreConfig, today: NaiveDate, manual_timestamps: bool) -> Self {
        let oracle = MemoryOracle::new();
        let store = if manual_timestamps {
            MemoryStore::with_manual_timestamps()
        } else {
            MemoryStore::new()
        }
        .with_timestamp_field(config.order_field.clone());
        let core = Core::new(&oracle, Arc::new(store.clone()), config.clone());
        let transitions = core.handle().subscribe_transitions();
        let mut replay = Self {
            oracle,
            store,
            config,
            core,
            transitions,
            today,
            selected: None,
            transcript: Vec::new(),
        };
        let initial = replay.core.navigation();
        replay.emit(format!("  => {initial} ({})", initial.route()));
        replay
    }

    /// Play every step, returning the transcript.
    pub fn run(mut self, steps: Vec<Step>) -> Vec<String> {
        for (n, step) in steps.into_iter().enumerate() {
            self.emit(format!("[{}] {step:?}", n + 1));
            if let Err(e) = self.apply(step) {
                self.emit(format!("  !! {e:#}"));
            }
            self.settle();
        }
        self.core.shutdown();
        debug!(open_watches = self.store.open_watches(), "replay: finished");
        self.transcript
    }

    fn apply(&mut self, step: Step) -> Result<()> {
        match step {
            Step::SignIn(identity) => self.oracle.sign_in(&identity),
            Step::SignOut => self.oracle.sign_out(),
            Step::Refresh => self.oracle.refresh(),
            Step::AddProfile {
                name,
                birth_date,
                gender,
            } => {
                let owner = self
                    .core
                    .session()
                    .current()
                    .identity
                    .ok_or_else(|| anyhow!("not signed in"))?;
                let draft = ProfileDraft::new(name, birth_date, gender);
                add_profile(&self.store, &self.config, &owner, draft)?;
            }
            Step::RemoveProfile(query) => {
                let id = self.lookup(&query)?;
                remove_profile(&self.store, &self.config, &id)?;
            }
            Step::Select(query) => {
                let id = self.lookup(&query)?;
                self.core.handle().select(id)?;
            }
            Step::AddLog {
                profile,
                log,
                notes,
            } => {
                let id = match profile {
                    Some(query) => self.lookup(&query)?,
                    None => self.selected_id()?,
                };
                let mut draft = LogDraft::new(log.into_kind());
                draft.notes = notes;
                add_log(&self.store, &self.config, &id, draft)?;
            }
            Step::Stamp => {
                let mut stamped = self.store.resolve_pending(&self.config.profiles_path());
                for profile in self.core.profiles().profiles() {
                    for category in Category::ALL {
                        stamped += self
                            .store
                            .resolve_pending(&self.config.logs_path(&profile.id, category));
                    }
                }
                self.emit(format!("  stamped {stamped}"));
            }
            Step::FailProfiles(message) => {
                self.store
                    .inject_error(&self.config.profiles_path(), StoreError::Unavailable(message));
            }
            Step::FailFeed(category, message) => {
                let id = self.selected_id()?;
                self.store.inject_error(
                    &self.config.logs_path(&id, category),
                    StoreError::Unavailable(message),
                );
            }
            Step::Show => self.show(),
        }
        Ok(())
    }

    fn lookup(&self, query: &str) -> Result<ProfileId> {
        let profiles = self.core.profiles().profiles();
        Ok(resolve_profile_prefix(
            profiles.iter().map(|p| (&p.id, p.name.as_str())),
            query,
        )?)
    }

    fn selected_id(&self) -> Result<ProfileId> {
        match self.core.profiles().selected_id() {
            Some(id) => Ok(id.clone()),
            None => bail!("no profile selected"),
        }
    }

    fn settle(&mut self) {
        let handled = self.core.process_pending();
        debug!(handled, "replay: settled");

        while let Ok(next) = self.transitions.try_recv() {
            self.emit(format!("  => {next} ({})", next.route()));
        }

        let selected = self.core.profiles().selected_id().cloned();
        if selected != self.selected {
            let line = match self.core.profiles().selected() {
                Some(p) => format!("  selected {} ({}, {})", p.name, p.id.short(), p.age_label(self.today)),
                None => "  selected none".to_string(),
            };
            self.emit(line);
            self.selected = selected;
        }
    }

    fn show(&mut self) {
        let mut lines = Vec::new();
        for p in self.core.profiles().profiles() {
            let marker = if Some(&p.id) == self.selected.as_ref() { "*" } else { " " };
            let gender = p.gender().map(|g| g.to_string()).unwrap_or_else(|| "-".into());
            lines.push(format!(
                "  {marker} {} born {} ({}, {gender})",
                p.name,
                p.birth_date,
                p.age_label(self.today)
            ));
        }
        for entry in self.core.timeline().entries() {
            let when = match entry.created_at.millis() {
                Some(ms) => ms.to_string(),
                None => "pending".to_string(),
            };
            let notes = entry.notes.as_deref().map(|n| format!(" \"{n}\"")).unwrap_or_default();
            lines.push(format!("    {when:>8} {:<11} {}{notes}", entry.category(), entry.kind));
        }
        for line in lines {
            self.emit(line);
        }
    }

    fn emit(&mut self, line: String) {
        info!("{line}");
        self.transcript.push(line);
    }
}
