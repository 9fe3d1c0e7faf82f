//! The live profile set for the signed-in identity, plus the selection.
//!
//! # State Machine
//!
//! ```text
//! +-------------------+
//! | Awaiting auth     | loading=true, profiles=[], no watch
//! +---------+---------+
//!           | session resolved
//!     +-----+------------------------------+
//!     | identity                           | none
//!     v                                    v
//! +-------------------+          +-------------------+
//! | Watching          |          | Signed out        |
//! | loading until the |          | loading=false,    |
//! | first snapshot    |          | profiles=[]       |
//! +---------+---------+          +-------------------+
//!           | snapshot: replace set, repair selection
//!           v
//! +-------------------+
//! | Live              | (each snapshot replaces the set)
//! +-------------------+
//! ```
//!
//! # Repair rule
//!
//! After every snapshot the selection is checked by id: still present ⇒
//! unchanged; otherwise the first (earliest-created) profile; otherwise none.
//! A manual [`select`](ProfileSetSynchronizer::select) is subject to the same
//! rule on the next snapshot.

use std::sync::Arc;

use nurture_types::{Identity, Profile, ProfileId};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::CoreConfig;
use crate::engine::{CoreEvent, EventSender};
use crate::session::SessionState;
use crate::store::{DocumentStore, SnapshotResult, Subscription};

/// Published profile state.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileSetView {
    /// Ordered by creation, oldest first.
    pub profiles: Vec<Profile>,
    pub selected: Option<Profile>,
    pub loading: bool,
}

impl Default for ProfileSetView {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            selected: None,
            loading: true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// The id is not in the current profile set.
    #[error("profile {0} is not in the current set")]
    UnknownProfile(ProfileId),
}

pub struct ProfileSetSynchronizer {
    store: Arc<dyn DocumentStore>,
    config: Arc<CoreConfig>,
    events: EventSender,
    /// Identity the open watch is filtered on.
    owner: Option<Identity>,
    /// Bumped whenever the watch is replaced or released; snapshots tagged
    /// with an older generation are discarded.
    generation: u64,
    subscription: Option<Subscription>,
    profiles: Vec<Profile>,
    /// Held by id; resolved against `profiles` when published.
    selected: Option<ProfileId>,
    loading: bool,
    state_tx: watch::Sender<ProfileSetView>,
}

impl ProfileSetSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<CoreConfig>, events: EventSender) -> Self {
        let (state_tx, _) = watch::channel(ProfileSetView::default());
        Self {
            store,
            config,
            events,
            owner: None,
            generation: 0,
            subscription: None,
            profiles: Vec::new(),
            selected: None,
            loading: true,
            state_tx,
        }
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// React to a session change.
    pub fn on_session(&mut self, session: &SessionState) {
        match (session.resolved, &session.identity) {
            (false, _) => {
                self.release();
                self.clear();
                self.loading = true;
            }
            (true, None) => {
                if self.owner.is_some() {
                    info!("ProfileSetSynchronizer: signed out, clearing profiles");
                }
                self.release();
                self.clear();
                self.loading = false;
            }
            (true, Some(identity)) => {
                if self.owner.as_ref() == Some(identity) && self.subscription.is_some() {
                    debug!("ProfileSetSynchronizer: same identity, keeping watch");
                    return;
                }
                self.release();
                self.clear();
                self.loading = true;
                self.open(identity.clone());
            }
        }
        self.publish();
    }

    /// Apply one snapshot from the profile watch.
    ///
    /// Returns false if the snapshot belonged to a released watch.
    pub fn apply_snapshot(&mut self, generation: u64, result: SnapshotResult) -> bool {
        if generation != self.generation || self.subscription.is_none() {
            debug!(
                generation,
                current = self.generation,
                "ProfileSetSynchronizer: discarding stale snapshot"
            );
            return false;
        }

        match result {
            Ok(docs) => {
                let owner = self.owner.clone();
                let config = self.config.clone();
                self.profiles = docs
                    .iter()
                    .map(|doc| Profile::from_document(&config.canonical_document(doc)))
                    .filter_map(|decoded| match decoded {
                        Ok(p) if Some(&p.owner) == owner.as_ref() => Some(p),
                        Ok(p) => {
                            warn!(
                                profile = %p.id,
                                owner = %p.owner,
                                "ProfileSetSynchronizer: dropping profile owned by another identity"
                            );
                            None
                        }
                        Err(e) => {
                            warn!("ProfileSetSynchronizer: dropping invalid profile: {e}");
                            None
                        }
                    })
                    .collect();
                debug!(
                    count = self.profiles.len(),
                    "ProfileSetSynchronizer: snapshot applied"
                );
            }
            Err(e) => {
                error!("ProfileSetSynchronizer: error fetching profiles: {e}");
                self.profiles.clear();
            }
        }

        self.loading = false;
        self.repair_selection();
        self.publish();
        true
    }

    /// Select a profile by id. Holds until the next snapshot's repair rule.
    pub fn select(&mut self, id: &ProfileId) -> Result<(), SelectError> {
        if !self.profiles.iter().any(|p| &p.id == id) {
            warn!(profile = %id, "ProfileSetSynchronizer: rejecting unknown selection");
            return Err(SelectError::UnknownProfile(id.clone()));
        }
        if self.selected.as_ref() != Some(id) {
            info!(profile = %id, "ProfileSetSynchronizer: selection changed");
            self.selected = Some(id.clone());
            self.publish();
        }
        Ok(())
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn selected_id(&self) -> Option<&ProfileId> {
        self.selected.as_ref()
    }

    pub fn selected(&self) -> Option<&Profile> {
        let id = self.selected.as_ref()?;
        self.profiles.iter().find(|p| &p.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn view(&self) -> ProfileSetView {
        ProfileSetView {
            profiles: self.profiles.clone(),
            selected: self.selected().cloned(),
            loading: self.loading,
        }
    }

    pub fn observe(&self) -> watch::Receiver<ProfileSetView> {
        self.state_tx.subscribe()
    }

    /// Whether a store watch is currently held.
    pub fn is_watching(&self) -> bool {
        self.subscription.is_some()
    }

    /// Release the watch. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.release();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn open(&mut self, identity: Identity) {
        self.generation += 1;
        let generation = self.generation;
        let query = self.config.profiles_query(&identity);
        info!(
            identity = %identity,
            collection = %query.collection,
            "ProfileSetSynchronizer: watching profiles"
        );
        let events = self.events.clone();
        let subscription = self.store.watch(
            query,
            Box::new(move |result| {
                if events
                    .send(CoreEvent::ProfileSnapshot { generation, result })
                    .is_err()
                {
                    trace!(generation, "ProfileSetSynchronizer: core gone, dropping snapshot");
                }
            }),
        );
        self.owner = Some(identity);
        self.subscription = Some(subscription);
    }

    fn release(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            debug!("ProfileSetSynchronizer: cleaning up profile watch");
            sub.release();
            self.generation += 1;
        }
        self.owner = None;
    }

    fn clear(&mut self) {
        self.profiles.clear();
        self.selected = None;
    }

    fn repair_selection(&mut self) {
        let still_valid = self
            .selected
            .as_ref()
            .is_some_and(|id| self.profiles.iter().any(|p| &p.id == id));
        if still_valid {
            return;
        }
        self.selected = self.profiles.first().map(|p| p.id.clone());
        match &self.selected {
            Some(id) => info!(profile = %id, "ProfileSetSynchronizer: default selection"),
            None => debug!("ProfileSetSynchronizer: no profiles, selection cleared"),
        }
    }

    fn publish(&self) {
        let view = self.view();
        self.state_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
