//! The core event loop.
//!
//! Collaborator listeners only forward [`CoreEvent`]s into an unbounded mpsc
//! queue. [`Core`] owns every component and processes events one at a time,
//! cascading each change downstream:
//!
//! ```text
//!   oracle ──┐                         ┌──▶ SessionTracker
//!   store  ──┼──▶ mpsc<CoreEvent> ──▶ Core ──▶ ProfileSetSynchronizer ──▶ TimelineAggregator
//!   handle ──┘     (single consumer)        └──▶ navigation::resolve ──▶ NavigationDriver
//! ```
//!
//! UI code holds a [`CoreHandle`] (`Clone + Send + Sync`): three read-only
//! watch receivers plus the `select` command.

use std::sync::Arc;

use nurture_types::{Category, Identity, ProfileId};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::navigation::{NavigationDriver, NavigationInputs, NavigationState, resolve};
use crate::profiles::{ProfileSetSynchronizer, ProfileSetView};
use crate::session::{SessionState, SessionTracker};
use crate::store::{AuthOracle, DocumentStore, SnapshotResult};
use crate::timeline::{TimelineAggregator, TimelineView};

/// Queue feeding the core.
pub type EventSender = mpsc::UnboundedSender<CoreEvent>;

/// Everything the core reacts to.
#[derive(Debug)]
pub enum CoreEvent {
    /// The auth oracle reported.
    Identity(Option<Identity>),
    /// The profile watch delivered.
    ProfileSnapshot {
        generation: u64,
        result: SnapshotResult,
    },
    /// One category feed delivered.
    CategorySnapshot {
        generation: u64,
        category: Category,
        result: SnapshotResult,
    },
    /// The UI picked a profile.
    Select(ProfileId),
    /// Stop the loop and release everything.
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("core shut down")]
    Shutdown,
}

pub struct Core {
    config: Arc<CoreConfig>,
    session: SessionTracker,
    profiles: ProfileSetSynchronizer,
    timeline: TimelineAggregator,
    driver: NavigationDriver,
    navigation_tx: watch::Sender<NavigationState>,
    transitions_tx: broadcast::Sender<NavigationState>,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<CoreEvent>,
    stopped: bool,
}

impl Core {
    /// Build the component graph and register with the oracle.
    ///
    /// No store watch is opened until the oracle has reported.
    pub fn new(oracle: &dyn AuthOracle, store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        let config = Arc::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        let (navigation_tx, _) = watch::channel(NavigationState::Loading);
        let (transitions_tx, _) = broadcast::channel(config.transition_capacity.max(1));

        let profiles = ProfileSetSynchronizer::new(store.clone(), config.clone(), tx.clone());
        let timeline = TimelineAggregator::new(store, config.clone(), tx.clone());
        let session = SessionTracker::new(oracle, tx.clone());

        let mut core = Self {
            config,
            session,
            profiles,
            timeline,
            driver: NavigationDriver::new(),
            navigation_tx,
            transitions_tx,
            tx,
            rx,
            stopped: false,
        };
        core.refresh_navigation();
        core
    }

    pub fn handle(&self) -> CoreHandle {
        CoreHandle {
            tx: self.tx.clone(),
            session: self.session.observe(),
            navigation: self.navigation_tx.subscribe(),
            profiles: self.profiles.observe(),
            timeline: self.timeline.observe(),
            transitions: self.transitions_tx.clone(),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // =========================================================================
    // Driving the loop
    // =========================================================================

    /// Process one queued event, if any. Returns false when the queue is
    /// empty or the core has stopped.
    pub fn step(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        match self.rx.try_recv() {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Process until the queue is empty. Returns the number of events handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while self.step() {
            handled += 1;
        }
        handled
    }

    /// Process events until shut down.
    pub async fn run(mut self) {
        info!("Core: event loop started");
        while !self.stopped {
            match self.rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
        self.shutdown();
        info!("Core: event loop stopped");
    }

    /// Release every collaborator registration. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if !self.stopped {
            debug!("Core: shutting down");
        }
        self.stopped = true;
        self.timeline.shutdown();
        self.profiles.shutdown();
        self.session.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn profiles(&self) -> &ProfileSetSynchronizer {
        &self.profiles
    }

    pub fn timeline(&self) -> &TimelineAggregator {
        &self.timeline
    }

    pub fn navigation(&self) -> NavigationState {
        *self.navigation_tx.borrow()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Identity(identity) => {
                self.session.apply(identity);
                self.on_session_changed();
            }
            CoreEvent::ProfileSnapshot { generation, result } => {
                if self.profiles.apply_snapshot(generation, result) {
                    self.on_profiles_changed();
                }
            }
            CoreEvent::CategorySnapshot {
                generation,
                category,
                result,
            } => {
                self.timeline.apply_partition(generation, category, result);
            }
            CoreEvent::Select(id) => match self.profiles.select(&id) {
                Ok(()) => self.on_profiles_changed(),
                Err(e) => warn!("Core: select ignored: {e}"),
            },
            CoreEvent::Shutdown => self.shutdown(),
        }
    }

    fn on_session_changed(&mut self) {
        let session = self.session.current();
        self.profiles.on_session(&session);
        self.on_profiles_changed();
    }

    fn on_profiles_changed(&mut self) {
        self.timeline.on_selection(self.profiles.selected_id());
        self.refresh_navigation();
    }

    fn refresh_navigation(&mut self) {
        let session = self.session.current();
        let state = resolve(NavigationInputs {
            auth_resolved: session.resolved,
            signed_in: session.is_signed_in(),
            profiles_loading: self.profiles.is_loading(),
            profile_count: self.profiles.profiles().len(),
        });
        self.navigation_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if let Some(next) = self.driver.observe(state) {
            info!(state = %next, route = next.route(), "Core: navigate");
            let _ = self.transitions_tx.send(next);
        }
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// CoreHandle (Send + Sync public API)
// ============================================================================

/// Read-only view of the core plus the `select` command.
#[derive(Clone)]
pub struct CoreHandle {
    tx: EventSender,
    session: watch::Receiver<SessionState>,
    navigation: watch::Receiver<NavigationState>,
    profiles: watch::Receiver<ProfileSetView>,
    timeline: watch::Receiver<TimelineView>,
    transitions: broadcast::Sender<NavigationState>,
}

impl CoreHandle {
    /// Ask the core to select a profile. Unknown ids are ignored by the core.
    pub fn select(&self, id: ProfileId) -> Result<(), CoreError> {
        self.tx
            .send(CoreEvent::Select(id))
            .map_err(|_| CoreError::Shutdown)
    }

    /// Stop the core's loop and release its subscriptions.
    pub fn shutdown(&self) -> Result<(), CoreError> {
        self.tx
            .send(CoreEvent::Shutdown)
            .map_err(|_| CoreError::Shutdown)
    }

    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    pub fn navigation(&self) -> watch::Receiver<NavigationState> {
        self.navigation.clone()
    }

    pub fn profiles(&self) -> watch::Receiver<ProfileSetView> {
        self.profiles.clone()
    }

    pub fn timeline(&self) -> watch::Receiver<TimelineView> {
        self.timeline.clone()
    }

    /// Navigate-and-replace transitions issued from now on.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<NavigationState> {
        self.transitions.subscribe()
    }
}

/// Spawn the core's loop on the current tokio runtime.
pub fn spawn_core(
    oracle: &dyn AuthOracle,
    store: Arc<dyn DocumentStore>,
    config: CoreConfig,
) -> (CoreHandle, tokio::task::JoinHandle<()>) {
    let core = Core::new(oracle, store, config);
    let handle = core.handle();
    let task = tokio::spawn(core.run());
    (handle, task)
}

// ============================================================================
// Tests
// ============================================================================
