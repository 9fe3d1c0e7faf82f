//! Session tracking on top of the auth oracle.
//!
//! [`SessionTracker`] registers exactly one oracle listener for its lifetime.
//! The first oracle report flips `resolved` to true, and it never flips back
//! for this tracker instance.

use nurture_types::Identity;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::engine::{CoreEvent, EventSender};
use crate::store::{AuthOracle, Subscription};

/// The current session as seen by the core.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Signed-in identity, or none.
    pub identity: Option<Identity>,
    /// True once the oracle has reported at least once.
    pub resolved: bool,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}

/// Owns the oracle registration and the session state derived from it.
pub struct SessionTracker {
    state_tx: watch::Sender<SessionState>,
    subscription: Subscription,
}

impl SessionTracker {
    /// Register with the oracle. Reports are forwarded into `events` and
    /// applied by the core via [`apply`](Self::apply).
    pub fn new(oracle: &dyn AuthOracle, events: EventSender) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        debug!("SessionTracker: registering auth listener");
        let subscription = oracle.on_identity_changed(Box::new(move |identity| {
            if events.send(CoreEvent::Identity(identity)).is_err() {
                trace!("SessionTracker: core gone, dropping auth report");
            }
        }));
        Self {
            state_tx,
            subscription,
        }
    }

    /// Apply one oracle report. Returns true if the state changed.
    pub fn apply(&mut self, identity: Option<Identity>) -> bool {
        self.state_tx.send_if_modified(|state| {
            if !state.resolved {
                info!("SessionTracker: initial auth check complete");
            }
            let changed = !state.resolved || state.identity != identity;
            if state.identity != identity {
                info!(
                    identity = identity.as_ref().map(|i| i.as_str()).unwrap_or("none"),
                    "SessionTracker: identity changed"
                );
            }
            state.identity = identity;
            state.resolved = true;
            changed
        })
    }

    pub fn current(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Stream of session states; the receiver starts at the current value.
    pub fn observe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Release the oracle registration. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.subscription.release();
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }
}
