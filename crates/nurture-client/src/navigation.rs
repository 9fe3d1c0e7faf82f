//! Top-level view derivation.
//!
//! [`resolve`] is a pure function of the session and profile-set status.
//! [`NavigationDriver`] sits on the caller side and turns the stream of
//! derived states into navigate-and-replace transitions: re-deriving the same
//! state never yields a second transition.

/// Which top-level view to show.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum NavigationState {
    /// Auth or profile data still in flight.
    Loading,
    /// No one is signed in.
    Unauthenticated,
    /// Signed in with no profiles yet.
    Onboarding,
    /// Signed in with at least one profile.
    Main,
}

impl NavigationState {
    /// The screen this state navigates to.
    pub fn route(self) -> &'static str {
        match self {
            Self::Loading => "Splash",
            Self::Unauthenticated => "Entry",
            Self::Onboarding => "AddBaby",
            Self::Main => "MainTabs",
        }
    }
}

/// Everything [`resolve`] looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationInputs {
    pub auth_resolved: bool,
    pub signed_in: bool,
    pub profiles_loading: bool,
    pub profile_count: usize,
}

/// Derive the view. `Loading` is checked first and dominates every other
/// input, so neither `Unauthenticated` nor `Onboarding` can flash while data
/// is in flight.
pub fn resolve(inputs: NavigationInputs) -> NavigationState {
    if !inputs.auth_resolved || inputs.profiles_loading {
        NavigationState::Loading
    } else if !inputs.signed_in {
        NavigationState::Unauthenticated
    } else if inputs.profile_count == 0 {
        NavigationState::Onboarding
    } else {
        NavigationState::Main
    }
}

/// Idempotent transition gate.
#[derive(Debug, Default)]
pub struct NavigationDriver {
    current: Option<NavigationState>,
    transitions: u64,
}

impl NavigationDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a freshly derived state. Returns it if it is a transition.
    pub fn observe(&mut self, next: NavigationState) -> Option<NavigationState> {
        if self.current == Some(next) {
            return None;
        }
        self.current = Some(next);
        self.transitions += 1;
        Some(next)
    }

    pub fn current(&self) -> Option<NavigationState> {
        self.current
    }

    /// How many transitions have been issued.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(auth_resolved: bool, signed_in: bool, profiles_loading: bool, profile_count: usize) -> NavigationInputs {
        NavigationInputs {
            auth_resolved,
            signed_in,
            profiles_loading,
            profile_count,
        }
    }

    #[test]
    fn test_branches() {
        assert_eq!(resolve(inputs(true, false, false, 0)), NavigationState::Unauthenticated);
        assert_eq!(resolve(inputs(true, true, false, 0)), NavigationState::Onboarding);
        assert_eq!(resolve(inputs(true, true, false, 2)), NavigationState::Main);
    }

    #[test]
    fn test_loading_dominates() {
        for signed_in in [false, true] {
            for count in [0, 1, 5] {
                for profiles_loading in [false, true] {
                    assert_eq!(
                        resolve(inputs(false, signed_in, profiles_loading, count)),
                        NavigationState::Loading
                    );
                }
                for auth_resolved in [false, true] {
                    assert_eq!(
                        resolve(inputs(auth_resolved, signed_in, true, count)),
                        NavigationState::Loading
                    );
                }
            }
        }
    }

    #[test]
    fn test_pure() {
        let i = inputs(true, true, false, 1);
        assert_eq!(resolve(i), resolve(i));
    }

    #[test]
    fn test_routes() {
        assert_eq!(NavigationState::Loading.route(), "Splash");
        assert_eq!(NavigationState::Onboarding.route(), "AddBaby");
        assert_eq!(NavigationState::Main.to_string(), "Main");
    }

    #[test]
    fn test_driver_is_idempotent() {
        let mut d = NavigationDriver::new();
        assert_eq!(d.observe(NavigationState::Loading), Some(NavigationState::Loading));
        assert_eq!(d.observe(NavigationState::Loading), None);
        assert_eq!(d.observe(NavigationState::Main), Some(NavigationState::Main));
        assert_eq!(d.observe(NavigationState::Main), None);
        assert_eq!(d.transitions(), 2);
        assert_eq!(d.current(), Some(NavigationState::Main));
    }
}
