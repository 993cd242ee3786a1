//! Authentication state machine and its shared handle.
//!
//! `SessionState` is the single source of truth for the process: which phase
//! the session is in and which credentials and profile it holds.
//! `SessionHandle` wraps it with the credential store and the observer
//! channel so that every applied transition persists and notifies in the
//! order it occurred.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::store::CredentialStore;
use crate::types::{CredentialPair, UserProfile};

/// Current phase of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No credentials.
    Anonymous,
    /// A login call is outstanding.
    Authenticating,
    /// Holding credentials, valid until proven otherwise.
    Authenticated,
    /// A refresh call is in flight.
    Refreshing,
    /// The session cannot be renewed; only a fresh login recovers.
    Expired,
}

/// A phase change reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// Session lifecycle events.
///
/// Applying an event that is not valid for the current phase is a no-op,
/// not an error: network responses race logout, and a stale outcome must be
/// discarded without touching state that has already moved on.
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    LoginStarted,
    LoginSucceeded {
        pair: CredentialPair,
        profile: UserProfile,
    },
    LoginFailed,
    RefreshStarted,
    RefreshSucceeded {
        pair: CredentialPair,
    },
    /// The refresh credential itself was rejected. Terminal.
    RefreshDenied,
    /// The refresh call failed transiently (transport or 5xx); the session
    /// keeps its current pair and the caller may retry.
    RefreshAborted,
    /// A replayed request failed authorization again. Terminal.
    SessionInvalidated,
    LoggedOut,
}

#[derive(Debug, Clone)]
struct SessionState {
    phase: Phase,
    credentials: Option<CredentialPair>,
    profile: Option<UserProfile>,
}

impl SessionState {
    fn anonymous() -> Self {
        Self {
            phase: Phase::Anonymous,
            credentials: None,
            profile: None,
        }
    }

    /// A stored pair starts the session Authenticated optimistically;
    /// validity is checked by the first guarded request, not eagerly.
    fn rehydrated(pair: CredentialPair, profile: UserProfile) -> Self {
        Self {
            phase: Phase::Authenticated,
            credentials: Some(pair),
            profile: Some(profile),
        }
    }

    /// Total transition function over (phase, event). Returns the resulting
    /// transition, or `None` when the event does not apply to the current
    /// phase.
    fn apply(&mut self, event: &SessionEvent) -> Option<Transition> {
        use Phase::{Anonymous, Authenticated, Authenticating, Expired, Refreshing};

        let from = self.phase;
        let to = match (from, event) {
            (Anonymous | Expired, SessionEvent::LoginStarted) => {
                self.credentials = None;
                self.profile = None;
                Authenticating
            }
            (Authenticating, SessionEvent::LoginSucceeded { pair, profile }) => {
                self.credentials = Some(pair.clone());
                self.profile = Some(profile.clone());
                Authenticated
            }
            (Authenticating, SessionEvent::LoginFailed) => Anonymous,
            (Authenticated, SessionEvent::RefreshStarted) => Refreshing,
            (Refreshing, SessionEvent::RefreshSucceeded { pair }) => {
                self.credentials = Some(pair.clone());
                Authenticated
            }
            (Refreshing, SessionEvent::RefreshDenied) => {
                self.credentials = None;
                self.profile = None;
                Expired
            }
            (Refreshing, SessionEvent::RefreshAborted) => Authenticated,
            (Authenticated | Refreshing, SessionEvent::SessionInvalidated) => {
                self.credentials = None;
                self.profile = None;
                Expired
            }
            // Logout cancels the session unconditionally, from any phase
            // that still has anything to cancel.
            (Authenticating | Authenticated | Refreshing | Expired, SessionEvent::LoggedOut) => {
                self.credentials = None;
                self.profile = None;
                Anonymous
            }
            _ => return None,
        };
        self.phase = to;
        Some(Transition { from, to })
    }
}

/// Shared session record plus its persistence and notification side
/// effects. Owned exclusively by the manager; the lock is never held across
/// an await point.
pub(crate) struct SessionHandle {
    state: parking_lot::Mutex<SessionState>,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<Transition>,
}

/// Buffered transitions per subscriber before the oldest are dropped.
const OBSERVER_BUFFER: usize = 64;

impl SessionHandle {
    pub(crate) fn new(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let state = match store.get() {
            Some(record) => {
                debug!("rehydrated persisted session");
                let (pair, profile) = record.into_parts();
                SessionState::rehydrated(pair, profile)
            }
            None => SessionState::anonymous(),
        };
        let (events, _) = broadcast::channel(OBSERVER_BUFFER);
        Arc::new(Self {
            state: parking_lot::Mutex::new(state),
            store,
            events,
        })
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.events.subscribe()
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub(crate) fn profile(&self) -> Option<UserProfile> {
        self.state.lock().profile.clone()
    }

    pub(crate) fn credentials(&self) -> Option<CredentialPair> {
        self.state.lock().credentials.clone()
    }

    /// Credentials that are safe to attach without renewal: the session is
    /// Authenticated and the pair keeps at least `leeway` of validity.
    pub(crate) fn fresh_credentials(&self, leeway: time::Duration) -> Option<CredentialPair> {
        let state = self.state.lock();
        if state.phase != Phase::Authenticated {
            return None;
        }
        state
            .credentials
            .as_ref()
            .filter(|pair| pair.fresh_for(leeway))
            .cloned()
    }

    /// Apply an event. On a real transition the event's persistence side
    /// effect runs and observers are notified, all in transition order;
    /// a stale event does nothing and returns `None`.
    pub(crate) fn apply(&self, event: SessionEvent) -> Option<Transition> {
        let mut state = self.state.lock();
        let transition = state.apply(&event)?;

        match &event {
            SessionEvent::LoginSucceeded { pair, profile } => self.store.set(pair, profile),
            SessionEvent::RefreshSucceeded { pair } => {
                // The profile is untouched by a refresh; re-persist it with
                // the new pair. Refreshing implies a profile is present.
                match &state.profile {
                    Some(profile) => self.store.set(pair, profile),
                    None => self.store.clear(),
                }
            }
            SessionEvent::RefreshDenied
            | SessionEvent::SessionInvalidated
            | SessionEvent::LoggedOut => self.store.clear(),
            SessionEvent::LoginStarted
            | SessionEvent::LoginFailed
            | SessionEvent::RefreshStarted
            | SessionEvent::RefreshAborted => {}
        }

        debug!(from = ?transition.from, to = ?transition.to, "session transition");
        // Sent while holding the lock so observers see transitions in the
        // order they occurred. Send fails only without subscribers.
        let _ = self.events.send(transition);
        Some(transition)
    }

    /// Replace the profile wholesale after a fetch, re-persisting alongside
    /// the current pair. No phase change, no notification.
    pub(crate) fn replace_profile(&self, profile: &UserProfile) {
        let mut state = self.state.lock();
        if state.phase != Phase::Authenticated && state.phase != Phase::Refreshing {
            return;
        }
        let Some(pair) = state.credentials.clone() else {
            return;
        };
        state.profile = Some(profile.clone());
        self.store.set(&pair, profile);
    }
}
