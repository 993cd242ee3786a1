//! Single-flight credential refresh.
//!
//! However many request flows observe an expired credential at once, at
//! most one refresh call is in flight. Later arrivals suspend on the flow
//! gate and pick up the finished refresh from session state instead of
//! issuing their own call, so every caller sees the most recently completed
//! refresh.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::session::{SessionEvent, SessionHandle};
use crate::types::CredentialPair;
use crate::wire::IdentityClient;

pub(crate) struct RefreshCoordinator {
    session: Arc<SessionHandle>,
    identity: Arc<IdentityClient>,
    leeway: time::Duration,
    /// Flow gate: held for the duration of one refresh wire call. Waiters
    /// form the pending-request queue.
    gate: Mutex<()>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        session: Arc<SessionHandle>,
        identity: Arc<IdentityClient>,
        leeway: time::Duration,
    ) -> Self {
        Self {
            session,
            identity,
            leeway,
            gate: Mutex::new(()),
        }
    }

    /// Credentials that are safe to attach, renewing first when the stored
    /// pair is at or past its leeway window.
    pub(crate) async fn ensure_fresh(&self) -> Result<CredentialPair, Error> {
        self.ensure(None).await
    }

    /// Same, but treat `rejected` as expired regardless of its stated
    /// deadline: the server already refused it. A caller that queued behind
    /// a refresh completed by another flow picks up the newer pair here
    /// without a second wire call.
    pub(crate) async fn ensure_fresh_after_reject(
        &self,
        rejected: &str,
    ) -> Result<CredentialPair, Error> {
        self.ensure(Some(rejected)).await
    }

    fn usable(&self, rejected: Option<&str>) -> Option<CredentialPair> {
        self.session
            .fresh_credentials(self.leeway)
            .filter(|pair| rejected.is_none_or(|token| pair.access_token != token))
    }

    async fn ensure(&self, rejected: Option<&str>) -> Result<CredentialPair, Error> {
        if let Some(pair) = self.usable(rejected) {
            return Ok(pair);
        }

        let _flight = self.gate.lock().await;

        // Whoever held the gate before us may have already renewed the pair.
        if let Some(pair) = self.usable(rejected) {
            return Ok(pair);
        }

        self.refresh_holding_gate().await
    }

    /// The actual wire refresh. Runs with the gate held, so at most one of
    /// these is in flight at any time.
    async fn refresh_holding_gate(&self) -> Result<CredentialPair, Error> {
        let Some(current) = self.session.credentials() else {
            // Anonymous, Expired, or a logout that raced us.
            return Err(Error::SessionExpired);
        };
        if self.session.apply(SessionEvent::RefreshStarted).is_none() {
            return Err(Error::SessionExpired);
        }

        debug!("renewing access credential");
        match self.identity.refresh(&current.refresh_token).await {
            Ok(pair) => {
                let applied = self
                    .session
                    .apply(SessionEvent::RefreshSucceeded { pair: pair.clone() });
                if applied.is_none() {
                    // Logout landed while the call was in flight; the new
                    // pair belongs to a session that no longer exists.
                    return Err(Error::SessionExpired);
                }
                Ok(pair)
            }
            Err(Error::SessionExpired) => {
                error!("refresh credential rejected; session expired");
                self.session.apply(SessionEvent::RefreshDenied);
                Err(Error::SessionExpired)
            }
            Err(err) => {
                // Transient transport or server failure: keep the session
                // and its pair, surface the error to the caller.
                warn!(error = %err, "credential refresh failed transiently");
                self.session.apply(SessionEvent::RefreshAborted);
                Err(err)
            }
        }
    }
}
