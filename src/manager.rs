//! Session facade: the one surface application code talks to.
//!
//! Owns the session state, the credential store, and the refresh
//! coordinator. Everything else in the application reaches credentials only
//! through [`SessionManager`] and its [`RequestGateway`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::gateway::{ApiRequest, RequestGateway};
use crate::refresh::RefreshCoordinator;
use crate::session::{Phase, SessionEvent, SessionHandle, Transition};
use crate::store::CredentialStore;
use crate::types::UserProfile;
use crate::wire::{self, IdentityClient, NewAccount};

/// Facade over the session: owns login/logout, pure state reads, observer
/// registration, and access to the request gateway.
pub struct SessionManager {
    session: Arc<SessionHandle>,
    identity: Arc<IdentityClient>,
    gateway: RequestGateway,
}

impl SessionManager {
    /// Create a manager over the given store.
    ///
    /// A persisted session is rehydrated as Authenticated without a network
    /// call; the first guarded request discovers whether the stored pair is
    /// still honored. An absent or unreadable record starts Anonymous.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: Config, store: Arc<dyn CredentialStore>) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let session = SessionHandle::new(store);
        let identity = Arc::new(IdentityClient::new(http.clone(), config.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            session.clone(),
            identity.clone(),
            config.refresh_leeway,
        ));
        let gateway = RequestGateway::new(http, config, session.clone(), coordinator);

        Ok(Self {
            session,
            identity,
            gateway,
        })
    }

    /// Manager with the default in-memory store.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn in_memory(config: Config) -> Result<Self, Error> {
        Self::new(config, Arc::new(crate::store::MemoryStore::new()))
    }

    /// Sign in with email and password.
    ///
    /// A lingering local session is superseded: it is cleared before the
    /// login call goes out.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for malformed input, [`Error::InvalidCredentials`]
    /// when the identity endpoint rejects the login, [`Error::Network`] on
    /// transport failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, Error> {
        validate_login_input(email, password)?;

        if !matches!(self.phase(), Phase::Anonymous | Phase::Expired) {
            self.session.apply(SessionEvent::LoggedOut);
        }
        if self.session.apply(SessionEvent::LoginStarted).is_none() {
            return Err(Error::Validation("a login is already in progress".into()));
        }

        match self.identity.login(email, password).await {
            Ok((pair, profile)) => {
                if self
                    .session
                    .apply(SessionEvent::LoginSucceeded {
                        pair,
                        profile: profile.clone(),
                    })
                    .is_none()
                {
                    // A logout raced the response; the credentials were
                    // discarded and this login did not take effect.
                    return Err(Error::SessionExpired);
                }
                info!(user_id = %profile.id, "login succeeded");
                Ok(profile)
            }
            Err(err) => {
                self.session.apply(SessionEvent::LoginFailed);
                Err(err)
            }
        }
    }

    /// Sign out.
    ///
    /// Local state is cleared and observers notified before the server-side
    /// revocation call, which is best effort: a client that cannot check
    /// out must still be able to leave. Revocation failures are logged and
    /// never surfaced.
    pub async fn logout(&self) {
        let refresh_token = self.session.credentials().map(|pair| pair.refresh_token);
        self.session.apply(SessionEvent::LoggedOut);

        if let Some(token) = refresh_token {
            if let Err(err) = self.identity.revoke(&token).await {
                warn!(error = %err, "refresh credential revocation failed");
            }
        }
    }

    /// Sign out of every device: revokes all of the account's sessions
    /// server-side, then clears local state unconditionally, exactly like
    /// [`logout`](Self::logout).
    pub async fn logout_all(&self) {
        let result = self
            .gateway
            .send(ApiRequest::post(wire::LOGOUT_ALL_PATH))
            .await;
        self.session.apply(SessionEvent::LoggedOut);
        if let Err(err) = result {
            warn!(error = %err, "logout-all revocation failed");
        }
    }

    /// Create a new account. Does not sign the user in; call
    /// [`login`](Self::login) afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the server rejects the payload (including
    /// an already-registered email), [`Error::Network`] on transport
    /// failure.
    pub async fn register(&self, account: &NewAccount) -> Result<(), Error> {
        self.identity.register(account).await
    }

    /// Fetch the profile from the identity endpoint and replace the stored
    /// copy wholesale.
    ///
    /// # Errors
    ///
    /// As a guarded request: [`Error::SessionExpired`], [`Error::Network`],
    /// [`Error::Validation`], or [`Error::Server`].
    pub async fn fetch_profile(&self) -> Result<UserProfile, Error> {
        let profile: UserProfile = self
            .gateway
            .send_json(ApiRequest::get(wire::ME_PATH))
            .await?;
        self.session.replace_profile(&profile);
        Ok(profile)
    }

    /// Current profile, if signed in. Pure read, never suspends.
    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.profile()
    }

    /// Whether a usable session exists. True while Authenticated or mid
    /// refresh; false once terminally Expired. Pure read, never suspends.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase(), Phase::Authenticated | Phase::Refreshing)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Whether the signed-in user carries the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.current_user().is_some_and(|profile| profile.has_role(role))
    }

    /// Shorthand for `has_role("ROLE_ADMIN")`.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.current_user().is_some_and(|profile| profile.is_admin())
    }

    /// Subscribe to phase transitions. Every subscriber sees every
    /// transition in the order it occurred. A UI typically redirects to its
    /// sign-in view on a transition into [`Phase::Expired`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.session.subscribe()
    }

    /// Gateway for guarded application requests.
    #[must_use]
    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }
}

fn validate_login_input(email: &str, password: &str) -> Result<(), Error> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(Error::Validation("a valid email address is required".into()));
    }
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".into()));
    }
    Ok(())
}
