//! Wire contract of the identity endpoint.
//!
//! JSON over HTTP with a uniform response envelope
//! (`{success, message, data, timestamp, status, error}`). HTTP statuses are
//! mapped to the typed error taxonomy here, so no other layer inspects raw
//! responses or matches on server message text.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::Config;
use crate::error::Error;
use crate::types::{CredentialPair, UserId, UserProfile};

pub(crate) const LOGIN_PATH: &str = "auth/login";
pub(crate) const REFRESH_PATH: &str = "auth/refresh-token";
pub(crate) const LOGOUT_PATH: &str = "auth/logout";
pub(crate) const LOGOUT_ALL_PATH: &str = "auth/logout-all";
pub(crate) const REGISTER_PATH: &str = "auth/register";
pub(crate) const ME_PATH: &str = "auth/me";

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct Envelope<T> {
    pub(crate) success: bool,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) data: Option<T>,
    #[serde(default)]
    pub(crate) status: Option<u16>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Payload for `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl NewAccount {
    /// Create a registration payload. Role assignment is left to the server
    /// unless overridden with [`with_roles`](Self::with_roles).
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        phone_number: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
            phone_number: phone_number.into(),
            address: address.into(),
            roles: None,
        }
    }

    /// Request specific roles for the new account.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwtResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    roles: Vec<String>,
}

impl JwtResponse {
    fn into_parts(self) -> (CredentialPair, UserProfile) {
        let pair = CredentialPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: deadline(self.expires_in),
        };
        let profile = UserProfile {
            id: UserId(self.id),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            roles: self.roles,
        };
        (pair, profile)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

/// Absolute deadline for a token issued now with the given lifetime.
fn deadline(expires_in_secs: u64) -> OffsetDateTime {
    let secs = i64::try_from(expires_in_secs).unwrap_or(i64::MAX);
    OffsetDateTime::now_utc() + time::Duration::seconds(secs)
}

/// HTTP client for the identity endpoint itself: login, refresh,
/// registration, revocation. Guarded application traffic goes through
/// [`RequestGateway`](crate::gateway::RequestGateway) instead.
#[derive(Debug)]
pub(crate) struct IdentityClient {
    http: reqwest::Client,
    config: Config,
}

impl IdentityClient {
    pub(crate) fn new(http: reqwest::Client, config: Config) -> Self {
        Self { http, config }
    }

    /// Exchange email and password for a credential pair and profile.
    ///
    /// 401 maps to [`Error::InvalidCredentials`]; other 4xx to
    /// [`Error::Validation`] with the server's message.
    pub(crate) async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(CredentialPair, UserProfile), Error> {
        let response = self
            .http
            .post(self.config.endpoint(LOGIN_PATH))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidCredentials);
        }
        if status.is_client_error() {
            return Err(Error::Validation(read_message(response).await));
        }
        if !status.is_success() {
            return Err(server_error(response).await);
        }

        let envelope: Envelope<JwtResponse> = response.json().await?;
        let jwt = unwrap_envelope(envelope, status.as_u16())?;
        Ok(jwt.into_parts())
    }

    /// Exchange the refresh token for a new credential pair.
    ///
    /// Any 4xx means the refresh credential itself was rejected and maps to
    /// [`Error::SessionExpired`]; 5xx and transport failures are transient.
    pub(crate) async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair, Error> {
        let response = self
            .http
            .post(self.config.endpoint(REFRESH_PATH))
            .json(&TokenRefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            return Err(Error::SessionExpired);
        }
        if !status.is_success() {
            return Err(server_error(response).await);
        }

        let envelope: Envelope<TokenRefreshResponse> = response.json().await?;
        let tokens = unwrap_envelope(envelope, status.as_u16())?;
        Ok(CredentialPair {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: deadline(tokens.expires_in),
        })
    }

    /// Revoke a refresh token server-side. Callers treat failures as
    /// best-effort; local logout never depends on this call.
    pub(crate) async fn revoke(&self, refresh_token: &str) -> Result<(), Error> {
        let response = self
            .http
            .post(self.config.endpoint(LOGOUT_PATH))
            .query(&[("refreshToken", refresh_token)])
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(server_error(response).await)
        }
    }

    /// Create a new account. Does not sign the user in.
    pub(crate) async fn register(&self, account: &NewAccount) -> Result<(), Error> {
        let response = self
            .http
            .post(self.config.endpoint(REGISTER_PATH))
            .json(account)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            // 409 for a duplicate email, 400 for rejected field values
            return Err(Error::Validation(read_message(response).await));
        }
        if !status.is_success() {
            return Err(server_error(response).await);
        }

        let envelope: Envelope<serde_json::Value> = response.json().await?;
        if envelope.success {
            Ok(())
        } else {
            Err(envelope_failure(&envelope, status.as_u16()))
        }
    }
}

/// Decode a 2xx guarded response's envelope into `T`, or classify a non-2xx
/// status. 401 never reaches this point; the gateway consumes it.
pub(crate) async fn decode_envelope<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let status = response.status();
    if status.is_client_error() {
        return Err(Error::Validation(read_message(response).await));
    }
    if !status.is_success() {
        return Err(server_error(response).await);
    }
    let envelope: Envelope<T> = response.json().await?;
    unwrap_envelope(envelope, status.as_u16())
}

fn unwrap_envelope<T>(envelope: Envelope<T>, http_status: u16) -> Result<T, Error> {
    if !envelope.success {
        return Err(envelope_failure(&envelope, http_status));
    }
    envelope.data.ok_or(Error::Server {
        status: http_status,
        message: "response envelope is missing data".into(),
    })
}

fn envelope_failure<T>(envelope: &Envelope<T>, http_status: u16) -> Error {
    Error::Server {
        status: envelope.status.unwrap_or(http_status),
        message: envelope
            .message
            .clone()
            .or_else(|| envelope.error.clone())
            .unwrap_or_else(|| "request failed".into()),
    }
}

/// Best server-provided message for a failed response, falling back to the
/// status line.
async fn read_message(response: Response) -> String {
    let status = response.status();
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string()
    };
    match response.json::<Envelope<serde_json::Value>>().await {
        Ok(envelope) => envelope.message.or(envelope.error).unwrap_or_else(fallback),
        Err(_) => fallback(),
    }
}

async fn server_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let message = read_message(response).await;
    Error::Server { status, message }
}
