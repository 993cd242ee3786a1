//! Guarded request dispatch.
//!
//! Every application request goes through [`RequestGateway::send`]: the
//! current access credential is attached, an authorization failure triggers
//! a (single-flighted) refresh, and the request is replayed exactly once
//! with the renewed credential.

use std::sync::Arc;

use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::refresh::RefreshCoordinator;
use crate::session::{SessionEvent, SessionHandle};
use crate::wire;

/// Re-export of the HTTP method type used by [`ApiRequest::new`].
pub use reqwest::Method;

/// Immutable description of one guarded API request.
///
/// Retry accounting is carried here explicitly instead of being flagged
/// onto mutable transport state: a request is replayed at most once after
/// an authorization failure, and the bound cannot be lost between code
/// paths.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    /// Request for `path`, resolved relative to the configured base URL.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the value cannot be represented as
    /// JSON.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::Validation(format!("request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Whether this request has already been replayed once.
    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// Dispatches application requests with credential attachment, refresh on
/// authorization failure, and at-most-once replay.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct RequestGateway {
    http: reqwest::Client,
    config: Config,
    session: Arc<SessionHandle>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestGateway {
    pub(crate) fn new(
        http: reqwest::Client,
        config: Config,
        session: Arc<SessionHandle>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http,
            config,
            session,
            coordinator,
        }
    }

    /// Send a guarded request.
    ///
    /// Responses other than 401 are returned as-is, including other error
    /// statuses; use [`send_json`](Self::send_json) for envelope decoding
    /// and error classification.
    ///
    /// # Errors
    ///
    /// [`Error::SessionExpired`] when the credential cannot be renewed or
    /// the replayed request is rejected again; [`Error::Network`] on
    /// transport failure.
    pub async fn send(&self, request: ApiRequest) -> Result<Response, Error> {
        let pair = self.coordinator.ensure_fresh().await?;
        let response = self.dispatch(&request, &pair.access_token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        self.replay(request, &pair.access_token).await
    }

    /// Send a guarded request and decode the response envelope into `T`.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus [`Error::Validation`] for 4xx and
    /// [`Error::Server`] for 5xx or envelope-level failure.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, Error> {
        let response = self.send(request).await?;
        wire::decode_envelope(response).await
    }

    /// A 401 means the access credential expired between issuance and use.
    /// Renew (coalescing with any refresh already in flight) and replay
    /// exactly once.
    async fn replay(&self, request: ApiRequest, rejected: &str) -> Result<Response, Error> {
        if request.retried() {
            // The one replay is already spent. Bounds retry storms when the
            // server is rejecting every token.
            self.session.apply(SessionEvent::SessionInvalidated);
            return Err(Error::SessionExpired);
        }

        debug!(path = %request.path, "authorization failed, renewing credential and replaying");
        let pair = self.coordinator.ensure_fresh_after_reject(rejected).await?;

        let retry = request.into_retry();
        let response = self.dispatch(&retry, &pair.access_token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.session.apply(SessionEvent::SessionInvalidated);
            return Err(Error::SessionExpired);
        }
        Ok(response)
    }

    async fn dispatch(&self, request: &ApiRequest, access_token: &str) -> Result<Response, Error> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.config.endpoint(&request.path))
            .bearer_auth(access_token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_accumulates() {
        let request = ApiRequest::get("accounts")
            .with_query("page", "2")
            .with_query("size", "10");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path(), "accounts");
        assert_eq!(request.query.len(), 2);
        assert!(!request.retried());
    }

    #[test]
    fn retry_flag_is_explicit_and_one_way() {
        let request = ApiRequest::post("transfers");
        assert!(!request.retried());
        let replayed = request.into_retry();
        assert!(replayed.retried());
    }

    #[test]
    fn json_body_is_captured() {
        let request = ApiRequest::post("transfers")
            .with_json(&serde_json::json!({"amount": 10}))
            .unwrap();
        assert_eq!(request.body.unwrap()["amount"], 10);
    }
}
