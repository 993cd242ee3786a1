use url::Url;

use crate::error::Error;

const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Client configuration for the FinBank API.
///
/// The required field is a constructor parameter; everything else has a
/// default and can be overridden by chaining.
///
/// ```rust,ignore
/// use finbank_session::Config;
///
/// let config = Config::new("https://api.finbank.example/api/".parse()?)
///     .with_refresh_leeway(std::time::Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) base_url: Url,
    pub(crate) refresh_leeway: time::Duration,
    pub(crate) user_agent: String,
    pub(crate) timeout: Option<std::time::Duration>,
}

impl Config {
    /// Create a configuration for the given API base URL.
    ///
    /// Endpoint paths are joined onto the base, so a path component such as
    /// `/api` is preserved. A missing trailing slash is added.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            refresh_leeway: time::Duration::seconds(30),
            user_agent: DEFAULT_USER_AGENT.into(),
            timeout: None,
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `FINBANK_API_URL`: API base URL (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `FINBANK_REFRESH_LEEWAY_SECS`: seconds of remaining validity below
    ///   which the access token is renewed before use (default 30)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `FINBANK_API_URL` is missing or invalid,
    /// or if `FINBANK_REFRESH_LEEWAY_SECS` is not a number.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("FINBANK_API_URL")
            .map_err(|_| Error::Config("FINBANK_API_URL is required".into()))?;
        let base_url: Url = base_url
            .parse()
            .map_err(|e| Error::Config(format!("FINBANK_API_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Ok(secs) = std::env::var("FINBANK_REFRESH_LEEWAY_SECS") {
            let secs: u32 = secs
                .parse()
                .map_err(|e| Error::Config(format!("FINBANK_REFRESH_LEEWAY_SECS: {e}")))?;
            config.refresh_leeway = time::Duration::seconds(i64::from(secs));
        }

        Ok(config)
    }

    /// Renew the access token when less than this much validity remains.
    #[must_use]
    pub fn with_refresh_leeway(mut self, leeway: std::time::Duration) -> Self {
        let secs = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);
        self.refresh_leeway = time::Duration::seconds(secs);
        self
    }

    /// Override the `User-Agent` header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a per-request timeout on the underlying HTTP client.
    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an endpoint path relative to the base.
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        self.base_url
            .join(path.trim_start_matches('/'))
            .expect("base URL accepts relative paths")
    }
}
