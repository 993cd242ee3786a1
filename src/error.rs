/// Error taxonomy for session and request failures.
///
/// Classification is structural (HTTP status plus call site); server
/// messages are carried for display but never inspected to decide a
/// variant.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity endpoint rejected the login. User-correctable.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Malformed input, caught locally or rejected by the server with a
    /// 4xx. User-correctable.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure. Transient; the same action is safe to retry.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The session cannot be renewed. Only a fresh login recovers.
    #[error("session expired, sign in again")]
    SessionExpired,

    /// Server-side failure (5xx, or a response envelope reporting
    /// failure). No local state changes.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
