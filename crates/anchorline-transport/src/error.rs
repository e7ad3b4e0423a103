//! Error types for the transport layer.

use std::time::Duration;

/// Classified failures of a transport call.
///
/// Every non-success outcome maps to exactly one variant, so callers
/// can branch on what happened instead of on status codes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// No usable credential, or the server answered 401. The session
    /// manager has been signalled; the call is not replayed.
    #[error("authentication expired")]
    AuthExpired,

    /// 403.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// 404.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// 422, with whatever field detail the server provided.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        fields: Option<serde_json::Value>,
    },

    /// 429. The transport already waited `cooldown` before returning;
    /// the caller decides whether to try again.
    #[error("rate limited (cooled down for {cooldown:?})")]
    RateLimited { cooldown: Duration },

    /// 5xx or no response, after the retry budget ran out.
    #[error("transient network failure after {attempts} attempt(s): {last}")]
    TransientNetwork { attempts: u32, last: String },

    /// Any other non-success status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered 2xx with a body that does not decode.
    #[error("server returned an invalid payload: {0}")]
    ServerIntegrity(String),

    /// The caller cancelled while a retry or cooldown wait was pending.
    #[error("request cancelled")]
    Cancelled,

    /// The request could not be built (bad URL, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Returns `true` for failures a later, identical call may not hit.
    ///
    /// The transport has already spent its own retry budget on these by
    /// the time the caller sees them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns `true` when the failure means the user must sign in
    /// again (or at least wait for a refresh).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::Forbidden { .. })
    }
}

/// Failure of a single HTTP exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The per-request timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Connection refused, reset, DNS failure: nothing came back.
    #[error("no response: {0}")]
    NoResponse(String),

    /// The request itself is malformed. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
