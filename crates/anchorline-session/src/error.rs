//! Error types for the session layer.

/// Errors surfaced by [`SessionManager`](crate::SessionManager) and
/// [`IdentityProvider`](crate::IdentityProvider) implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Caller-supplied input is empty or malformed. Never retried, and
    /// raised before anything touches the network.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The identity provider could not be reached.
    #[error("server unreachable: {0}")]
    Connectivity(String),

    /// The server answered with a credential or payload that does not
    /// decode. Always fatal to the current operation.
    #[error("server returned an invalid response: {0}")]
    ServerIntegrity(String),

    /// The server refused the request (bad secret, revoked credential).
    #[error("rejected by identity provider: {0}")]
    Rejected(String),

    /// Another login or refresh is already in flight.
    #[error("another session transition is in progress")]
    Busy,

    /// Refresh failed; the session has been torn down and the user must
    /// sign in again.
    #[error("refresh failed, session ended: {0}")]
    RefreshFailed(String),

    /// The operation needs a signed-in session and there is none.
    #[error("no authenticated session")]
    NotAuthenticated,

    /// A logout happened while this transition was in flight. Its
    /// result was discarded.
    #[error("session ended while the operation was in flight")]
    Superseded,
}

/// Failures reading or writing client-local storage.
///
/// The store logs these and carries on; they never fail a session
/// transition.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
