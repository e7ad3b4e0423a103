//! Unified error type for the Anchorline client stack.

use anchorline_notify::NotifyError;
use anchorline_session::{SessionError, StorageError};
use anchorline_token::DecodeError;
use anchorline_transport::{BackendError, TransportError};

use crate::ConfigError;

/// Top-level error that wraps every layer's error.
///
/// Each variant is transparent, so the message is the layer's own and
/// `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum AnchorlineError {
    /// A credential did not decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A session transition failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Client-local storage could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A request failed after interception, classification and retries.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The HTTP backend could not be built.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The push channel failed.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Rejected("bad password".into());
        let wrapped: AnchorlineError = err.into();
        assert!(matches!(wrapped, AnchorlineError::Session(_)));
        assert!(wrapped.to_string().contains("bad password"));
    }

    #[test]
    fn test_from_transport_error() {
        let wrapped: AnchorlineError = TransportError::AuthExpired.into();
        assert!(matches!(wrapped, AnchorlineError::Transport(_)));
    }

    #[test]
    fn test_from_notify_error() {
        let wrapped: AnchorlineError = NotifyError::Connect("refused".into()).into();
        assert!(matches!(wrapped, AnchorlineError::Notify(_)));
        assert!(wrapped.to_string().contains("refused"));
    }

    #[test]
    fn test_from_config_error() {
        let wrapped: AnchorlineError =
            ConfigError::Invalid("ANCHORLINE_RETRY_ATTEMPTS").into();
        assert!(matches!(wrapped, AnchorlineError::Config(_)));
        assert!(wrapped.to_string().contains("ANCHORLINE_RETRY_ATTEMPTS"));
    }
}
