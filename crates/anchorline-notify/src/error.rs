//! Error types for the notification layer.

/// Errors that can occur on the push channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Opening the connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// A frame or persisted history entry did not decode.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading or writing the persisted history failed.
    #[error(transparent)]
    Storage(#[from] anchorline_session::StorageError),
}
