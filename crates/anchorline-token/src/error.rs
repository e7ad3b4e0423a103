//! Error types for the token layer.

/// Why a raw credential could not be decoded.
///
/// Callers treat every variant the same way they treat an expired
/// credential: the session cannot use it. The variants only exist so
/// logs say *what* was wrong with it.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The credential is not exactly three dot-separated segments.
    #[error("expected 3 segments, found {found}")]
    SegmentCount { found: usize },

    /// One of the segments is empty.
    #[error("{segment} segment is empty")]
    EmptySegment { segment: &'static str },

    /// A segment is not valid base64url.
    #[error("{segment} segment is not base64: {source}")]
    Base64 {
        segment: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    /// A segment decoded to bytes that are not the expected JSON.
    #[error("{segment} segment is not valid JSON: {source}")]
    Json {
        segment: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
