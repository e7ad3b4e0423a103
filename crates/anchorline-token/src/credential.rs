//! The raw bearer credential.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque bearer credential as issued by the identity provider.
///
/// The wrapper exists so the raw string cannot end up in a log line by
/// accident: `Debug` and `Display` both print a placeholder. Use
/// [`expose`](Self::expose) where the actual value is needed (the
/// `Authorization` header, the push channel's auth frame).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw credential string.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
