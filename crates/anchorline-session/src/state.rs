//! Session state: what the store holds and what subscribers see.

use std::fmt;
use std::time::Duration;

use anchorline_token::{Credential, DEFAULT_SKEW, Identity};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing knobs for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long before literal expiry a credential counts as
    /// near-expiry and gets refreshed proactively.
    ///
    /// Default: 300 seconds.
    pub skew: Duration,

    /// How often the stored credential is re-checked while signed in.
    ///
    /// Default: 5 minutes.
    pub revalidate_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            skew: DEFAULT_SKEW,
            revalidate_interval: Duration::from_secs(5 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///   Unauthenticated ──(login)──→ Authenticating ──(ok)──→ Authenticated
///         ↑                            │                    │      ↑
///         └──────────(failure)─────────┘             (refresh)    (ok)
///         ↑                                                 ↓      │
///         └──────────────(failure / logout)────────────── Refreshing
/// ```
///
/// `Refreshing` keeps the identity so the UI can keep showing who is
/// signed in while the new credential is fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated(Identity),
    Refreshing(Identity),
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated(_) => write!(f, "authenticated"),
            Self::Refreshing(_) => write!(f, "refreshing"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The full session snapshot held by the store.
///
/// Exactly one exists per client. Readers get clones; only the session
/// manager replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// The bearer credential, present while authenticated or refreshing.
    pub credential: Option<Credential>,
    /// Why the last transition failed, if it did.
    pub last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::unauthenticated(None)
    }
}

impl SessionState {
    pub fn unauthenticated(last_error: Option<String>) -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            credential: None,
            last_error,
        }
    }

    pub(crate) fn authenticating() -> Self {
        Self {
            phase: SessionPhase::Authenticating,
            credential: None,
            last_error: None,
        }
    }

    pub(crate) fn authenticated(
        identity: Identity,
        credential: Credential,
    ) -> Self {
        Self {
            phase: SessionPhase::Authenticated(identity),
            credential: Some(credential),
            last_error: None,
        }
    }

    /// `true` while a credential is held (including mid-refresh).
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Authenticated(_) | SessionPhase::Refreshing(_)
        )
    }

    /// The signed-in identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.phase {
            SessionPhase::Authenticated(identity)
            | SessionPhase::Refreshing(identity) => Some(identity),
            _ => None,
        }
    }
}
