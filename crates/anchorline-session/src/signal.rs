//! Signals from the transport back to the session manager.
//!
//! The transport sees authentication problems first (a request it had
//! to short-circuit, a 401 from the server), but it must not mutate the
//! session itself. It raises an [`AuthSignal`] instead and the manager,
//! the store's only writer, decides what to do.

use tokio::sync::mpsc;

/// Something the transport noticed about the current credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthSignal {
    /// A request was about to go out with an expired or undecodable
    /// credential. The session should be torn down.
    CredentialExpired,
    /// The credential is inside the skew window. Refresh proactively.
    NearExpiry,
    /// The server answered 401. Try a refresh.
    Unauthorized,
}

/// Sending half, held by the transport. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuthSignals {
    tx: mpsc::UnboundedSender<AuthSignal>,
}

/// Receiving half, handed to
/// [`SessionManager::start`](crate::SessionManager::start).
#[derive(Debug)]
pub struct AuthSignalReceiver {
    rx: mpsc::UnboundedReceiver<AuthSignal>,
}

impl AuthSignals {
    /// Creates a connected sender/receiver pair.
    pub fn channel() -> (Self, AuthSignalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, AuthSignalReceiver { rx })
    }

    /// A sender nobody listens to.
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Raises a signal. Never blocks; a missing listener is only logged.
    pub fn emit(&self, signal: AuthSignal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!(?signal, "auth signal dropped, no session manager listening");
        }
    }
}

impl AuthSignalReceiver {
    pub async fn recv(&mut self) -> Option<AuthSignal> {
        self.rx.recv().await
    }

    /// Takes a signal that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<AuthSignal> {
        self.rx.try_recv().ok()
    }
}
