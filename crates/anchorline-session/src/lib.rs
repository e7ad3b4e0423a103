//! Session lifecycle for Anchorline clients.
//!
//! This crate owns the one piece of mutable state every other layer
//! reads: who is signed in.
//!
//! 1. **Store** ([`SessionStore`]): the current [`SessionState`], with
//!    synchronous change notification and client-local persistence.
//! 2. **Provider seam** ([`IdentityProvider`]): the server calls the
//!    session needs (login, refresh, logout notification, profile,
//!    health). The HTTP implementation lives in the transport crate.
//! 3. **Manager** ([`SessionManager`]): the single writer. Drives
//!    login, refresh, logout, resume and the periodic re-validation,
//!    and reacts to [`AuthSignal`]s raised by the transport.
//!
//! # How it fits in the stack
//!
//! ```text
//! Transport / Notifications (above)  ← read the store, raise AuthSignals
//!     ↕
//! Session layer (this crate)  ← owns credential + identity
//!     ↕
//! Token layer (below)  ← decodes and classifies credentials
//! ```

mod error;
mod manager;
mod provider;
mod signal;
mod state;
mod storage;
mod store;

pub use error::{SessionError, StorageError};
pub use manager::SessionManager;
pub use provider::{IdentityProvider, LoginResponse};
pub use signal::{AuthSignal, AuthSignalReceiver, AuthSignals};
pub use state::{SessionConfig, SessionPhase, SessionState};
pub use storage::{ClientStorage, FileStorage, MemoryStorage, StorageSlot};
pub use store::{SessionStore, Subscription};
