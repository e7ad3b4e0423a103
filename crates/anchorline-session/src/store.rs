//! The session store: the client's single source of truth for who is
//! signed in.
//!
//! # Writers and readers
//!
//! Only [`SessionManager`](crate::SessionManager) writes (the mutators
//! are crate-private). Everyone else holds a cloned `SessionStore` and
//! reads through [`get`](SessionStore::get) /
//! [`credential`](SessionStore::credential), or registers a callback
//! with [`subscribe`](SessionStore::subscribe).
//!
//! Every write notifies subscribers synchronously, in registration
//! order, before returning. By the time a transition returns, the
//! transport's next request already sees the new credential.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use anchorline_token::Credential;

use crate::{ClientStorage, SessionState, StorageSlot};

type Subscriber = Arc<dyn Fn(&SessionState) + Send + Sync>;

struct StoreInner {
    state: RwLock<SessionState>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber: AtomicU64,
    storage: Arc<dyn ClientStorage>,
}

/// Shared handle to the session state. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Creates an unauthenticated store persisting into `storage`.
    ///
    /// A credential left in storage by a previous run is not loaded
    /// here; [`SessionManager::resume`](crate::SessionManager::resume)
    /// validates it first.
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(SessionState::default()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
                storage,
            }),
        }
    }

    /// A snapshot of the current state.
    pub fn get(&self) -> SessionState {
        self.read().clone()
    }

    /// The current credential, if signed in.
    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    /// The storage backend shared with other layers.
    pub fn storage(&self) -> Arc<dyn ClientStorage> {
        Arc::clone(&self.inner.storage)
    }

    /// Registers `f` to run after every state change.
    ///
    /// The callback runs on the writer's thread while the transition is
    /// being committed, so it must be quick and must not call back into
    /// the session manager.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push((id, Arc::new(f)));
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Reads the credential persisted by a previous run, if any.
    pub(crate) fn persisted_credential(&self) -> Option<Credential> {
        match self.inner.storage.load(StorageSlot::Credential) {
            Ok(raw) => raw.filter(|r| !r.trim().is_empty()).map(Credential::new),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted credential");
                None
            }
        }
    }

    /// Replaces the state, persists the credential slot, and notifies
    /// subscribers.
    pub(crate) fn set(&self, next: SessionState) {
        let changed_credential = {
            let mut state =
                self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            let changed = state.credential != next.credential;
            *state = next.clone();
            changed
        };

        if changed_credential {
            let result = match &next.credential {
                Some(credential) => self
                    .inner
                    .storage
                    .save(StorageSlot::Credential, credential.expose()),
                None => self.inner.storage.remove(StorageSlot::Credential),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to persist credential");
            }
        }

        tracing::debug!(phase = %next.phase, "session state changed");
        self.notify(&next);
    }

    /// Clears the credential, the identity and every persisted slot,
    /// then notifies subscribers with the unauthenticated state.
    pub(crate) fn teardown(&self, reason: Option<String>) {
        if let Err(e) = self.inner.storage.clear() {
            tracing::warn!(error = %e, "failed to clear client storage");
        }
        self.set(SessionState::unauthenticated(reason));
    }

    fn notify(&self, state: &SessionState) {
        // Snapshot so a callback may unsubscribe (itself or others)
        // without deadlocking or disturbing this pass.
        let snapshot: Vec<Subscriber> = self
            .subscribers()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for subscriber in snapshot {
            subscriber(state);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Subscriber)>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`SessionStore::subscribe`].
///
/// Dropping it keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
