//! The session manager: the single writer of the session store.
//!
//! It is responsible for:
//! - Logging in (input checks, connectivity check, credential checks)
//! - Refreshing the credential, proactively or when the transport asks
//! - Logging out, locally and unconditionally
//! - Resuming a session persisted by a previous run
//! - Re-validating the stored credential every few minutes
//!
//! # Concurrency note
//!
//! Only one login/refresh transition runs at a time. A second one is
//! rejected with [`SessionError::Busy`] rather than queued. Logout is
//! not a transition: it always wins, and a login or refresh that was in
//! flight when it happened finds out on commit and discards its result
//! ([`SessionError::Superseded`]).
//!
//! Background work (the re-validation timer and the signal listener)
//! holds only a weak reference, is aborted on logout/shutdown, and dies
//! with the manager.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anchorline_token::{
    Clock, Credential, Identity, SystemClock, TokenCodec, TokenStatus,
};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    AuthSignal, AuthSignalReceiver, IdentityProvider, LoginResponse,
    SessionConfig, SessionError, SessionPhase, SessionState, SessionStore,
    Subscription,
};

/// Drives the session lifecycle.
///
/// ## Lifecycle
///
/// ```text
/// login() ──→ [Authenticating] ──→ [Authenticated] ──(every 5 min)──→ revalidate()
///                  │                  │     ↑                            │
///                  │          refresh()     └──────────(ok)──────────────┤
///                  │                  ↓                                  │
///                  └──(failure)──→ [Unauthenticated] ←──(refresh fails)──┘
///                                     ↑
///                     logout() ───────┘  (from anywhere, always succeeds)
/// ```
pub struct SessionManager<P: IdentityProvider> {
    inner: Arc<Inner<P>>,
}

impl<P: IdentityProvider> Clone for SessionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P> {
    provider: P,
    store: SessionStore,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    config: SessionConfig,

    /// Set while a login/refresh/resume is running.
    in_flight: AtomicBool,

    /// Bumped by every logout. A transition remembers the value it
    /// started with and refuses to commit if it changed.
    epoch: AtomicU64,

    /// Serializes "check epoch, write store" against logout.
    commit: Mutex<()>,

    revalidation: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<P> Drop for Inner<P> {
    fn drop(&mut self) {
        for slot in [&self.revalidation, &self.listener] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }
}

/// Clears the in-flight flag however the transition ends.
struct TransitionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<P: IdentityProvider> SessionManager<P> {
    /// Creates a manager using the system clock.
    pub fn new(provider: P, store: SessionStore, config: SessionConfig) -> Self {
        Self::with_clock(provider, store, config, Arc::new(SystemClock))
    }

    /// Creates a manager reading wall-clock time from `clock`.
    pub fn with_clock(
        provider: P,
        store: SessionStore,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                codec: TokenCodec::new(config.skew),
                clock,
                config,
                in_flight: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                commit: Mutex::new(()),
                revalidation: Mutex::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    pub fn current_state(&self) -> SessionState {
        self.inner.store.get()
    }

    /// Registers a callback for every session state change.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(f)
    }

    /// Starts listening for [`AuthSignal`]s raised by the transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, signals: AuthSignalReceiver) {
        let handle =
            tokio::spawn(signal_loop(Arc::downgrade(&self.inner), signals));
        if let Some(previous) = lock(&self.inner.listener).replace(handle) {
            previous.abort();
        }
    }

    /// Stops all background work. The session itself (and its persisted
    /// credential) is left as is, so the next run can resume it.
    pub fn shutdown(&self) {
        self.cancel_revalidation();
        if let Some(handle) = lock(&self.inner.listener).take() {
            handle.abort();
        }
        tracing::debug!("session manager shut down");
    }

    // =====================================================================
    // login
    // =====================================================================

    /// Signs in with user credentials.
    ///
    /// # Errors
    /// - [`SessionError::Validation`]: empty or malformed input; nothing
    ///   was sent
    /// - [`SessionError::Busy`]: another login/refresh is in flight
    /// - [`SessionError::Connectivity`]: the health check failed; login
    ///   is not retried
    /// - [`SessionError::ServerIntegrity`]: the returned credential does
    ///   not decode (or is already expired)
    /// - whatever the provider reports for a refused login
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Identity, SessionError> {
        validate_login_input(identifier, secret)?;
        let _guard = self.begin_transition()?;
        let epoch = self.epoch();
        let identifier = identifier.trim();

        {
            let _commit = lock(&self.inner.commit);
            self.inner.store.set(SessionState::authenticating());
        }
        tracing::info!("login started");

        if let Err(e) = self.inner.provider.health().await {
            let e = match e {
                SessionError::Connectivity(reason) => {
                    SessionError::Connectivity(reason)
                }
                other => SessionError::Connectivity(other.to_string()),
            };
            return Err(self.fail_transition(epoch, e));
        }

        let response = match self.inner.provider.login(identifier, secret).await
        {
            Ok(response) => response,
            Err(e) => return Err(self.fail_transition(epoch, e)),
        };

        let mut identity = match self.accept_credential(&response, None) {
            Ok(identity) => identity,
            Err(e) => return Err(self.fail_transition(epoch, e)),
        };

        if response.profile.is_none() {
            match self
                .inner
                .provider
                .current_identity(&response.credential)
                .await
            {
                Ok(profile) => identity = identity.with_profile(profile),
                Err(e) => tracing::debug!(
                    error = %e,
                    "profile fetch failed, using credential claims only"
                ),
            }
        }

        self.commit(epoch, identity.clone(), response.credential)?;
        self.ensure_revalidation();
        tracing::info!(subject = %identity.subject, "login succeeded");
        Ok(identity)
    }

    // =====================================================================
    // refresh
    // =====================================================================

    /// Swaps the current credential for a fresh one.
    ///
    /// There is no retry loop: if the refresh call fails for any reason
    /// the session is torn down and [`SessionError::RefreshFailed`] is
    /// returned.
    ///
    /// # Errors
    /// - [`SessionError::Busy`]: another login/refresh is in flight
    /// - [`SessionError::NotAuthenticated`]: nothing to refresh
    /// - [`SessionError::RefreshFailed`]: the session has been ended
    pub async fn refresh(&self) -> Result<Identity, SessionError> {
        let _guard = self.begin_transition()?;
        let epoch = self.epoch();

        let state = self.inner.store.get();
        let (identity, credential) = match (state.phase, state.credential) {
            (
                SessionPhase::Authenticated(identity)
                | SessionPhase::Refreshing(identity),
                Some(credential),
            ) => (identity, credential),
            _ => return Err(SessionError::NotAuthenticated),
        };

        {
            let _commit = lock(&self.inner.commit);
            if self.epoch() != epoch {
                return Err(SessionError::Superseded);
            }
            self.inner.store.set(SessionState {
                phase: SessionPhase::Refreshing(identity.clone()),
                credential: Some(credential.clone()),
                last_error: None,
            });
        }
        tracing::debug!(subject = %identity.subject, "refreshing credential");

        let outcome = match self.inner.provider.refresh(&credential).await {
            Ok(response) => self
                .accept_credential(&response, identity.profile.clone())
                .map(|fresh| (fresh, response.credential)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((fresh, credential)) => {
                self.commit(epoch, fresh.clone(), credential)?;
                tracing::info!(subject = %fresh.subject, "credential refreshed");
                Ok(fresh)
            }
            Err(e) => {
                if self.epoch() != epoch {
                    return Err(SessionError::Superseded);
                }
                tracing::warn!(error = %e, "refresh failed, ending session");
                self.end_session(Some(format!("refresh failed: {e}")));
                Err(SessionError::RefreshFailed(e.to_string()))
            }
        }
    }

    // =====================================================================
    // logout
    // =====================================================================

    /// Ends the session locally. Always succeeds and is idempotent.
    ///
    /// The server is told on a best-effort, fire-and-forget basis; the
    /// local teardown never waits for it.
    pub fn logout(&self) {
        self.end_session(None);
    }

    fn end_session(&self, reason: Option<String>) {
        self.cancel_revalidation();

        let credential = {
            let _commit = lock(&self.inner.commit);
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            let credential = self.inner.store.credential();
            self.inner.store.teardown(reason);
            credential
        };

        if let Some(credential) = credential {
            self.notify_logout(credential);
            tracing::info!("session ended");
        }
    }

    fn notify_logout(&self, credential: Credential) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime, skipping logout notification");
            return;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            if let Err(e) = inner.provider.logout_notify(&credential).await {
                tracing::debug!(error = %e, "logout notification failed");
            }
        });
    }

    // =====================================================================
    // resume
    // =====================================================================

    /// Restores the session persisted by a previous run, if it is still
    /// usable.
    ///
    /// An expired, malformed or server-rejected credential is discarded
    /// (with the rest of the persisted state) and `Ok(None)` returned.
    /// A near-expiry one is restored and immediately refreshed.
    pub async fn resume(&self) -> Result<Option<Identity>, SessionError> {
        let Some(credential) = self.inner.store.persisted_credential() else {
            return Ok(None);
        };
        let guard = self.begin_transition()?;
        let epoch = self.epoch();

        let now = self.inner.clock.now();
        let (claims, status) = match self.inner.codec.inspect(credential.expose(), now)
        {
            Ok((claims, status)) if status.is_usable() => (claims, status),
            _ => {
                tracing::info!("persisted credential is no longer usable");
                self.end_session(None);
                return Ok(None);
            }
        };

        let mut identity = Identity::from_claims(&claims);
        match self.inner.provider.current_identity(&credential).await {
            Ok(profile) => identity = identity.with_profile(profile),
            Err(SessionError::Rejected(reason)) => {
                tracing::info!(%reason, "server rejected persisted credential");
                self.end_session(Some(reason));
                return Ok(None);
            }
            Err(e) => tracing::debug!(
                error = %e,
                "profile fetch failed, resuming from credential claims"
            ),
        }

        self.commit(epoch, identity, credential)?;
        self.ensure_revalidation();
        drop(guard);
        tracing::info!("session resumed");

        if status == TokenStatus::NearExpiry {
            if let Err(e) = self.refresh().await {
                tracing::debug!(error = %e, "refresh after resume failed");
            }
        }
        Ok(self.current_state().identity().cloned())
    }

    // =====================================================================
    // Re-validation
    // =====================================================================

    /// Re-checks the stored credential once, refreshing it when it is
    /// near expiry or already invalid.
    ///
    /// The periodic timer calls this every
    /// [`revalidate_interval`](SessionConfig::revalidate_interval).
    pub async fn revalidate(&self) -> Result<(), SessionError> {
        let Some(credential) = self.inner.store.credential() else {
            return Ok(());
        };
        let status = self
            .inner
            .codec
            .inspect(credential.expose(), self.inner.clock.now())
            .map(|(_, status)| status)
            .unwrap_or(TokenStatus::Expired);
        if status == TokenStatus::Valid {
            return Ok(());
        }
        tracing::info!(?status, "stored credential needs a refresh");
        self.refresh().await.map(|_| ())
    }

    fn ensure_revalidation(&self) {
        let mut slot = lock(&self.inner.revalidation);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *slot = Some(tokio::spawn(revalidation_loop(
            Arc::downgrade(&self.inner),
            self.inner.config.revalidate_interval,
        )));
    }

    fn cancel_revalidation(&self) {
        if let Some(handle) = lock(&self.inner.revalidation).take() {
            handle.abort();
        }
    }

    // =====================================================================
    // Signals
    // =====================================================================

    async fn handle_signals(&self, expired: bool, refresh: bool) {
        if expired {
            let still_bad = self
                .inner
                .store
                .credential()
                .map(|c| !self.inner.codec.is_valid(c.expose(), self.inner.clock.now()))
                .unwrap_or(false);
            // The credential may have been replaced since the signal
            // was raised; only tear down if the current one is bad.
            if still_bad {
                tracing::info!("transport reported an expired credential");
                self.end_session(Some("credential expired".into()));
                return;
            }
        }
        if refresh && self.current_state().is_authenticated() {
            if let Err(e) = self.refresh().await {
                tracing::debug!(error = %e, "signalled refresh did not complete");
            }
        }
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn begin_transition(&self) -> Result<TransitionGuard<'_>, SessionError> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy)?;
        Ok(TransitionGuard {
            flag: &self.inner.in_flight,
        })
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Decodes a credential the server just issued. A credential that
    /// does not decode, or is dead on arrival, is the server's fault.
    fn accept_credential(
        &self,
        response: &LoginResponse,
        previous_profile: Option<serde_json::Value>,
    ) -> Result<Identity, SessionError> {
        let now = self.inner.clock.now();
        let (claims, status) = self
            .inner
            .codec
            .inspect(response.credential.expose(), now)
            .map_err(|e| {
                SessionError::ServerIntegrity(format!("malformed credential: {e}"))
            })?;
        if status == TokenStatus::Expired {
            return Err(SessionError::ServerIntegrity(
                "credential was already expired when issued".into(),
            ));
        }

        let identity = Identity::from_claims(&claims);
        Ok(match response.profile.clone().or(previous_profile) {
            Some(profile) => identity.with_profile(profile),
            None => identity,
        })
    }

    fn commit(
        &self,
        epoch: u64,
        identity: Identity,
        credential: Credential,
    ) -> Result<(), SessionError> {
        let _commit = lock(&self.inner.commit);
        if self.epoch() != epoch {
            tracing::debug!("discarding result of a superseded transition");
            return Err(SessionError::Superseded);
        }
        self.inner
            .store
            .set(SessionState::authenticated(identity, credential));
        Ok(())
    }

    fn fail_transition(&self, epoch: u64, error: SessionError) -> SessionError {
        let _commit = lock(&self.inner.commit);
        if self.epoch() == epoch {
            self.inner
                .store
                .set(SessionState::unauthenticated(Some(error.to_string())));
        }
        tracing::warn!(error = %error, "login failed");
        error
    }
}

/// Ticks every `period` while the session is signed in.
async fn revalidation_loop<P: IdentityProvider>(
    inner: Weak<Inner<P>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else { break };
        let manager = SessionManager { inner: strong };
        if !manager.current_state().is_authenticated() {
            break;
        }
        if let Err(e) = manager.revalidate().await {
            tracing::debug!(error = %e, "re-validation did not complete");
        }
    }
}

/// Reacts to transport signals, coalescing bursts (a storm of 401s
/// triggers one refresh, not one per response).
async fn signal_loop<P: IdentityProvider>(
    inner: Weak<Inner<P>>,
    mut signals: AuthSignalReceiver,
) {
    while let Some(first) = signals.recv().await {
        let mut expired = false;
        let mut refresh = false;
        let mut note = |signal| match signal {
            AuthSignal::CredentialExpired => expired = true,
            AuthSignal::NearExpiry | AuthSignal::Unauthorized => refresh = true,
        };
        note(first);
        while let Some(next) = signals.try_recv() {
            note(next);
        }

        let Some(strong) = inner.upgrade() else { break };
        SessionManager { inner: strong }
            .handle_signals(expired, refresh)
            .await;
    }
}

fn validate_login_input(
    identifier: &str,
    secret: &str,
) -> Result<(), SessionError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(SessionError::Validation(
            "identifier must not be empty".into(),
        ));
    }
    if identifier.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SessionError::Validation(
            "identifier must not contain whitespace".into(),
        ));
    }
    if secret.is_empty() {
        return Err(SessionError::Validation("secret must not be empty".into()));
    }
    if secret.chars().any(char::is_control) {
        return Err(SessionError::Validation(
            "secret must not contain control characters".into(),
        ));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! The provider is scripted and the wall clock is a `ManualClock`,
    //! so expiry is controlled exactly. Timer-driven behaviour runs
    //! under `start_paused`, where Tokio auto-advances time whenever
    //! every task is idle.

    use std::sync::atomic::AtomicUsize;

    use anchorline_token::ManualClock;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use tokio::sync::Notify;

    use super::*;
    use crate::{AuthSignals, ClientStorage, MemoryStorage, StorageSlot};

    const T0: i64 = 1_700_000_000;

    // -- Helpers ----------------------------------------------------------

    fn token(sub: &str, role: &str, exp: i64) -> String {
        let seg = |s: String| URL_SAFE_NO_PAD.encode(s);
        format!(
            "{}.{}.{}",
            seg(r#"{"alg":"HS256"}"#.into()),
            seg(format!(r#"{{"sub":"{sub}","role":"{role}","exp":{exp}}}"#)),
            seg("sig".into())
        )
    }

    fn response(raw: String) -> LoginResponse {
        LoginResponse {
            credential: Credential::new(raw),
            profile: None,
        }
    }

    /// A provider whose answers are set up front and whose calls are
    /// counted.
    struct Scripted {
        clock: Arc<ManualClock>,
        healthy: AtomicBool,
        login_malformed: AtomicBool,
        refresh_fails: AtomicBool,
        gate: Option<Notify>,
        login_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        logout_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                healthy: AtomicBool::new(true),
                login_malformed: AtomicBool::new(false),
                refresh_fails: AtomicBool::new(false),
                gate: None,
                login_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
            }
        }

        fn fresh_token(&self) -> String {
            token("u-1", "admin", self.clock.now() + 600)
        }
    }

    impl IdentityProvider for Scripted {
        async fn health(&self) -> Result<(), SessionError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SessionError::Connectivity("connection refused".into()))
            }
        }

        async fn login(
            &self,
            _identifier: &str,
            _secret: &str,
        ) -> Result<LoginResponse, SessionError> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.login_malformed.load(Ordering::SeqCst) {
                return Ok(response("not-a-credential".into()));
            }
            Ok(response(self.fresh_token()))
        }

        async fn refresh(
            &self,
            _current: &Credential,
        ) -> Result<LoginResponse, SessionError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails.load(Ordering::SeqCst) {
                return Err(SessionError::Rejected("refresh token revoked".into()));
            }
            Ok(response(self.fresh_token()))
        }

        async fn logout_notify(
            &self,
            _credential: &Credential,
        ) -> Result<(), SessionError> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn current_identity(
            &self,
            _credential: &Credential,
        ) -> Result<serde_json::Value, SessionError> {
            Ok(serde_json::json!({"name": "Ana", "email": "ana@example.com"}))
        }
    }

    struct Fixture {
        manager: SessionManager<Arc<Scripted>>,
        provider: Arc<Scripted>,
        clock: Arc<ManualClock>,
        storage: Arc<MemoryStorage>,
    }

    fn fixture_with(provider: impl FnOnce(&mut Scripted)) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let mut scripted = Scripted::new(Arc::clone(&clock));
        provider(&mut scripted);
        let provider = Arc::new(scripted);
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        let manager = SessionManager::with_clock(
            Arc::clone(&provider),
            store,
            SessionConfig::default(),
            clock.clone(),
        );
        Fixture {
            manager,
            provider,
            clock,
            storage,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    // =====================================================================
    // login()
    // =====================================================================

    #[tokio::test]
    async fn test_login_empty_identifier_returns_validation_without_network() {
        let f = fixture();

        let result = f.manager.login("   ", "secret").await;

        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert_eq!(f.provider.login_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.manager.current_state(), SessionState::default());
    }

    #[tokio::test]
    async fn test_login_empty_secret_returns_validation() {
        let f = fixture();

        let result = f.manager.login("ana@example.com", "").await;

        assert!(matches!(result, Err(SessionError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_unreachable_returns_connectivity_without_login_call() {
        let f = fixture_with(|p| p.healthy = AtomicBool::new(false));

        let result = f.manager.login("ana@example.com", "pw").await;

        assert!(matches!(result, Err(SessionError::Connectivity(_))));
        assert_eq!(f.provider.login_calls.load(Ordering::SeqCst), 0);
        let state = f.manager.current_state();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_login_malformed_credential_returns_server_integrity() {
        let f = fixture_with(|p| p.login_malformed = AtomicBool::new(true));

        let result = f.manager.login("ana@example.com", "pw").await;

        assert!(matches!(result, Err(SessionError::ServerIntegrity(_))));
        assert!(!f.manager.current_state().is_authenticated());
        assert_eq!(f.storage.load(StorageSlot::Credential).unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_success_becomes_authenticated() {
        let f = fixture();

        let identity = f.manager.login("ana@example.com", "pw").await.unwrap();

        assert_eq!(identity.subject, "u-1");
        assert_eq!(identity.display_name.as_deref(), Some("Ana"));
        let state = f.manager.current_state();
        assert!(matches!(state.phase, SessionPhase::Authenticated(_)));
        assert!(state.credential.is_some());
        assert!(f.storage.load(StorageSlot::Credential).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_stored_credential_round_trips_to_identity() {
        let f = fixture();
        let identity = f.manager.login("ana@example.com", "pw").await.unwrap();

        let stored = f.manager.store().credential().unwrap();
        let claims = anchorline_token::decode(stored.expose()).unwrap();
        let rebuilt = Identity::from_claims(&claims);

        assert_eq!(rebuilt.subject, identity.subject);
        assert_eq!(rebuilt.role, identity.role);
        assert_eq!(rebuilt.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_login_while_in_flight_returns_busy() {
        let f = fixture_with(|p| p.gate = Some(Notify::new()));
        let manager = f.manager.clone();
        let first = tokio::spawn(async move {
            manager.login("ana@example.com", "pw").await
        });
        settle().await;

        let second = f.manager.login("bob@example.com", "pw").await;

        assert_eq!(second, Err(SessionError::Busy));
        f.provider.gate.as_ref().unwrap().notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(f.provider.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_during_login_discards_result() {
        let f = fixture_with(|p| p.gate = Some(Notify::new()));
        let manager = f.manager.clone();
        let pending = tokio::spawn(async move {
            manager.login("ana@example.com", "pw").await
        });
        settle().await;

        f.manager.logout();
        f.provider.gate.as_ref().unwrap().notify_one();

        assert_eq!(pending.await.unwrap(), Err(SessionError::Superseded));
        assert!(!f.manager.current_state().is_authenticated());
    }

    // =====================================================================
    // logout()
    // =====================================================================

    #[tokio::test]
    async fn test_logout_twice_is_idempotent() {
        let f = fixture();
        f.manager.login("ana@example.com", "pw").await.unwrap();

        f.manager.logout();
        let after_first = f.manager.current_state();
        f.manager.logout();
        settle().await;

        assert_eq!(after_first, f.manager.current_state());
        assert_eq!(after_first.phase, SessionPhase::Unauthenticated);
        // Only the first logout had a credential to tell the server about.
        assert_eq!(f.provider.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_every_persisted_slot() {
        let f = fixture();
        f.manager.login("ana@example.com", "pw").await.unwrap();
        f.storage
            .save(StorageSlot::NotificationHistory, "[]")
            .unwrap();

        f.manager.logout();

        for slot in StorageSlot::ALL {
            assert_eq!(f.storage.load(slot).unwrap(), None);
        }
    }

    // =====================================================================
    // refresh()
    // =====================================================================

    #[tokio::test]
    async fn test_refresh_unauthenticated_returns_not_authenticated() {
        let f = fixture();

        assert_eq!(
            f.manager.refresh().await,
            Err(SessionError::NotAuthenticated)
        );
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_success_replaces_credential() {
        let f = fixture();
        f.manager.login("ana@example.com", "pw").await.unwrap();
        let before = f.manager.store().credential().unwrap();
        f.clock.advance(Duration::from_secs(100));

        let identity = f.manager.refresh().await.unwrap();

        let after = f.manager.store().credential().unwrap();
        assert_ne!(before, after);
        assert_eq!(identity.expires_at, T0 + 100 + 600);
        // The profile fetched at login survives the refresh.
        assert_eq!(identity.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out() {
        let f = fixture_with(|p| p.refresh_fails = AtomicBool::new(true));
        f.manager.login("ana@example.com", "pw").await.unwrap();

        let result = f.manager.refresh().await;

        assert!(matches!(result, Err(SessionError::RefreshFailed(_))));
        let state = f.manager.current_state();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert!(state.credential.is_none());
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
    }

    // =====================================================================
    // Periodic re-validation
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_refreshes_once_after_entering_skew_window() {
        let f = fixture();
        // Credential expires T0 + 600; skew is 300.
        f.manager.login("ana@example.com", "pw").await.unwrap();

        f.clock.advance(Duration::from_secs(301));
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;

        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(f.manager.current_state().is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_leaves_valid_credential_alone() {
        let f = fixture();
        f.manager.login("ana@example.com", "pw").await.unwrap();

        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;

        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_failed_refresh_logs_out() {
        let f = fixture_with(|p| p.refresh_fails = AtomicBool::new(true));
        f.manager.login("ana@example.com", "pw").await.unwrap();

        f.clock.advance(Duration::from_secs(700));
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;

        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(!f.manager.current_state().is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_revalidation_after_logout() {
        let f = fixture();
        f.manager.login("ana@example.com", "pw").await.unwrap();
        f.manager.logout();

        f.clock.advance(Duration::from_secs(301));
        tokio::time::sleep(Duration::from_secs(20 * 60)).await;

        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    // =====================================================================
    // Signals
    // =====================================================================

    #[tokio::test]
    async fn test_unauthorized_signal_burst_triggers_one_refresh() {
        let f = fixture();
        let (signals, rx) = AuthSignals::channel();
        f.manager.start(rx);
        f.manager.login("ana@example.com", "pw").await.unwrap();

        for _ in 0..5 {
            signals.emit(AuthSignal::Unauthorized);
        }
        settle().await;

        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
        f.manager.shutdown();
    }

    #[tokio::test]
    async fn test_expired_signal_with_expired_credential_logs_out() {
        let f = fixture();
        let (signals, rx) = AuthSignals::channel();
        f.manager.start(rx);
        f.manager.login("ana@example.com", "pw").await.unwrap();
        f.clock.advance(Duration::from_secs(601));

        signals.emit(AuthSignal::CredentialExpired);
        settle().await;

        assert!(!f.manager.current_state().is_authenticated());
    }

    #[tokio::test]
    async fn test_stale_expired_signal_is_ignored() {
        let f = fixture();
        let (signals, rx) = AuthSignals::channel();
        f.manager.start(rx);
        f.manager.login("ana@example.com", "pw").await.unwrap();

        // Credential is still fresh: the signal refers to an older one.
        signals.emit(AuthSignal::CredentialExpired);
        settle().await;

        assert!(f.manager.current_state().is_authenticated());
    }

    // =====================================================================
    // resume()
    // =====================================================================

    #[tokio::test]
    async fn test_resume_without_persisted_credential_returns_none() {
        let f = fixture();

        assert_eq!(f.manager.resume().await, Ok(None));
    }

    #[tokio::test]
    async fn test_resume_valid_credential_restores_session() {
        let f = fixture();
        f.storage
            .save(StorageSlot::Credential, &token("u-9", "viewer", T0 + 3600))
            .unwrap();

        let identity = f.manager.resume().await.unwrap().unwrap();

        assert_eq!(identity.subject, "u-9");
        assert!(f.manager.current_state().is_authenticated());
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_near_expiry_credential_refreshes() {
        let f = fixture();
        f.storage
            .save(StorageSlot::Credential, &token("u-9", "viewer", T0 + 60))
            .unwrap();

        let identity = f.manager.resume().await.unwrap().unwrap();

        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(identity.expires_at, T0 + 600);
    }

    #[tokio::test]
    async fn test_resume_expired_credential_discards_it() {
        let f = fixture();
        f.storage
            .save(StorageSlot::Credential, &token("u-9", "viewer", T0 - 1))
            .unwrap();

        assert_eq!(f.manager.resume().await, Ok(None));
        assert_eq!(f.storage.load(StorageSlot::Credential).unwrap(), None);
    }

    // =====================================================================
    // subscribe()
    // =====================================================================

    #[tokio::test]
    async fn test_subscribe_observes_login_transitions() {
        let f = fixture();
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        f.manager
            .subscribe(move |s| sink.lock().unwrap().push(s.phase.to_string()));

        f.manager.login("ana@example.com", "pw").await.unwrap();
        f.manager.logout();

        assert_eq!(
            *phases.lock().unwrap(),
            vec!["authenticating", "authenticated", "unauthenticated"]
        );
    }
}
