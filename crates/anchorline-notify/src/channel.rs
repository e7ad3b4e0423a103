//! The notification channel: a push connection with bounded
//! reconnects, local history and listener fan-out.
//!
//! # Connection lifecycle
//!
//! ```text
//!   Closed ──→ Connecting ──→ Authenticating ──(auth frame sent)──→ Open
//!     ↑            │                                                 │
//!     │         (failed)                                    (closed / error)
//!     │            ↓                                                 ↓
//!     └──(stall after max attempts)── reconnect after base × attempt ┘
//! ```
//!
//! Every open sends `{"type":"auth","token":...}` with the credential
//! read from the session store at that moment. A successful open resets
//! the attempt counter; after `max_reconnect_attempts` consecutive
//! failures the channel stays closed until [`NotificationChannel::reconnect`]
//! is called.
//!
//! The channel follows the session: it connects when the user signs in
//! and, when the session ends, disconnects and forgets its history.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anchorline_session::{SessionPhase, SessionStore, Subscription};
use tokio_util::sync::CancellationToken;

use crate::envelope::{Inbound, auth_frame, now_millis, parse_frame};
use crate::{
    AlertSink, Connector, History, NotificationEnvelope, PushConnection,
    Severity, TracingAlertSink,
};

/// Channel settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Push endpoint.
    ///
    /// Default: `ws://localhost:8000/ws/notifications`.
    pub url: String,

    /// Reconnect delay unit; attempt `n` waits `n × base`.
    ///
    /// Default: 1 second.
    pub reconnect_base_delay: Duration,

    /// Consecutive automatic reconnects before the channel gives up.
    ///
    /// Default: 5.
    pub max_reconnect_attempts: u32,

    /// Notifications kept in history.
    ///
    /// Default: 100.
    pub history_capacity: usize,

    /// Connect automatically whenever the session becomes
    /// authenticated.
    ///
    /// Default: `true`.
    pub connect_on_sign_in: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/notifications".into(),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            history_capacity: 100,
            connect_on_sign_in: true,
        }
    }
}

/// Where the push connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Closed,
    Connecting,
    /// Open, auth frame not yet sent.
    Authenticating,
    Open,
}

type Listener = Arc<dyn Fn(&NotificationEnvelope) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    entries: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl Listeners {
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        lock(&self.entries)
    }
}

/// Returned by [`NotificationChannel::add_listener`].
///
/// Dropping it keeps the listener registered; call
/// [`unregister`](Self::unregister) to remove it.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Listeners>,
}

impl ListenerHandle {
    pub fn unregister(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.entries().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Connection bookkeeping, guarded by one lock.
struct Link {
    state: ConnectionState,
    attempts: u32,
    /// Bumped by every start/stop. A driver only writes while its
    /// generation is current.
    generation: u64,
    cancel: Option<CancellationToken>,
}

struct Inner<C> {
    connector: C,
    store: SessionStore,
    config: ChannelConfig,
    alerts: Arc<dyn AlertSink>,
    link: Mutex<Link>,
    history: Mutex<History>,
    listeners: Arc<Listeners>,
}

/// How one connection ended.
enum Outcome {
    /// Never opened.
    Failed,
    /// Was open, then closed or errored.
    Dropped,
    /// No credential to authenticate with.
    SignedOut,
    Cancelled,
}

/// Server push notifications for the signed-in user.
pub struct NotificationChannel<C: Connector> {
    inner: Arc<Inner<C>>,
    session: Option<Subscription>,
}

impl<C: Connector> NotificationChannel<C> {
    /// Creates a channel that alerts through `tracing`.
    pub fn new(connector: C, store: SessionStore, config: ChannelConfig) -> Self {
        Self::with_alert_sink(connector, store, config, Arc::new(TracingAlertSink))
    }

    /// Creates a channel with a custom alert sink.
    ///
    /// History persisted by a previous run is restored. If the session
    /// is already authenticated (and `connect_on_sign_in` is set) the
    /// channel connects right away; this needs a Tokio runtime.
    pub fn with_alert_sink(
        connector: C,
        store: SessionStore,
        config: ChannelConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let history = History::load(store.storage().as_ref(), config.history_capacity)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "persisted notification history unreadable");
                History::new(config.history_capacity)
            });

        let inner = Arc::new(Inner {
            connector,
            store: store.clone(),
            config,
            alerts,
            link: Mutex::new(Link {
                state: ConnectionState::Closed,
                attempts: 0,
                generation: 0,
                cancel: None,
            }),
            history: Mutex::new(history),
            listeners: Arc::new(Listeners::default()),
        });

        let signed_in = store.get().is_authenticated();
        let session = store.subscribe(follow_session(Arc::downgrade(&inner), signed_in));
        if signed_in && inner.config.connect_on_sign_in {
            start(&inner);
        }

        Self {
            inner,
            session: Some(session),
        }
    }

    /// Opens the connection if it is not already running.
    pub fn connect(&self) {
        let running = lock(&self.inner.link).cancel.is_some();
        if !running {
            start(&self.inner);
        }
    }

    /// Restarts the connection with a fresh attempt counter.
    ///
    /// This is the way out after automatic reconnects gave up.
    pub fn reconnect(&self) {
        tracing::info!("manual reconnect requested");
        start(&self.inner);
    }

    /// Closes the connection and stops reconnecting.
    pub fn disconnect(&self) {
        self.inner.stop();
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.inner.link).state
    }

    /// Automatic reconnects used since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.link).attempts
    }

    /// Registers a callback for every delivered notification.
    ///
    /// Listeners run synchronously in registration order. Changes made
    /// during a delivery (including unregistering) apply from the next
    /// delivery on.
    pub fn add_listener<F>(&self, f: F) -> ListenerHandle
    where
        F: Fn(&NotificationEnvelope) + Send + Sync + 'static,
    {
        let listeners = &self.inner.listeners;
        let id = listeners.next_id.fetch_add(1, Ordering::Relaxed);
        listeners.entries().push((id, Arc::new(f)));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.entries().len()
    }

    /// The notification history, oldest first.
    pub fn history(&self) -> Vec<NotificationEnvelope> {
        lock(&self.inner.history).to_vec()
    }

    /// Marks one notification read. Returns `false` if it is unknown or
    /// was already read.
    pub fn mark_read(&self, id: &str) -> bool {
        self.inner.update_history(|h| h.mark_read(id))
    }

    /// Marks every notification read. Returns how many changed.
    pub fn mark_all_read(&self) -> usize {
        self.inner.update_history(History::mark_all_read)
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.inner.history).unread_count()
    }

    pub fn clear_history(&self) {
        self.inner.update_history(History::clear);
    }

    /// Delivers a locally generated notification through the same
    /// pipeline as pushed ones. Returns its id.
    pub fn notify_local(
        &self,
        category: &str,
        severity: Severity,
        message: &str,
    ) -> String {
        let envelope = NotificationEnvelope::new(
            generate_id("local"),
            category,
            severity,
            message,
        );
        let id = envelope.id.clone();
        self.inner.deliver(envelope);
        id
    }

    /// Delivers a notification as if it had been pushed.
    pub fn deliver(&self, envelope: NotificationEnvelope) {
        self.inner.deliver(envelope);
    }
}

impl<C: Connector> Drop for NotificationChannel<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.unsubscribe();
        }
        self.inner.stop();
    }
}

/// The store callback that ties the channel to the session.
fn follow_session<C: Connector>(
    inner: Weak<Inner<C>>,
    signed_in: bool,
) -> impl Fn(&anchorline_session::SessionState) + Send + Sync + 'static {
    let was_signed_in = AtomicBool::new(signed_in);
    move |state| {
        let Some(inner) = inner.upgrade() else { return };
        let now = state.is_authenticated();
        let before = was_signed_in.swap(now, Ordering::SeqCst);

        if state.phase == SessionPhase::Unauthenticated {
            inner.stop();
            let had_history = {
                let mut history = lock(&inner.history);
                let had = !history.is_empty();
                history.clear();
                had
            };
            if had_history {
                tracing::debug!("session ended, notification history cleared");
            }
        } else if now && !before && inner.config.connect_on_sign_in {
            start(&inner);
        }
    }
}

/// Spawns a fresh driver, replacing (and cancelling) any running one.
fn start<C: Connector>(inner: &Arc<Inner<C>>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("no Tokio runtime, push channel not started");
        return;
    };
    let token = CancellationToken::new();
    let generation = {
        let mut link = lock(&inner.link);
        if let Some(previous) = link.cancel.replace(token.clone()) {
            previous.cancel();
        }
        link.generation += 1;
        link.attempts = 0;
        link.state = ConnectionState::Connecting;
        link.generation
    };
    runtime.spawn(drive(Arc::clone(inner), generation, token));
}

/// Connects, reads until the connection drops, reconnects with linear
/// backoff, and gives up after `max_reconnect_attempts`.
async fn drive<C: Connector>(
    inner: Arc<Inner<C>>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        inner.set_state(generation, ConnectionState::Connecting);
        match run_connection(&inner, generation, &cancel).await {
            Outcome::Cancelled | Outcome::SignedOut => break,
            Outcome::Failed | Outcome::Dropped => {}
        }
        inner.set_state(generation, ConnectionState::Closed);

        let Some(attempt) = inner.claim_attempt(generation) else {
            break;
        };
        let delay = inner.config.reconnect_base_delay * attempt;
        tracing::info!(
            attempt,
            max = inner.config.max_reconnect_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "push channel reconnect scheduled"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    inner.finish(generation);
}

async fn run_connection<C: Connector>(
    inner: &Inner<C>,
    generation: u64,
    cancel: &CancellationToken,
) -> Outcome {
    let connected = tokio::select! {
        _ = cancel.cancelled() => return Outcome::Cancelled,
        result = inner.connector.connect(&inner.config.url) => result,
    };
    let mut conn = match connected {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "push channel failed to open");
            return Outcome::Failed;
        }
    };
    inner.set_state(generation, ConnectionState::Authenticating);

    // Read at open time so a just-refreshed credential is used.
    let Some(credential) = inner.store.credential() else {
        tracing::debug!("no credential, closing push channel");
        close(&mut conn).await;
        return Outcome::SignedOut;
    };
    if let Err(e) = conn.send_text(auth_frame(credential.expose())).await {
        tracing::warn!(error = %e, "push channel auth frame not sent");
        return Outcome::Failed;
    }
    inner.set_state(generation, ConnectionState::Open);
    tracing::info!("push channel open");

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => None,
            frame = conn.next_text() => Some(frame),
        };
        match frame {
            None => {
                close(&mut conn).await;
                return Outcome::Cancelled;
            }
            Some(Ok(Some(text))) => inner.handle_frame(&text),
            Some(Ok(None)) => {
                tracing::info!("push channel closed by server");
                return Outcome::Dropped;
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "push channel errored");
                return Outcome::Dropped;
            }
        }
    }
}

async fn close<P: PushConnection>(conn: &mut P) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "push channel close failed");
    }
}

impl<C: Connector> Inner<C> {
    fn set_state(&self, generation: u64, state: ConnectionState) {
        let mut link = lock(&self.link);
        if link.generation != generation {
            return;
        }
        link.state = state;
        if state == ConnectionState::Open {
            link.attempts = 0;
        }
    }

    /// Takes the next reconnect attempt, or `None` if the budget is
    /// spent or this driver has been superseded.
    fn claim_attempt(&self, generation: u64) -> Option<u32> {
        let mut link = lock(&self.link);
        if link.generation != generation {
            return None;
        }
        if link.attempts >= self.config.max_reconnect_attempts {
            tracing::warn!(
                attempts = link.attempts,
                "push channel giving up; call reconnect() to try again"
            );
            return None;
        }
        link.attempts += 1;
        Some(link.attempts)
    }

    /// Marks a driver as no longer running.
    fn finish(&self, generation: u64) {
        let mut link = lock(&self.link);
        if link.generation == generation {
            link.state = ConnectionState::Closed;
            link.cancel = None;
        }
    }

    fn stop(&self) {
        let mut link = lock(&self.link);
        if let Some(token) = link.cancel.take() {
            token.cancel();
            tracing::debug!("push channel stopped");
        }
        link.generation += 1;
        link.attempts = 0;
        link.state = ConnectionState::Closed;
    }

    fn handle_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(Inbound::Notification(envelope)) => self.deliver(envelope),
            Ok(Inbound::AuthAccepted) => {
                tracing::debug!("push channel authenticated");
            }
            Ok(Inbound::AuthRejected(reason)) => {
                tracing::warn!(%reason, "push channel authentication rejected");
            }
            Ok(Inbound::Ignored) => {}
            Err(e) => tracing::warn!(error = %e, "malformed push frame dropped"),
        }
    }

    /// History first, then listeners, then the alert.
    fn deliver(&self, mut envelope: NotificationEnvelope) {
        if envelope.id.is_empty() {
            envelope.id = generate_id("evt");
        }
        if envelope.timestamp == 0 {
            envelope.timestamp = now_millis();
        }

        {
            let mut history = lock(&self.history);
            if !history.push(envelope.clone()) {
                tracing::debug!(id = %envelope.id, "duplicate notification dropped");
                return;
            }
            if let Err(e) = history.persist(self.store.storage().as_ref()) {
                tracing::warn!(error = %e, "failed to persist notification history");
            }
        }

        let snapshot: Vec<Listener> = self
            .listeners
            .entries()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for listener in snapshot {
            listener(&envelope);
        }

        self.alerts.alert(&envelope);
    }

    fn update_history<R>(&self, f: impl FnOnce(&mut History) -> R) -> R {
        let mut history = lock(&self.history);
        let result = f(&mut history);
        if let Err(e) = history.persist(self.store.storage().as_ref()) {
            tracing::warn!(error = %e, "failed to persist notification history");
        }
        result
    }
}

fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{:016x}", rand::random::<u64>())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
