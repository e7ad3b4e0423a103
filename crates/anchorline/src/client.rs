//! `Client` builder: wires storage, session, transport and the push
//! channel together.
//!
//! ```text
//! storage ─→ SessionStore ←─ reads ── ResilientTransport ── AuthSignals ─┐
//!                 ↑                         │                            │
//!              writes              HttpIdentityProvider                  │
//!                 │                         │                            ↓
//!           SessionManager ←── provider ────┘          SessionManager::start
//!                 │
//!         NotificationChannel (follows the store)
//! ```

use std::sync::Arc;

use anchorline_notify::{
    AlertSink, Connector, NotificationChannel, TracingAlertSink, WebSocketConnector,
};
use anchorline_session::{
    AuthSignals, ClientStorage, FileStorage, MemoryStorage, SessionManager, SessionStore,
};
use anchorline_transport::{
    HttpBackend, HttpIdentityProvider, ReqwestBackend, ResilientTransport,
};

use crate::{AnchorlineError, ClientConfig};

/// Builder for a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), anchorline::AnchorlineError> {
/// use anchorline::{Client, ClientConfig};
///
/// let client = Client::builder()
///     .config(ClientConfig::from_env()?)
///     .build()
///     .await?;
/// client.session.login("ada@example.com", "hunter22").await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    storage: Option<Arc<dyn ClientStorage>>,
    alerts: Option<Arc<dyn AlertSink>>,
    resume: bool,
}

impl ClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            storage: None,
            alerts: None,
            resume: true,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `storage` instead of the one selected by
    /// [`ClientConfig::storage_dir`].
    pub fn storage(mut self, storage: Arc<dyn ClientStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets where transient notification alerts go.
    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Whether `build` resumes a persisted session. Default: `true`.
    pub fn resume_session(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Builds the client over `reqwest` and WebSocket.
    pub async fn build(self) -> Result<Client, AnchorlineError> {
        let backend = ReqwestBackend::new()?;
        self.build_with(backend, WebSocketConnector).await
    }

    /// Builds the client over the given HTTP backend and push connector.
    ///
    /// Starts the session manager's signal listener and, unless disabled,
    /// resumes the persisted session. A resumed session connects the
    /// push channel.
    pub async fn build_with<B, C>(
        self,
        backend: B,
        connector: C,
    ) -> Result<Client<B, C>, AnchorlineError>
    where
        B: HttpBackend,
        C: Connector,
    {
        let storage: Arc<dyn ClientStorage> = match (self.storage, &self.config.storage_dir) {
            (Some(storage), _) => storage,
            (None, Some(dir)) => Arc::new(FileStorage::open(dir)?),
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let store = SessionStore::new(storage);
        let (signals, receiver) = AuthSignals::channel();

        let transport = ResilientTransport::new(
            backend,
            store.clone(),
            signals,
            self.config.transport_config(),
        );
        let session = SessionManager::new(
            HttpIdentityProvider::new(transport.clone()),
            store.clone(),
            self.config.session_config(),
        );
        session.start(receiver);

        let alerts = self.alerts.unwrap_or_else(|| Arc::new(TracingAlertSink));
        let notifications = NotificationChannel::with_alert_sink(
            connector,
            store,
            self.config.channel_config(),
            alerts,
        );

        if self.resume {
            match session.resume().await {
                Ok(Some(identity)) => {
                    tracing::info!(subject = %identity.subject, "previous session resumed");
                }
                Ok(None) => tracing::debug!("no session to resume"),
                Err(e) => tracing::warn!(error = %e, "session resume failed"),
            }
        }

        tracing::info!(base_url = %self.config.base_url, "client ready");
        Ok(Client {
            session,
            transport,
            notifications,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled client stack.
pub struct Client<B: HttpBackend = ReqwestBackend, C: Connector = WebSocketConnector> {
    /// Login, logout, refresh and session state.
    pub session: SessionManager<HttpIdentityProvider<B>>,
    /// Authenticated, retrying HTTP requests.
    pub transport: ResilientTransport<B>,
    /// Server push notifications.
    pub notifications: NotificationChannel<C>,
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<B: HttpBackend, C: Connector> Client<B, C> {
    /// Stops background work: re-validation, the signal listener and the
    /// push connection. The persisted session is kept for the next run.
    pub fn shutdown(&self) {
        self.notifications.disconnect();
        self.session.shutdown();
        tracing::info!("client shut down");
    }
}
