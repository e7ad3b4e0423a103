//! Integration tests for the WebSocket push channel.
//!
//! A real `tokio-tungstenite` server runs on an OS-assigned port; the
//! channel connects to it with [`WebSocketConnector`] on behalf of a
//! signed-in session.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use anchorline_notify::{
        ChannelConfig, NotificationChannel, NotificationEnvelope, WebSocketConnector,
    };
    use anchorline_session::{
        ClientStorage, IdentityProvider, LoginResponse, MemoryStorage, SessionConfig, SessionError,
        SessionManager, SessionStore, StorageSlot,
    };
    use anchorline_token::Credential;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    const WAIT: Duration = Duration::from_secs(5);

    struct Offline;

    impl IdentityProvider for Offline {
        async fn health(&self) -> Result<(), SessionError> {
            Err(SessionError::Connectivity("offline".into()))
        }
        async fn login(&self, _: &str, _: &str) -> Result<LoginResponse, SessionError> {
            Err(SessionError::Connectivity("offline".into()))
        }
        async fn refresh(&self, _: &Credential) -> Result<LoginResponse, SessionError> {
            Err(SessionError::Connectivity("offline".into()))
        }
        async fn logout_notify(&self, _: &Credential) -> Result<(), SessionError> {
            Ok(())
        }
        async fn current_identity(
            &self,
            _: &Credential,
        ) -> Result<serde_json::Value, SessionError> {
            Err(SessionError::Connectivity("offline".into()))
        }
    }

    fn token() -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600;
        let seg = |s: &str| URL_SAFE_NO_PAD.encode(s);
        format!(
            "{}.{}.{}",
            seg(r#"{"alg":"HS256"}"#),
            seg(&format!(r#"{{"sub":"u-42","exp":{exp}}}"#)),
            seg("sig")
        )
    }

    /// A store holding a resumed session, plus the manager that owns it.
    async fn signed_in() -> (SessionStore, SessionManager<Offline>, String) {
        let storage = Arc::new(MemoryStorage::new());
        let raw = token();
        storage.save(StorageSlot::Credential, &raw).unwrap();
        let store = SessionStore::new(storage);
        let manager = SessionManager::new(Offline, store.clone(), SessionConfig::default());
        manager.resume().await.unwrap().expect("session should resume");
        (store, manager, raw)
    }

    async fn accept(listener: &TcpListener) -> ServerStream {
        let (stream, _) = timeout(WAIT, listener.accept())
            .await
            .expect("client should connect")
            .unwrap();
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    async fn next_json(ws: &mut ServerStream) -> serde_json::Value {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("frame should arrive")
            .unwrap()
            .unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    async fn bind() -> (TcpListener, ChannelConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ChannelConfig {
            url: format!("ws://{addr}/ws/notifications"),
            reconnect_base_delay: Duration::from_millis(50),
            ..ChannelConfig::default()
        };
        (listener, config)
    }

    #[tokio::test]
    async fn test_channel_authenticates_then_receives_push() {
        let (listener, config) = bind().await;
        let (store, _manager, raw) = signed_in().await;

        let channel = NotificationChannel::new(WebSocketConnector, store, config);
        let (tx, mut rx) = mpsc::unbounded_channel::<NotificationEnvelope>();
        channel.add_listener(move |n| {
            let _ = tx.send(n.clone());
        });

        let mut server = accept(&listener).await;

        // The first frame is always the auth frame.
        let auth = next_json(&mut server).await;
        assert_eq!(auth, serde_json::json!({"type": "auth", "token": raw}));

        server
            .send(Message::Text(
                r#"{"type":"notification","data":{"id":"n-1","type":"task_assigned","severity":"warning","message":"Review due"}}"#
                    .to_owned()
                    .into(),
            ))
            .await
            .unwrap();

        let received = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(received.id, "n-1");
        assert_eq!(received.category, "task_assigned");
        assert!(channel.is_connected());
        assert_eq!(channel.history().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_reconnects_after_server_close() {
        let (listener, config) = bind().await;
        let (store, _manager, raw) = signed_in().await;
        let channel = NotificationChannel::new(WebSocketConnector, store, config);

        let mut first = accept(&listener).await;
        next_json(&mut first).await;
        first.close(None).await.unwrap();
        drop(first);

        let mut second = accept(&listener).await;
        let auth = next_json(&mut second).await;

        assert_eq!(auth["token"], raw.as_str());
        drop(channel);
    }

    #[tokio::test]
    async fn test_logout_closes_channel() {
        let (listener, config) = bind().await;
        let (store, manager, _raw) = signed_in().await;
        let channel = NotificationChannel::new(WebSocketConnector, store, config);

        let mut server = accept(&listener).await;
        next_json(&mut server).await;

        manager.logout();

        // The client closes its side; the server sees a close frame or EOF.
        let end = timeout(WAIT, server.next()).await.expect("client should close");
        assert!(matches!(end, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
        assert!(!channel.is_connected());
    }
}
