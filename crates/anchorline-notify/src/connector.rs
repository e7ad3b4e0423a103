//! The push-connection seam.
//!
//! [`Connector`] opens connections; [`PushConnection`] moves text
//! frames over one. The channel drives them from a background task, so
//! every future is `Send`.

use std::future::Future;

use crate::NotifyError;

/// Opens push connections.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: PushConnection;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, NotifyError>> + Send;
}

/// A single open connection carrying text frames.
pub trait PushConnection: Send + 'static {
    fn send_text(
        &mut self,
        text: String,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;

    /// Receives the next text frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    fn next_text(
        &mut self,
    ) -> impl Future<Output = Result<Option<String>, NotifyError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    use super::{Connector, PushConnection};
    use crate::NotifyError;

    type WsStream = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Opens WebSocket connections with `tokio-tungstenite`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WebSocketConnector;

    impl Connector for WebSocketConnector {
        type Connection = WebSocketConnection;

        async fn connect(&self, url: &str) -> Result<WebSocketConnection, NotifyError> {
            let (ws, _) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| NotifyError::Connect(e.to_string()))?;
            tracing::debug!(url, "push connection opened");
            Ok(WebSocketConnection { ws })
        }
    }

    /// A single WebSocket connection.
    pub struct WebSocketConnection {
        ws: WsStream,
    }

    impl PushConnection for WebSocketConnection {
        async fn send_text(&mut self, text: String) -> Result<(), NotifyError> {
            self.ws
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| NotifyError::Send(e.to_string()))
        }

        async fn next_text(&mut self) -> Result<Option<String>, NotifyError> {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Ok(Some(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(_)) => continue, // ping/pong/raw frame
                    Some(Err(e)) => return Err(NotifyError::Receive(e.to_string())),
                }
            }
        }

        async fn close(&mut self) -> Result<(), NotifyError> {
            self.ws
                .close(None)
                .await
                .map_err(|e| NotifyError::Send(e.to_string()))
        }
    }
}
