//! Streaming transport seam.
//!
//! The connector only needs opaque send/receive over frames, so the WebSocket
//! client sits behind [`Connect`] / [`Transport`]. [`WsConnect`] is the
//! production implementation on top of `tokio-tungstenite`.

use crate::utils::error::{LogStreamError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// One message on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// An open, bidirectional, message-oriented session.
#[async_trait]
pub trait Transport: Send {
    /// Sends one frame.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Waits for the next frame. `None` means the peer went away.
    ///
    /// Must be cancel-safe: the connector drops this future whenever a
    /// heartbeat tick or a stop request wins the race.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    /// Closes the session.
    async fn close(&mut self) -> Result<()>;
}

/// Opens [`Transport`] sessions to an endpoint.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    type Transport: Transport + 'static;

    /// Performs the transport handshake.
    async fn connect(&self, endpoint: &str) -> Result<Self::Transport>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnect;

/// A live WebSocket session.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connect for WsConnect {
    type Transport = WsTransport;

    async fn connect(&self, endpoint: &str) -> Result<WsTransport> {
        let (stream, _) = connect_async(endpoint).await?;
        Ok(WsTransport { stream })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close => Message::Close(None),
        };
        self.stream.send(message).await.map_err(|e| {
            LogStreamError::ConnectionError(format!("WebSocket send failed: {e}"))
        })
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(LogStreamError::ConnectionError(format!(
                        "WebSocket receive failed: {e}"
                    ))))
                }
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(data) => Frame::Binary(data),
                Message::Ping(data) => Frame::Ping(data),
                Message::Pong(data) => Frame::Pong(data),
                Message::Close(_) => Frame::Close,
                // Raw frames never surface while reading.
                Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| LogStreamError::ConnectionError(format!("WebSocket close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn test_ws_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(format!("echo:{text}"))).await.unwrap();
            }
            ws.close(None).await.ok();
        });

        let mut transport = WsConnect
            .connect(&format!("ws://{addr}"))
            .await
            .expect("connect");
        transport.send(Frame::Text("hello".into())).await.unwrap();

        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Text("echo:hello".into()));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_ws_connect_refused_is_connection_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnect.connect(&format!("ws://{addr}")).await;
        assert!(matches!(result, Err(LogStreamError::ConnectionError(_))));
    }
}
