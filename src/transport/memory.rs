//! In-process transport.
//!
//! [`MemoryConnector`] hands every opened connection to a paired
//! [`MemoryServer`], which can then script the server side of the
//! conversation. Used by the test suite; also handy for simulations.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Connector, FrameSink, FrameSource, Headers};
use crate::core::{TransportError, TransportResult};

/// Client-side connector for in-memory connections.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<ServerConnection>,
}

impl MemoryConnector {
    /// Create a connector and the server that accepts its connections.
    pub fn new() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Self { accept_tx }, MemoryServer { accept_rx })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> TransportResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        let connection = ServerConnection {
            url: url.to_owned(),
            headers: headers.to_vec(),
            rx: server_rx,
            tx: Some(server_tx),
        };
        self.accept_tx
            .send(connection)
            .map_err(|_| TransportError::Connect("memory server dropped".into()))?;

        Ok((
            Box::new(MemorySink { tx: Some(client_tx) }),
            Box::new(MemorySource { rx: client_rx }),
        ))
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> TransportResult<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.tx = None;
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive_next(&mut self) -> TransportResult<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

/// Accepts connections opened through a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<ServerConnection>,
}

impl MemoryServer {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accept_rx.recv().await
    }
}

/// Server end of one in-memory connection.
#[derive(Debug)]
pub struct ServerConnection {
    url: String,
    headers: Headers,
    rx: mpsc::UnboundedReceiver<String>,
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl ServerConnection {
    /// URL the client opened.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers the client sent.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Wait for the next raw frame from the client.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Wait for the next frame and return its single message object.
    pub async fn recv_message(&mut self) -> Option<Value> {
        let text = self.recv().await?;
        first_message(&text)
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv_message(&mut self) -> Option<Value> {
        let text = self.rx.try_recv().ok()?;
        first_message(&text)
    }

    /// Send a raw frame to the client.
    pub fn send(&self, frame: impl Into<String>) -> TransportResult<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame.into()).map_err(|_| TransportError::Closed)
    }

    /// Send `message` wrapped in a one-element array.
    pub fn send_message(&self, message: Value) -> TransportResult<()> {
        self.send(Value::Array(vec![message]).to_string())
    }

    /// End the stream; the client sees end-of-stream.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

fn first_message(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(mut values) if !values.is_empty() => Some(values.swap_remove(0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_roundtrip_frames() {
        let (connector, mut server) = MemoryConnector::new();
        let headers = vec![("Cookie".to_owned(), "a=b".to_owned())];
        let (mut sink, mut source) = connector.open("memory://push", &headers).await.unwrap();
        let mut conn = server.accept().await.unwrap();

        assert_eq!(conn.url(), "memory://push");
        assert_eq!(conn.header("cookie"), Some("a=b"));

        sink.send(r#"[{"channel":"/meta/handshake"}]"#.into()).await.unwrap();
        assert_eq!(
            conn.recv_message().await,
            Some(json!({ "channel": "/meta/handshake" }))
        );

        conn.send_message(json!({ "channel": "/quotes/1" })).unwrap();
        assert_eq!(
            source.receive_next().await.unwrap().as_deref(),
            Some(r#"[{"channel":"/quotes/1"}]"#)
        );
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (connector, mut server) = MemoryConnector::new();
        let (mut sink, mut source) = connector.open("memory://push", &[]).await.unwrap();
        let mut conn = server.accept().await.unwrap();

        conn.close();
        assert_eq!(source.receive_next().await.unwrap(), None);

        sink.close().await.unwrap();
        assert!(matches!(sink.send("x".into()).await, Err(TransportError::Closed)));
        assert_eq!(conn.recv().await, None);
    }

    #[tokio::test]
    async fn test_open_fails_without_server() {
        let (connector, server) = MemoryConnector::new();
        drop(server);
        assert!(matches!(
            connector.open("memory://push", &[]).await,
            Err(TransportError::Connect(_))
        ));
    }
}
