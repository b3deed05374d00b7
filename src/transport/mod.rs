//! Transport layer.
//!
//! Owns the single persistent connection and moves text frames in both
//! directions. It knows nothing about Bayeux above the framing level.
//!
//! - **Traits**: [`Connector`] opens a connection and yields a
//!   [`FrameSink`] / [`FrameSource`] pair
//! - **WebSocket**: [`WebSocketConnector`] over `tokio-tungstenite`
//! - **In-memory**: [`MemoryConnector`] for tests and simulations
//!
//! The two halves are split so one task can block on
//! [`FrameSource::receive_next`] while other tasks write through the sink.

mod memory;
mod websocket;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::core::constants::COOKIE_HEADER;
use crate::core::TransportResult;

pub use memory::*;
pub use websocket::*;

/// Header name/value pairs sent when opening a connection.
pub type Headers = Vec<(String, String)>;

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send(&mut self, frame: String) -> TransportResult<()>;

    /// Close the connection.
    async fn close(&mut self) -> TransportResult<()>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. `Ok(None)` means end of stream.
    async fn receive_next(&mut self) -> TransportResult<Option<String>>;
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url` with the given headers.
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> TransportResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}

/// Cookies from the authenticated HTTP session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    cookies: BTreeMap<String, String>,
}

impl SessionCookies {
    /// Create an empty cookie set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a cookie.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let _ = self.cookies.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Whether there are no cookies.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` header value: `k1=v1; k2=v2`.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The `Cookie` header, or `None` when empty.
    pub fn header(&self) -> Option<(String, String)> {
        if self.is_empty() {
            return None;
        }
        Some((COOKIE_HEADER.to_owned(), self.header_value()))
    }
}

impl<K, V> FromIterator<(K, V)> for SessionCookies
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut cookies = Self::new();
        for (name, value) in iter {
            cookies.insert(name, value);
        }
        cookies
    }
}
