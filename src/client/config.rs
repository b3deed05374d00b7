//! Client configuration.

use std::time::Duration;

use crate::core::constants::{
    CONNECT_POLL_INTERVAL, CONNECT_TIMEOUT, CONNECTION_TYPE_WEBSOCKET, DEFAULT_PUSH_URL,
    HANDSHAKE_ADVICE_INTERVAL_MS, HANDSHAKE_ADVICE_TIMEOUT_MS, SUPPORTED_CONNECTION_TYPES,
};
use crate::protocol::SessionParams;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Push endpoint URL.
    pub url: String,

    /// Extra headers sent when opening the transport, besides the cookies.
    pub headers: Vec<(String, String)>,

    /// Connection type announced on connect.
    pub connection_type: String,

    /// Connection types offered in the handshake.
    pub supported_connection_types: Vec<String>,

    /// Handshake advice timeout (ms).
    pub handshake_advice_timeout_ms: u64,

    /// Handshake advice interval (ms).
    pub handshake_advice_interval_ms: u64,

    /// How often the connect wait checks the state.
    pub connect_poll_interval: Duration,

    /// Ceiling on the connect wait.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PUSH_URL.to_owned(),
            headers: Vec::new(),
            connection_type: CONNECTION_TYPE_WEBSOCKET.to_owned(),
            supported_connection_types: SUPPORTED_CONNECTION_TYPES
                .iter()
                .map(|ty| (*ty).to_owned())
                .collect(),
            handshake_advice_timeout_ms: HANDSHAKE_ADVICE_TIMEOUT_MS,
            handshake_advice_interval_ms: HANDSHAKE_ADVICE_INTERVAL_MS,
            connect_poll_interval: CONNECT_POLL_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Session parameters for the protocol state machine.
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            connection_type: self.connection_type.clone(),
            supported_connection_types: self.supported_connection_types.clone(),
            advice_timeout_ms: self.handshake_advice_timeout_ms,
            advice_interval_ms: self.handshake_advice_interval_ms,
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct PushClientBuilder {
    config: ClientConfig,
}

impl PushClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the push endpoint URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Add a header sent when opening the transport.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Set the connection type announced on connect.
    pub fn connection_type(mut self, connection_type: impl Into<String>) -> Self {
        self.config.connection_type = connection_type.into();
        self
    }

    /// Set the handshake advice.
    pub fn handshake_advice(mut self, timeout_ms: u64, interval_ms: u64) -> Self {
        self.config.handshake_advice_timeout_ms = timeout_ms;
        self.config.handshake_advice_interval_ms = interval_ms;
        self
    }

    /// Set the connect wait poll interval.
    pub fn connect_poll_interval(mut self, interval: Duration) -> Self {
        self.config.connect_poll_interval = interval;
        self
    }

    /// Set the connect wait ceiling.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
