//! Error types for the push client.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading the next frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// A frame arrived that is not valid text.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Check if this error leaves the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Closed | TransportError::Receive(_)
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors decoding or interpreting protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Inbound envelope was an empty array.
    #[error("empty envelope")]
    EmptyEnvelope,

    /// Message is not a JSON object.
    #[error("message is not an object")]
    NotAnObject,

    /// Message has no `channel` field.
    #[error("message has no channel")]
    MissingChannel,
}

/// Top-level errors surfaced to callers.
#[derive(Debug, Error)]
pub enum PushError {
    /// The connection did not reach `Connected` in time.
    #[error("not connected after {}ms", waited.as_millis())]
    Timeout {
        /// How long we waited.
        waited: Duration,
    },

    /// Malformed request; nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a `Connected` client.
    #[error("client is not connected")]
    NotConnected,

    /// The client was shut down.
    #[error("client shut down")]
    Shutdown,

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl PushError {
    /// Check if this is a connect-wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PushError::Timeout { .. })
    }

    /// Check if this is an argument validation failure.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, PushError::InvalidArgument(_))
    }
}

/// Result type for client operations.
pub type PushResult<T> = Result<T, PushError>;
