//! Inbound and outbound Bayeux messages.
//!
//! Inbound frames are decoded into either a meta message, routed to the
//! state machine, or a data message, routed to the subscription registry.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::core::constants::{
    BAYEUX_MINIMUM_VERSION, BAYEUX_VERSION, FIRST_CONNECT_ADVICE_TIMEOUT_MS, META_CONNECT,
    META_DISCONNECT, META_HANDSHAKE, META_SUBSCRIBE, RECONNECT_HANDSHAKE, RECONNECT_NONE,
    RECONNECT_RETRY,
};
use crate::core::{ProtocolError, SubscriptionChannel};

/// The fixed set of meta channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaChannel {
    /// `/meta/handshake`
    Handshake,
    /// `/meta/connect`
    Connect,
    /// `/meta/subscribe`
    Subscribe,
    /// `/meta/disconnect`
    Disconnect,
}

impl MetaChannel {
    /// Match a channel name against the meta channels.
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            META_HANDSHAKE => Some(Self::Handshake),
            META_CONNECT => Some(Self::Connect),
            META_SUBSCRIBE => Some(Self::Subscribe),
            META_DISCONNECT => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Channel name on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => META_HANDSHAKE,
            Self::Connect => META_CONNECT,
            Self::Subscribe => META_SUBSCRIBE,
            Self::Disconnect => META_DISCONNECT,
        }
    }
}

/// Server advice on how to proceed after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Retry the connect.
    Retry,
    /// Start over with a new handshake.
    Handshake,
    /// Do not reconnect.
    None,
    /// Any value this client does not know.
    Unknown,
}

impl<'de> Deserialize<'de> for Reconnect {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            RECONNECT_RETRY => Self::Retry,
            RECONNECT_HANDSHAKE => Self::Handshake,
            RECONNECT_NONE => Self::None,
            _ => Self::Unknown,
        })
    }
}

/// Advice block attached to meta responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Advice {
    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: Option<Reconnect>,
    /// Delay before the next connect (ms). Absent means zero.
    #[serde(default)]
    pub interval: Option<i64>,
    /// Server-side hold time for a connect (ms).
    #[serde(default)]
    pub timeout: Option<i64>,
}

impl Advice {
    /// Whether the advice allows the connect cycle to continue.
    pub fn allows_retry(&self) -> bool {
        self.reconnect == Some(Reconnect::Retry) && self.interval.unwrap_or(0) >= 0
    }

    /// Whether the advice asks for a fresh handshake.
    pub fn wants_handshake(&self) -> bool {
        self.reconnect == Some(Reconnect::Handshake)
    }
}

/// A response on one of the meta channels.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaMessage {
    /// Whether the request succeeded.
    #[serde(default)]
    pub successful: bool,
    /// Session generation assigned by the server.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Reconnect advice.
    #[serde(default)]
    pub advice: Option<Advice>,
    /// Subscription being acknowledged.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Server error description.
    #[serde(default)]
    pub error: Option<String>,
}

/// A message delivered on a data channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// Channel the message arrived on.
    pub channel: String,
    /// Message body: the inbound object without its `channel` key.
    pub data: Value,
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// Meta channel response.
    Meta(MetaChannel, MetaMessage),
    /// Data channel message.
    Data(PushMessage),
}

impl InboundMessage {
    /// Classify one inbound JSON object.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let channel = match object.get("channel") {
            Some(Value::String(channel)) => channel.clone(),
            _ => return Err(ProtocolError::MissingChannel),
        };

        if let Some(meta) = MetaChannel::from_channel(&channel) {
            let message = serde_json::from_value(Value::Object(object))?;
            return Ok(Self::Meta(meta, message));
        }

        let _ = object.remove("channel");
        Ok(Self::Data(PushMessage {
            channel,
            data: Value::Object(object),
        }))
    }

    /// The `error` field, if the server set one.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Meta(_, message) => message.error.as_deref(),
            Self::Data(message) => message.data.get("error").and_then(Value::as_str),
        }
    }
}

/// Decode one inbound frame.
///
/// Frames are JSON arrays, normally holding exactly one message. A bare
/// object is accepted as a single message.
pub fn decode_frame(text: &str) -> Result<Vec<InboundMessage>, ProtocolError> {
    let values = match serde_json::from_str::<Value>(text)? {
        Value::Array(values) => values,
        object @ Value::Object(_) => vec![object],
        _ => return Err(ProtocolError::NotAnObject),
    };

    if values.is_empty() {
        return Err(ProtocolError::EmptyEnvelope);
    }

    values.into_iter().map(InboundMessage::from_value).collect()
}

/// Parameters for the handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    /// Push subscription id from the authenticated session.
    pub push_subscription_id: String,
    /// Connection types offered to the server.
    pub supported_connection_types: Vec<String>,
    /// Advice timeout (ms).
    pub advice_timeout_ms: u64,
    /// Advice interval (ms).
    pub advice_interval_ms: u64,
}

/// An outbound meta request, before sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// `/meta/handshake`
    Handshake(HandshakeParams),
    /// `/meta/connect`
    Connect {
        /// Current session generation.
        client_id: String,
        /// Connection type name.
        connection_type: String,
        /// First connect after a handshake carries a zero advice timeout.
        first: bool,
    },
    /// `/meta/subscribe`
    Subscribe {
        /// Current session generation.
        client_id: String,
        /// Channel to subscribe to.
        subscription: SubscriptionChannel,
    },
}

impl OutboundMessage {
    /// Meta channel this request goes to.
    pub fn channel(&self) -> MetaChannel {
        match self {
            Self::Handshake(_) => MetaChannel::Handshake,
            Self::Connect { .. } => MetaChannel::Connect,
            Self::Subscribe { .. } => MetaChannel::Subscribe,
        }
    }

    /// Logical message body, without the sequence id.
    pub fn to_object(&self) -> Map<String, Value> {
        let value = match self {
            Self::Handshake(params) => json!({
                "channel": META_HANDSHAKE,
                "version": BAYEUX_VERSION,
                "minimumVersion": BAYEUX_MINIMUM_VERSION,
                "supportedConnectionTypes": params.supported_connection_types,
                "advice": {
                    "timeout": params.advice_timeout_ms,
                    "interval": params.advice_interval_ms,
                },
                "ext": { "subscriptionId": params.push_subscription_id },
            }),
            Self::Connect {
                client_id,
                connection_type,
                first,
            } => {
                let mut value = json!({
                    "channel": META_CONNECT,
                    "clientId": client_id,
                    "connectionType": connection_type,
                });
                if *first {
                    value["advice"] = json!({ "timeout": FIRST_CONNECT_ADVICE_TIMEOUT_MS });
                }
                value
            }
            Self::Subscribe {
                client_id,
                subscription,
            } => json!({
                "channel": META_SUBSCRIBE,
                "clientId": client_id,
                "subscription": subscription.as_str(),
            }),
        };

        match value {
            Value::Object(object) => object,
            _ => Map::new(),
        }
    }
}
