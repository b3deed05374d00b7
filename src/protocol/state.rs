//! Bayeux session state machine.
//!
//! ```text
//!   Disconnected ──begin()──▶ HandshakePending ──first connect ok──▶ Connected
//!        ▲                      ▲        │                              │
//!        │                      │        └── handshake ok: send connect │
//!        │                      └──── /meta/disconnect, re-handshake ◀──┘
//!        └──────────── transport closed ───────────────────────────────┘
//! ```
//!
//! The machine does no I/O. Each inbound meta message yields a list of
//! [`Action`]s for the caller to carry out in order.

use tracing::{debug, info, warn};

use super::message::{HandshakeParams, MetaChannel, MetaMessage, OutboundMessage};
use crate::core::SubscriptionChannel;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, or the transport ended.
    #[default]
    Disconnected,
    /// Handshake sent; waiting for the first successful connect.
    HandshakePending,
    /// Session established and connect cycle running.
    Connected,
}

/// Work the state machine asks the caller to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a meta request.
    Send(OutboundMessage),
    /// Resend every subscription not yet active on `client_id`.
    Resubscribe {
        /// The new session generation.
        client_id: String,
    },
    /// The server acknowledged `subscription` on `client_id`.
    MarkSubscribed {
        /// Acknowledged channel.
        subscription: SubscriptionChannel,
        /// Session generation it is active on.
        client_id: String,
    },
}

/// Session parameters fixed for the life of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Connection type announced on connect.
    pub connection_type: String,
    /// Connection types offered in the handshake.
    pub supported_connection_types: Vec<String>,
    /// Handshake advice timeout (ms).
    pub advice_timeout_ms: u64,
    /// Handshake advice interval (ms).
    pub advice_interval_ms: u64,
}

/// The protocol state machine.
#[derive(Debug)]
pub struct ProtocolStateMachine {
    params: SessionParams,
    push_subscription_id: Option<String>,
    state: ConnectionState,
    client_id: Option<String>,
}

impl ProtocolStateMachine {
    /// Create a machine in the `Disconnected` state.
    pub fn new(params: SessionParams) -> Self {
        Self {
            params,
            push_subscription_id: None,
            state: ConnectionState::Disconnected,
            client_id: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current session generation, if a handshake succeeded.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Start a new session on a freshly opened transport.
    pub fn begin(&mut self, push_subscription_id: &str) -> Action {
        self.push_subscription_id = Some(push_subscription_id.to_owned());
        self.client_id = None;
        self.state = ConnectionState::HandshakePending;
        Action::Send(self.handshake())
    }

    /// The transport is gone.
    pub fn on_transport_closed(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!(previous = ?self.state, "push session disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.client_id = None;
    }

    /// Build a subscribe request for the current session, together with the
    /// client id it is addressed to.
    ///
    /// Returns `None` unless the session is `Connected`.
    pub fn subscribe_request(
        &self,
        subscription: SubscriptionChannel,
    ) -> Option<(String, OutboundMessage)> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        let client_id = self.client_id.clone()?;
        let message = OutboundMessage::Subscribe {
            client_id: client_id.clone(),
            subscription,
        };
        Some((client_id, message))
    }

    /// Process an inbound meta message.
    pub fn on_meta(&mut self, channel: MetaChannel, message: &MetaMessage) -> Vec<Action> {
        if self.state == ConnectionState::Disconnected {
            debug!(channel = channel.as_str(), "meta message while disconnected, ignored");
            return Vec::new();
        }

        match channel {
            MetaChannel::Handshake => self.on_handshake(message),
            MetaChannel::Connect => self.on_connect(message),
            MetaChannel::Subscribe => self.on_subscribe(message),
            MetaChannel::Disconnect => self.on_disconnect(),
        }
    }

    fn on_handshake(&mut self, message: &MetaMessage) -> Vec<Action> {
        if message.successful {
            let Some(client_id) = message.client_id.clone() else {
                warn!("successful handshake without clientId, handshaking again");
                return vec![Action::Send(self.handshake())];
            };

            info!(client_id = %client_id, "push handshake accepted");
            // A new generation: stay pending until its first connect succeeds.
            self.state = ConnectionState::HandshakePending;
            self.client_id = Some(client_id.clone());
            return vec![Action::Send(self.connect(client_id, true))];
        }

        let wants_handshake = message.advice.as_ref().is_some_and(|a| a.wants_handshake());
        if wants_handshake {
            debug!("handshake rejected, server advises handshake");
            return vec![Action::Send(self.handshake())];
        }

        warn!(error = ?message.error, "handshake rejected without handshake advice");
        Vec::new()
    }

    fn on_connect(&mut self, message: &MetaMessage) -> Vec<Action> {
        let continue_cycle = message.successful
            && message.advice.as_ref().is_none_or(|advice| advice.allows_retry());

        if continue_cycle {
            let Some(client_id) = self.client_id.clone() else {
                warn!("connect response before handshake, ignored");
                return Vec::new();
            };

            let mut actions = vec![Action::Send(self.connect(client_id.clone(), false))];
            if self.state != ConnectionState::Connected {
                info!(client_id = %client_id, "push session connected");
                self.state = ConnectionState::Connected;
                actions.push(Action::Resubscribe { client_id });
            }
            return actions;
        }

        match self.client_id.clone() {
            Some(client_id) => {
                debug!(successful = message.successful, "connect not accepted, retrying");
                vec![Action::Send(self.connect(client_id, false))]
            }
            None => {
                warn!("connect failed with no session, ignored");
                Vec::new()
            }
        }
    }

    fn on_subscribe(&mut self, message: &MetaMessage) -> Vec<Action> {
        let Some(subscription) = message.subscription.as_deref() else {
            warn!("subscribe acknowledgement without subscription, ignored");
            return Vec::new();
        };

        if !message.successful {
            warn!(
                subscription,
                error = ?message.error,
                "subscription rejected, left for next resubscribe"
            );
            return Vec::new();
        }

        match self.client_id.clone() {
            Some(client_id) => vec![Action::MarkSubscribed {
                subscription: SubscriptionChannel::from_wire(subscription),
                client_id,
            }],
            None => Vec::new(),
        }
    }

    fn on_disconnect(&mut self) -> Vec<Action> {
        info!("server ended the push session, handshaking again");
        self.state = ConnectionState::HandshakePending;
        vec![Action::Send(self.handshake())]
    }

    fn handshake(&self) -> OutboundMessage {
        OutboundMessage::Handshake(HandshakeParams {
            push_subscription_id: self.push_subscription_id.clone().unwrap_or_default(),
            supported_connection_types: self.params.supported_connection_types.clone(),
            advice_timeout_ms: self.params.advice_timeout_ms,
            advice_interval_ms: self.params.advice_interval_ms,
        })
    }

    fn connect(&self, client_id: String, first: bool) -> OutboundMessage {
        OutboundMessage::Connect {
            client_id,
            connection_type: self.params.connection_type.clone(),
            first,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::ChannelType;

    fn params() -> SessionParams {
        SessionParams {
            connection_type: "websocket".into(),
            supported_connection_types: vec!["websocket".into()],
            advice_timeout_ms: 60_000,
            advice_interval_ms: 0,
        }
    }

    fn meta(value: serde_json::Value) -> MetaMessage {
        serde_json::from_value(value).unwrap()
    }

    fn connected() -> ProtocolStateMachine {
        let mut machine = ProtocolStateMachine::new(params());
        let _ = machine.begin("push-1");
        let _ = machine.on_meta(
            MetaChannel::Handshake,
            &meta(json!({ "successful": true, "clientId": "gen-1" })),
        );
        let _ = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": true })));
        machine
    }

    #[test]
    fn test_begin_sends_handshake() {
        let mut machine = ProtocolStateMachine::new(params());
        assert_eq!(machine.state(), ConnectionState::Disconnected);

        match machine.begin("push-1") {
            Action::Send(OutboundMessage::Handshake(p)) => {
                assert_eq!(p.push_subscription_id, "push-1");
            }
            other => panic!("expected handshake, got {other:?}"),
        }
        assert_eq!(machine.state(), ConnectionState::HandshakePending);
    }

    #[test]
    fn test_handshake_then_connect_reaches_connected() {
        let mut machine = ProtocolStateMachine::new(params());
        let _ = machine.begin("push-1");

        let actions = machine.on_meta(
            MetaChannel::Handshake,
            &meta(json!({ "successful": true, "clientId": "gen-1" })),
        );
        assert_eq!(
            actions,
            vec![Action::Send(OutboundMessage::Connect {
                client_id: "gen-1".into(),
                connection_type: "websocket".into(),
                first: true,
            })]
        );
        assert_eq!(machine.state(), ConnectionState::HandshakePending);
        assert_eq!(machine.client_id(), Some("gen-1"));

        let actions = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": true })));
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[0],
            Action::Send(OutboundMessage::Connect { first: false, .. })
        ));
        assert_eq!(
            actions[1],
            Action::Resubscribe {
                client_id: "gen-1".into()
            }
        );
        assert!(machine.is_connected());
    }

    #[test]
    fn test_connect_cycle_resubscribes_once() {
        let mut machine = connected();
        let actions = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": true })));
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::Send(OutboundMessage::Connect { .. })));
    }

    #[test]
    fn test_connect_with_retry_advice() {
        let mut machine = connected();
        let actions = machine.on_meta(
            MetaChannel::Connect,
            &meta(json!({ "successful": true, "advice": { "reconnect": "retry", "interval": 0 } })),
        );
        assert_eq!(actions.len(), 1);
        assert!(machine.is_connected());
    }

    #[test]
    fn test_failed_connect_retries_with_known_session() {
        let mut machine = connected();
        let actions = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": false })));
        assert!(matches!(
            &actions[..],
            [Action::Send(OutboundMessage::Connect { client_id, first: false, .. })] if client_id == "gen-1"
        ));
    }

    #[test]
    fn test_failed_connect_without_session_is_ignored() {
        let mut machine = ProtocolStateMachine::new(params());
        let _ = machine.begin("push-1");
        let actions = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": false })));
        assert!(actions.is_empty());
        assert_eq!(machine.state(), ConnectionState::HandshakePending);
    }

    #[test]
    fn test_rejected_handshake_with_advice_retries() {
        let mut machine = ProtocolStateMachine::new(params());
        let _ = machine.begin("push-1");

        let actions = machine.on_meta(
            MetaChannel::Handshake,
            &meta(json!({ "successful": false, "advice": { "reconnect": "handshake" } })),
        );
        assert!(matches!(&actions[..], [Action::Send(OutboundMessage::Handshake(_))]));

        let actions = machine.on_meta(
            MetaChannel::Handshake,
            &meta(json!({ "successful": false, "advice": { "reconnect": "none" } })),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_server_disconnect_rehandshakes_and_resubscribes() {
        let mut machine = connected();

        let actions = machine.on_meta(MetaChannel::Disconnect, &MetaMessage::default());
        assert!(matches!(&actions[..], [Action::Send(OutboundMessage::Handshake(_))]));
        assert_eq!(machine.state(), ConnectionState::HandshakePending);

        let _ = machine.on_meta(
            MetaChannel::Handshake,
            &meta(json!({ "successful": true, "clientId": "gen-2" })),
        );
        let actions = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": true })));
        assert_eq!(
            actions.last(),
            Some(&Action::Resubscribe {
                client_id: "gen-2".into()
            })
        );
    }

    #[test]
    fn test_subscribe_ack() {
        let mut machine = connected();
        let actions = machine.on_meta(
            MetaChannel::Subscribe,
            &meta(json!({ "successful": true, "subscription": "/quotes/5361" })),
        );
        assert_eq!(
            actions,
            vec![Action::MarkSubscribed {
                subscription: SubscriptionChannel::new(ChannelType::Quotes, &["5361"]).unwrap(),
                client_id: "gen-1".into(),
            }]
        );

        let rejected = machine.on_meta(
            MetaChannel::Subscribe,
            &meta(json!({ "successful": false, "subscription": "/quotes/5361" })),
        );
        assert!(rejected.is_empty());

        let missing = machine.on_meta(MetaChannel::Subscribe, &meta(json!({ "successful": true })));
        assert!(missing.is_empty());
    }

    #[test]
    fn test_subscribe_request_requires_connected() {
        let mut machine = ProtocolStateMachine::new(params());
        let channel = SubscriptionChannel::new(ChannelType::Quotes, &["5361"]).unwrap();
        assert!(machine.subscribe_request(channel.clone()).is_none());

        let _ = machine.begin("push-1");
        assert!(machine.subscribe_request(channel.clone()).is_none());

        let machine = connected();
        let (client_id, message) = machine.subscribe_request(channel.clone()).unwrap();
        assert_eq!(client_id, "gen-1");
        assert_eq!(
            message,
            OutboundMessage::Subscribe {
                client_id: "gen-1".into(),
                subscription: channel,
            }
        );
    }

    #[test]
    fn test_transport_closed_resets() {
        let mut machine = connected();
        machine.on_transport_closed();
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(machine.client_id(), None);

        let actions = machine.on_meta(MetaChannel::Connect, &meta(json!({ "successful": true })));
        assert!(actions.is_empty());
    }
}
