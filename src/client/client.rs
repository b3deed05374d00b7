//! High-level push client API.
//!
//! Provides [`PushClient`] for opening a Bayeux session and subscribing to
//! data channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::dispatch;
use super::registry::SubscriptionRegistry;
use crate::core::{
    ChannelType, MessageHandler, PushError, PushResult, SubscriptionChannel, TransportError,
};
use crate::protocol::{
    Action, ConnectionState, EnvelopeBuilder, OutboundMessage, ProtocolStateMachine,
};
use crate::transport::{Connector, FrameSink, SessionCookies, WebSocketConnector};

/// Outbound path: the sink and the id counter share one lock so frames are
/// stamped and written in the same order.
struct Outbound {
    envelope: EnvelopeBuilder,
    sink: Option<Box<dyn FrameSink>>,
}

/// State shared between the public handle and the dispatch task.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) protocol: parking_lot::Mutex<ProtocolStateMachine>,
    pub(crate) registry: SubscriptionRegistry,
    outbound: AsyncMutex<Outbound>,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig) -> Self {
        let protocol = ProtocolStateMachine::new(config.session_params());
        Self {
            config,
            protocol: parking_lot::Mutex::new(protocol),
            registry: SubscriptionRegistry::new(),
            outbound: AsyncMutex::new(Outbound {
                envelope: EnvelopeBuilder::new(),
                sink: None,
            }),
            shutdown: AtomicBool::new(false),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stamp and write one frame.
    pub(crate) async fn send(&self, message: &OutboundMessage) -> PushResult<u64> {
        let mut outbound = self.outbound.lock().await;
        if outbound.sink.is_none() {
            return Err(if self.is_shut_down() {
                PushError::Shutdown
            } else {
                PushError::Transport(TransportError::Closed)
            });
        }

        let frame = outbound.envelope.wrap(message)?;
        debug!(id = frame.id, channel = message.channel().as_str(), frame = %frame.text, "outgoing");

        if let Some(sink) = outbound.sink.as_mut() {
            sink.send(frame.text).await?;
        }
        Ok(frame.id)
    }

    /// Carry out state machine actions in order.
    pub(crate) async fn perform(&self, actions: Vec<Action>) -> PushResult<()> {
        for action in actions {
            match action {
                Action::Send(message) => {
                    self.send(&message).await?;
                }
                Action::Resubscribe { client_id } => self.resubscribe(&client_id).await?,
                Action::MarkSubscribed {
                    subscription,
                    client_id,
                } => {
                    if !self.registry.acknowledge(subscription.as_str(), &client_id) {
                        warn!(%subscription, "acknowledgement for unknown subscription");
                    }
                }
            }
        }
        Ok(())
    }

    async fn resubscribe(&self, client_id: &str) -> PushResult<()> {
        let stale = self.registry.take_stale(client_id);
        if !stale.is_empty() {
            info!(count = stale.len(), client_id, "resubscribing");
        }
        for subscription in stale {
            let message = OutboundMessage::Subscribe {
                client_id: client_id.to_owned(),
                subscription,
            };
            self.send(&message).await?;
        }
        Ok(())
    }

    async fn install_sink(&self, sink: Box<dyn FrameSink>) {
        self.outbound.lock().await.sink = Some(sink);
    }

    /// Drop the sink, revert to `Disconnected`.
    pub(crate) async fn on_transport_closed(&self) {
        let sink = self.outbound.lock().await.sink.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "closing transport");
            }
        }
        self.protocol.lock().on_transport_closed();
        self.registry.invalidate();
    }

    /// Synchronous part of [`on_transport_closed`](Self::on_transport_closed),
    /// run when the dispatch task exits for any reason. The sink is dropped
    /// without a close handshake if it is free.
    pub(crate) fn on_dispatch_exit(&self) {
        if let Ok(mut outbound) = self.outbound.try_lock() {
            outbound.sink = None;
        }
        self.protocol.lock().on_transport_closed();
        self.registry.invalidate();
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A Bayeux push client.
///
/// One client owns at most one transport connection. A single dispatch task
/// consumes inbound frames; handshake and connect replies are answered
/// there, and data messages are delivered to subscription handlers.
///
/// # Example
///
/// ```ignore
/// use cometd_push::prelude::*;
///
/// let client = PushClient::new(ClientConfig::default());
/// client.start_connection(&push_subscription_id, &cookies).await?;
///
/// client
///     .subscribe_to_id(ChannelType::Quotes, "5361", |msg: PushMessage| {
///         println!("{}", msg.data);
///     })
///     .await?;
/// ```
pub struct PushClient {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    worker: AsyncMutex<Option<Worker>>,
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("url", &self.shared.config.url)
            .field("state", &self.connection_state())
            .field("subscriptions", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl PushClient {
    /// Create a client using the WebSocket transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector::new()))
    }

    /// Create a client using a custom transport.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            connector,
            worker: AsyncMutex::new(None),
        }
    }

    /// Open the transport, handshake, and wait until `Connected`.
    ///
    /// Returns immediately if already connected. After a transport failure
    /// this may be called again; subscriptions are kept and resent once the
    /// new session is connected. If the wait times out the connection is
    /// torn down.
    pub async fn start_connection(
        &self,
        push_subscription_id: &str,
        cookies: &SessionCookies,
    ) -> PushResult<()> {
        if self.shared.is_shut_down() {
            return Err(PushError::Shutdown);
        }

        {
            let mut worker = self.worker.lock().await;
            if self.is_connected() {
                return Ok(());
            }
            if let Some(stale) = worker.take() {
                stop_worker(stale).await;
            }

            let config = &self.shared.config;
            let mut headers = config.headers.clone();
            headers.extend(cookies.header());

            info!(url = %config.url, "opening push connection");
            let (sink, source) = self.connector.open(&config.url, &headers).await?;
            self.shared.install_sink(sink).await;

            let handshake = self.shared.protocol.lock().begin(push_subscription_id);

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(dispatch::run(
                Arc::clone(&self.shared),
                source,
                cancel.clone(),
            ));
            *worker = Some(Worker { cancel, handle });

            if let Err(e) = self.shared.perform(vec![handshake]).await {
                self.teardown(&mut worker).await;
                return Err(e);
            }
        }

        if let Err(e) = self.wait_until_connected().await {
            warn!(error = %e, "push connection not established");
            let mut worker = self.worker.lock().await;
            self.teardown(&mut worker).await;
            return Err(e);
        }
        Ok(())
    }

    /// Wait for the `Connected` state.
    ///
    /// Polls every `connect_poll_interval` and fails with
    /// [`PushError::Timeout`] after `connect_timeout`. Fails with
    /// [`PushError::NotConnected`] if the transport is gone.
    pub async fn wait_until_connected(&self) -> PushResult<()> {
        let config = &self.shared.config;
        let started = Instant::now();

        loop {
            match self.connection_state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => return Err(PushError::NotConnected),
                ConnectionState::HandshakePending => {}
            }

            let waited = started.elapsed();
            if waited >= config.connect_timeout {
                return Err(PushError::Timeout { waited });
            }
            tokio::time::sleep(config.connect_poll_interval).await;
        }
    }

    /// Subscribe `handler` to `channel_type` for `ids`.
    ///
    /// Several ids are only accepted for account-level channel types
    /// ([`ChannelType::MULTI_ID`]). Requires a `Connected` client;
    /// subscriptions survive later reconnects. Subscribing to the same
    /// channel again replaces its handler. If the subscribe frame cannot be
    /// sent, nothing stays registered for the channel.
    pub async fn subscribe<S, H>(
        &self,
        channel_type: ChannelType,
        ids: &[S],
        handler: H,
    ) -> PushResult<()>
    where
        S: AsRef<str>,
        H: MessageHandler,
    {
        let channel = SubscriptionChannel::new(channel_type, ids)?;
        if self.shared.is_shut_down() {
            return Err(PushError::Shutdown);
        }

        // Registered under the protocol lock: a re-handshake that follows
        // finds the entry stale for its new client id and resends it.
        let message = {
            let protocol = self.shared.protocol.lock();
            let (client_id, message) = protocol
                .subscribe_request(channel.clone())
                .ok_or(PushError::NotConnected)?;
            let replaced = self
                .shared
                .registry
                .insert(channel.clone(), Arc::new(handler), Some(client_id));
            if replaced {
                debug!(%channel, "replacing subscription handler");
            }
            message
        };

        if let Err(e) = self.shared.send(&message).await {
            let _ = self.shared.registry.remove(channel.as_str());
            return Err(e);
        }
        Ok(())
    }

    /// Subscribe `handler` to a single id.
    pub async fn subscribe_to_id<H: MessageHandler>(
        &self,
        channel_type: ChannelType,
        id: &str,
        handler: H,
    ) -> PushResult<()> {
        self.subscribe(channel_type, &[id], handler).await
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.protocol.lock().state()
    }

    /// Whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.shared.protocol.lock().is_connected()
    }

    /// Current session generation.
    pub fn session_generation(&self) -> Option<String> {
        self.shared.protocol.lock().client_id().map(str::to_owned)
    }

    /// All registered subscription channels.
    pub fn subscription_channels(&self) -> Vec<SubscriptionChannel> {
        self.shared.registry.channels()
    }

    /// Whether `channel` is acknowledged on the current session.
    pub fn is_subscription_active(&self, channel: &SubscriptionChannel) -> bool {
        match self.session_generation() {
            Some(generation) => self.shared.registry.is_active(channel.as_str(), &generation),
            None => false,
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Stop the dispatch task and close the transport.
    ///
    /// Later `start_connection` and `subscribe` calls fail with
    /// [`PushError::Shutdown`].
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let mut worker = self.worker.lock().await;
        self.teardown(&mut worker).await;
        info!("push client shut down");
    }

    async fn teardown(&self, worker: &mut Option<Worker>) {
        if let Some(worker) = worker.take() {
            stop_worker(worker).await;
        }
        self.shared.on_transport_closed().await;
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.try_lock() {
            if let Some(worker) = worker.take() {
                worker.cancel.cancel();
            }
        }
    }
}

async fn stop_worker(worker: Worker) {
    worker.cancel.cancel();
    if let Err(e) = worker.handle.await {
        warn!(error = %e, "dispatch task failed");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::PushClientBuilder;
    use crate::protocol::PushMessage;
    use crate::transport::MemoryConnector;

    fn client() -> (PushClient, crate::transport::MemoryServer) {
        let (connector, server) = MemoryConnector::new();
        let config = PushClientBuilder::new().url("memory://push").build();
        (PushClient::with_connector(config, Arc::new(connector)), server)
    }

    #[tokio::test]
    async fn test_subscribe_validation_sends_nothing() {
        let (client, _server) = client();
        let err = client
            .subscribe(ChannelType::Quotes, &["1", "2"], |_: PushMessage| {})
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(client.subscription_channels().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_fails() {
        let (client, _server) = client();
        let err = client
            .subscribe_to_id(ChannelType::Quotes, "5361", |_: PushMessage| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::NotConnected));
        assert!(client.subscription_channels().is_empty());
    }

    #[tokio::test]
    async fn test_wait_when_disconnected() {
        let (client, _server) = client();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.wait_until_connected().await,
            Err(PushError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_start_after_shutdown_fails() {
        let (client, _server) = client();
        client.shutdown().await;
        assert!(matches!(
            client
                .start_connection("push-1", &SessionCookies::new())
                .await,
            Err(PushError::Shutdown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_cookie_header() {
        let (client, mut server) = client();
        let cookies = SessionCookies::new().with("csid", "abc");

        let server_task = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            assert_eq!(conn.header("Cookie"), Some("csid=abc"));

            let handshake = conn.recv_message().await.unwrap();
            assert_eq!(handshake["ext"]["subscriptionId"], "push-1");
            conn.send_message(json!({
                "channel": "/meta/handshake", "successful": true, "clientId": "gen-1"
            }))
            .unwrap();

            let connect = conn.recv_message().await.unwrap();
            assert_eq!(connect["advice"]["timeout"], 0);
            conn.send_message(json!({ "channel": "/meta/connect", "successful": true }))
                .unwrap();
            conn
        });

        client.start_connection("push-1", &cookies).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.session_generation().as_deref(), Some("gen-1"));

        let _conn = server_task.await.unwrap();
        client.shutdown().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }
}
