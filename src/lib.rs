//! # cometd-push
//!
//! Client for a Bayeux/CometD push service over one persistent WebSocket
//! connection.
//!
//! The client performs the Bayeux handshake, keeps the session alive with
//! long-poll style connect messages, subscribes to data channels, and routes
//! each incoming data message to the callback registered for its channel.
//! Subscriptions survive reconnects: after a new session is connected every
//! registered channel is subscribed again.
//!
//! ## Feature Flags
//!
//! - `transport` (default): transport traits, WebSocket and in-memory connectors
//! - `client` (default): [`client::PushClient`], subscription registry, dispatch loop
//!
//! ## Modules
//!
//! - [`core`]: channel naming, constants, errors, handler trait (always included)
//! - [`protocol`]: Bayeux messages, envelope builder, state machine (always included)
//! - [`transport`]: transport layer (requires `transport` feature)
//! - [`client`]: high-level client (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cometd_push::prelude::*;
//!
//! # async fn run() -> Result<(), PushError> {
//! let client = PushClient::new(ClientConfig::default());
//! let cookies = SessionCookies::new().with("csid", "abc123");
//! client.start_connection("push-subscription-id", &cookies).await?;
//!
//! client
//!     .subscribe(ChannelType::Orders, &["1001", "1002"], |msg: PushMessage| {
//!         println!("{}: {}", msg.channel, msg.data);
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Bayeux protocol (always included)
pub mod protocol;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::protocol::{ConnectionState, PushMessage};

    #[cfg(feature = "transport")]
    pub use crate::transport::{Connector, SessionCookies, WebSocketConnector};

    #[cfg(feature = "client")]
    pub use crate::client::{ClientConfig, PushClient, PushClientBuilder};
}

// Re-export commonly used items at crate root
pub use crate::core::{ChannelType, MessageHandler, PushError, PushResult, SubscriptionChannel};
pub use crate::protocol::{ConnectionState, PushMessage};

#[cfg(feature = "client")]
pub use crate::client::{ClientConfig, PushClient, PushClientBuilder};

#[cfg(feature = "transport")]
pub use crate::transport::SessionCookies;
