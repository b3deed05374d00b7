//! Protocol constants for the Bayeux push client.
//!
//! Wire values here are fixed by the server and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// ENDPOINT
// =============================================================================

/// Default push endpoint.
pub const DEFAULT_PUSH_URL: &str = "wss://www.avanza.se/_push/cometd";

/// Header used to carry the authenticated session cookies.
pub const COOKIE_HEADER: &str = "Cookie";

// =============================================================================
// META CHANNELS
// =============================================================================

/// Session establishment.
pub const META_HANDSHAKE: &str = "/meta/handshake";

/// Keep-alive cycle.
pub const META_CONNECT: &str = "/meta/connect";

/// Subscription registration.
pub const META_SUBSCRIBE: &str = "/meta/subscribe";

/// Server-initiated session teardown.
pub const META_DISCONNECT: &str = "/meta/disconnect";

// =============================================================================
// HANDSHAKE / CONNECT
// =============================================================================

/// Bayeux protocol version sent in the handshake.
pub const BAYEUX_VERSION: &str = "1.0";

/// Minimum Bayeux version accepted.
pub const BAYEUX_MINIMUM_VERSION: &str = "1.0";

/// Connection type announced on every connect.
pub const CONNECTION_TYPE_WEBSOCKET: &str = "websocket";

/// Connection types offered in the handshake.
pub const SUPPORTED_CONNECTION_TYPES: [&str; 3] =
    ["websocket", "long-polling", "callback-polling"];

/// Handshake advice: server-side connect hold (ms).
pub const HANDSHAKE_ADVICE_TIMEOUT_MS: u64 = 60_000;

/// Handshake advice: delay between connects (ms).
pub const HANDSHAKE_ADVICE_INTERVAL_MS: u64 = 0;

/// Advice timeout attached to the first connect after a handshake (ms).
pub const FIRST_CONNECT_ADVICE_TIMEOUT_MS: u64 = 0;

/// Advice value asking for a fresh handshake.
pub const RECONNECT_HANDSHAKE: &str = "handshake";

/// Advice value asking for a connect retry.
pub const RECONNECT_RETRY: &str = "retry";

/// Advice value asking the client to stop.
pub const RECONNECT_NONE: &str = "none";

// =============================================================================
// SEQUENCING
// =============================================================================

/// First id stamped on an outbound frame.
pub const FIRST_MESSAGE_ID: u64 = 1;

// =============================================================================
// TIMING
// =============================================================================

/// How often the connect wait checks the connection state.
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Ceiling on the connect wait.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
