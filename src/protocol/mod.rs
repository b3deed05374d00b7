//! Bayeux protocol layer.
//!
//! Pure, I/O-free building blocks:
//!
//! - **Messages**: [`InboundMessage`], [`MetaChannel`], [`OutboundMessage`]
//! - **Envelopes**: [`EnvelopeBuilder`] stamping ids from one [`SequenceCounter`]
//! - **State machine**: [`ProtocolStateMachine`] driving handshake and connect
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Client (registry, dispatch loop)    │
//! ├─────────────────────────────────────────┤
//! │            Protocol Layer               │  ← This module
//! │   meta messages, envelopes, states      │
//! ├─────────────────────────────────────────┤
//! │     Transport (framed, bidirectional)   │
//! └─────────────────────────────────────────┘
//! ```

mod envelope;
mod message;
mod state;

pub use envelope::*;
pub use message::*;
pub use state::*;
