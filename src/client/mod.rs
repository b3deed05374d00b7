//! Push client.
//!
//! High-level API: [`PushClient`] plus its configuration and the
//! subscription registry it keeps across reconnects.

#[allow(clippy::module_inception)]
mod client;
mod config;
mod dispatch;
mod registry;

pub use client::*;
pub use config::*;
pub use registry::*;
