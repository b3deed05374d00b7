//! Core types shared by every layer: constants, errors, channel naming and
//! the message handler trait.

pub mod channel;
pub mod constants;
mod error;
mod traits;

pub use channel::{ChannelType, SubscriptionChannel};
pub use error::*;
pub use traits::*;
