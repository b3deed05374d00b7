//! Outbound envelope construction.
//!
//! Every outbound frame is a one-element JSON array whose object carries a
//! stamped `id`. Ids come from a single [`SequenceCounter`] that starts at 1
//! and is never reset, so ids are unique and strictly increasing for the
//! life of a client.

use serde_json::Value;

use super::message::OutboundMessage;
use crate::core::constants::FIRST_MESSAGE_ID;
use crate::core::ProtocolError;

/// Monotonic message id source.
///
/// Not internally synchronized: the owner must hold exclusive access while
/// stamping and sending, so ids leave in the order they were issued.
#[derive(Debug)]
pub struct SequenceCounter {
    next: u64,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCounter {
    /// Create a counter starting at [`FIRST_MESSAGE_ID`].
    pub fn new() -> Self {
        Self {
            next: FIRST_MESSAGE_ID,
        }
    }

    /// Take the next id and advance.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// The id the next call to [`next_id`](Self::next_id) returns.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// A sequenced, encoded outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Stamped message id.
    pub id: u64,
    /// JSON text to put on the wire.
    pub text: String,
}

/// Wraps logical messages into wire envelopes.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    counter: SequenceCounter,
}

impl EnvelopeBuilder {
    /// Create a builder with a fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `message` with the next id and encode it.
    pub fn wrap(&mut self, message: &OutboundMessage) -> Result<OutboundFrame, ProtocolError> {
        let mut object = message.to_object();
        let id = self.counter.next_id();
        let _ = object.insert("id".into(), Value::String(id.to_string()));

        let text = serde_json::to_string(&[Value::Object(object)])?;
        Ok(OutboundFrame { id, text })
    }

    /// The id the next wrapped frame will carry.
    pub fn next_id(&self) -> u64 {
        self.counter.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChannelType, SubscriptionChannel};

    fn subscribe(channel: &str) -> OutboundMessage {
        OutboundMessage::Subscribe {
            client_id: "abc".into(),
            subscription: SubscriptionChannel::new(ChannelType::Quotes, &[channel]).unwrap(),
        }
    }

    #[test]
    fn test_counter_starts_at_one() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.peek(), 3);
    }

    #[test]
    fn test_wrap_stamps_string_id() {
        let mut builder = EnvelopeBuilder::new();
        let frame = builder.wrap(&subscribe("5361")).unwrap();
        assert_eq!(frame.id, 1);

        let value: Value = serde_json::from_str(&frame.text).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["id"], "1");
        assert_eq!(array[0]["channel"], "/meta/subscribe");
        assert_eq!(array[0]["subscription"], "/quotes/5361");
        assert_eq!(array[0]["clientId"], "abc");
    }

    #[test]
    fn test_ids_have_no_gaps() {
        let mut builder = EnvelopeBuilder::new();
        let ids: Vec<u64> = (0..50)
            .map(|i| builder.wrap(&subscribe(&i.to_string())).unwrap().id)
            .collect();
        let expected: Vec<u64> = (1..=50).collect();
        assert_eq!(ids, expected);
        assert_eq!(builder.next_id(), 51);
    }
}
