//! Core traits for the push client.

use crate::protocol::PushMessage;

/// Receiver of data-channel messages.
///
/// Invoked on the dispatch task, so implementations should return quickly
/// and hand heavy work off to their own task or channel.
///
/// Any `Fn(PushMessage) + Send + Sync` closure is a handler:
///
/// ```ignore
/// client
///     .subscribe_to_id(ChannelType::Quotes, "5361", |msg: PushMessage| {
///         println!("{} -> {}", msg.channel, msg.data);
///     })
///     .await?;
/// ```
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one inbound data message.
    fn on_message(&self, message: PushMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(PushMessage) + Send + Sync + 'static,
{
    fn on_message(&self, message: PushMessage) {
        self(message)
    }
}
