//! Subscription registry.
//!
//! Maps each subscription channel to its handler and to the session
//! generation it is known to be active on. Entries outlive reconnects, so
//! every registered subscription is either active on the current session or
//! queued for resubscription.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{MessageHandler, SubscriptionChannel};

struct Entry {
    handler: Arc<dyn MessageHandler>,
    /// Generation the server acknowledged this subscription on.
    acknowledged: Option<String>,
    /// Generation a subscribe frame was last sent for.
    requested: Option<String>,
}

/// Thread-safe subscription registry.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<SubscriptionChannel, Entry>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `channel`, replacing any previous handler.
    ///
    /// `requested` is the generation the caller is about to send a subscribe
    /// for. The entry starts unacknowledged. Returns `true` if an entry was
    /// replaced.
    pub fn insert(
        &self,
        channel: SubscriptionChannel,
        handler: Arc<dyn MessageHandler>,
        requested: Option<String>,
    ) -> bool {
        let entry = Entry {
            handler,
            acknowledged: None,
            requested,
        };
        self.entries.write().insert(channel, entry).is_some()
    }

    /// Remove the entry for `channel`. Returns `true` if one existed.
    pub fn remove(&self, channel: &str) -> bool {
        self.entries.write().remove(channel).is_some()
    }

    /// Handler registered for `channel`.
    pub fn handler(&self, channel: &str) -> Option<Arc<dyn MessageHandler>> {
        self.entries
            .read()
            .get(channel)
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Record a server acknowledgement. Returns `false` for unknown channels.
    pub fn acknowledge(&self, channel: &str, generation: &str) -> bool {
        match self.entries.write().get_mut(channel) {
            Some(entry) => {
                entry.acknowledged = Some(generation.to_owned());
                true
            }
            None => false,
        }
    }

    /// Channels not yet active or requested on `generation`.
    ///
    /// The returned channels are marked as requested on `generation`, so a
    /// concurrent caller does not resend them.
    pub fn take_stale(&self, generation: &str) -> Vec<SubscriptionChannel> {
        let mut entries = self.entries.write();
        let mut stale: Vec<SubscriptionChannel> = entries
            .iter_mut()
            .filter(|(_, entry)| {
                entry.acknowledged.as_deref() != Some(generation)
                    && entry.requested.as_deref() != Some(generation)
            })
            .map(|(channel, entry)| {
                entry.requested = Some(generation.to_owned());
                channel.clone()
            })
            .collect();
        stale.sort();
        stale
    }

    /// Forget every acknowledgement and pending request.
    ///
    /// Called when the transport goes away, so a server that reissues the
    /// same client id on the next handshake still gets every subscription.
    pub fn invalidate(&self) {
        for entry in self.entries.write().values_mut() {
            entry.acknowledged = None;
            entry.requested = None;
        }
    }

    /// Whether `channel` is acknowledged on `generation`.
    pub fn is_active(&self, channel: &str, generation: &str) -> bool {
        self.entries
            .read()
            .get(channel)
            .is_some_and(|entry| entry.acknowledged.as_deref() == Some(generation))
    }

    /// All registered channels, sorted.
    pub fn channels(&self) -> Vec<SubscriptionChannel> {
        let mut channels: Vec<_> = self.entries.read().keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::core::ChannelType;
    use crate::protocol::PushMessage;

    fn quotes(id: &str) -> SubscriptionChannel {
        SubscriptionChannel::new(ChannelType::Quotes, &[id]).unwrap()
    }

    fn noop() -> Arc<dyn MessageHandler> {
        Arc::new(|_: PushMessage| {})
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.insert(quotes("5361"), noop(), None));

        assert!(registry.handler("/quotes/5361").is_some());
        assert!(registry.handler("/quotes/536").is_none());
        assert!(registry.handler("/quotes/5361,1").is_none());
    }

    #[test]
    fn test_last_handler_wins() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        let _ = registry.insert(
            quotes("1"),
            Arc::new(move |_: PushMessage| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        );
        let counter = Arc::clone(&second);
        assert!(registry.insert(
            quotes("1"),
            Arc::new(move |_: PushMessage| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        ));

        let handler = registry.handler("/quotes/1").unwrap();
        handler.on_message(PushMessage {
            channel: "/quotes/1".into(),
            data: json!({}),
        });
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_take_stale_after_new_generation() {
        let registry = SubscriptionRegistry::new();
        let _ = registry.insert(quotes("1"), noop(), Some("gen-1".into()));
        let _ = registry.insert(quotes("2"), noop(), Some("gen-1".into()));
        assert!(registry.acknowledge("/quotes/1", "gen-1"));

        // Same generation: already requested or active.
        assert!(registry.take_stale("gen-1").is_empty());

        let stale = registry.take_stale("gen-2");
        assert_eq!(stale, vec![quotes("1"), quotes("2")]);
        assert!(registry.take_stale("gen-2").is_empty());

        assert!(!registry.is_active("/quotes/1", "gen-2"));
        assert!(registry.acknowledge("/quotes/1", "gen-2"));
        assert!(registry.is_active("/quotes/1", "gen-2"));
    }

    #[test]
    fn test_invalidate_forces_resend_on_same_generation() {
        let registry = SubscriptionRegistry::new();
        let _ = registry.insert(quotes("1"), noop(), Some("gen-1".into()));
        let _ = registry.acknowledge("/quotes/1", "gen-1");
        assert!(registry.take_stale("gen-1").is_empty());

        registry.invalidate();
        assert_eq!(registry.take_stale("gen-1"), vec![quotes("1")]);
        assert!(registry.handler("/quotes/1").is_some());
    }

    #[test]
    fn test_remove() {
        let registry = SubscriptionRegistry::new();
        let _ = registry.insert(quotes("1"), noop(), None);
        assert!(registry.remove("/quotes/1"));
        assert!(!registry.remove("/quotes/1"));
        assert!(registry.handler("/quotes/1").is_none());
    }

    #[test]
    fn test_acknowledge_unknown_channel() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.acknowledge("/quotes/9", "gen-1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reinsert_resets_acknowledgement() {
        let registry = SubscriptionRegistry::new();
        let _ = registry.insert(quotes("1"), noop(), Some("gen-1".into()));
        let _ = registry.acknowledge("/quotes/1", "gen-1");
        let _ = registry.insert(quotes("1"), noop(), Some("gen-1".into()));
        assert!(!registry.is_active("/quotes/1", "gen-1"));
    }
}
