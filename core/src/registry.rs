use channel_api::ChannelStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::queue::SubscriberQueue;

struct ChannelEntry {
    subscribers: Vec<Arc<SubscriberQueue>>,
    messages: u64,
    last_activity: Instant,
}

impl ChannelEntry {
    fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            messages: 0,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Channel name to subscriber list and message counter.
///
/// Every read and write goes through one lock that is never held across an
/// await point or a delivery attempt.
#[derive(Default)]
pub struct Registry {
    channels: Mutex<HashMap<String, ChannelEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `queue` to the channel, creating the entry if needed.
    ///
    /// Each queue is registered once, by the `Subscription` that owns it.
    pub fn register(&self, channel: &str, queue: Arc<SubscriberQueue>) {
        let mut guard = self.channels.lock();
        let entry = guard
            .entry(channel.to_string())
            .or_insert_with(ChannelEntry::new);
        debug_assert!(
            !entry.subscribers.iter().any(|q| Arc::ptr_eq(q, &queue)),
            "queue registered twice"
        );
        entry.subscribers.push(queue);
        entry.touch();
    }

    /// Remove `queue` from the channel. Returns false if it was not there.
    /// The entry itself is kept so its message count survives.
    pub fn deregister(&self, channel: &str, queue: &Arc<SubscriberQueue>) -> bool {
        let mut guard = self.channels.lock();
        let Some(entry) = guard.get_mut(channel) else {
            return false;
        };
        match entry.subscribers.iter().position(|q| Arc::ptr_eq(q, queue)) {
            Some(idx) => {
                entry.subscribers.remove(idx);
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Copy of the current subscriber list.
    pub fn snapshot(&self, channel: &str) -> Vec<Arc<SubscriberQueue>> {
        self.channels
            .lock()
            .get(channel)
            .map(|e| e.subscribers.clone())
            .unwrap_or_default()
    }

    pub fn increment_message_count(&self, channel: &str) {
        let mut guard = self.channels.lock();
        let entry = guard
            .entry(channel.to_string())
            .or_insert_with(ChannelEntry::new);
        entry.messages += 1;
        entry.touch();
    }

    /// Snapshot and count a broadcast in a single critical section.
    pub fn snapshot_for_broadcast(&self, channel: &str) -> Vec<Arc<SubscriberQueue>> {
        let mut guard = self.channels.lock();
        let entry = guard
            .entry(channel.to_string())
            .or_insert_with(ChannelEntry::new);
        entry.messages += 1;
        entry.touch();
        entry.subscribers.clone()
    }

    pub fn status(&self, channel: &str) -> Option<ChannelStatus> {
        self.channels.lock().get(channel).map(|e| ChannelStatus {
            name: channel.to_string(),
            listeners: e.subscribers.len(),
            messages: e.messages,
        })
    }

    /// Every known channel, in no particular order.
    pub fn list_channels(&self) -> Vec<ChannelStatus> {
        self.channels
            .lock()
            .iter()
            .map(|(name, e)| ChannelStatus {
                name: name.clone(),
                listeners: e.subscribers.len(),
                messages: e.messages,
            })
            .collect()
    }

    /// Drop channels that have no subscribers and have seen no activity for
    /// at least `max_idle`. Returns how many were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut guard = self.channels.lock();
        let before = guard.len();
        guard.retain(|_, e| !e.subscribers.is_empty() || e.last_activity.elapsed() < max_idle);
        before - guard.len()
    }
}
