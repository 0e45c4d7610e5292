use channel_api::ChannelStatus;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::registry::Registry;
use crate::subscription::{Subscription, DRAIN_GRACE};

/// Outcome of one publish. Only ever logged, never reported to the publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// Entry point shared by every request handler: publish, subscribe and
/// inspect channels. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<Registry>,
    drain_grace: Duration,
}

impl Hub {
    pub fn new() -> Self {
        Self::with_drain_grace(DRAIN_GRACE)
    }

    pub fn with_drain_grace(drain_grace: Duration) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            drain_grace,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a new subscriber on `channel`.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        Subscription::new(self.registry.clone(), channel.to_string(), self.drain_grace)
    }

    /// Count the message and hand it to every subscriber that is waiting for
    /// one right now. Never blocks on a subscriber.
    pub fn publish(&self, channel: &str, message: &str) -> Delivery {
        let subscribers = self.registry.snapshot_for_broadcast(channel);
        let mut delivery = Delivery::default();
        for queue in subscribers {
            match queue.try_send(message.to_string()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    delivery.dropped += 1;
                    debug!(channel = %channel, subscriber = %queue.id(), reason = %e, "message dropped");
                }
            }
        }
        debug!(
            channel = %channel,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "broadcast"
        );
        delivery
    }

    pub fn channels(&self) -> Vec<ChannelStatus> {
        self.registry.list_channels()
    }

    pub fn status(&self, channel: &str) -> Option<ChannelStatus> {
        self.registry.status(channel)
    }

    /// See [`Registry::prune_idle`].
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        self.registry.prune_idle(max_idle)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
