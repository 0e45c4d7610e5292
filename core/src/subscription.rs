use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::queue::{SubscriberId, SubscriberQueue};
use crate::registry::Registry;

/// How long a deregistered queue keeps absorbing late handoffs.
pub const DRAIN_GRACE: Duration = Duration::from_secs(60);

/// A live registration on one channel, owned by the transport that serves it.
///
/// Call [`hangup`](Self::hangup) when the peer goes away. Dropping the value
/// without doing so performs the same cleanup.
pub struct Subscription {
    registry: Arc<Registry>,
    channel: String,
    queue: Arc<SubscriberQueue>,
    drain_grace: Duration,
    released: bool,
}

impl Subscription {
    pub(crate) fn new(registry: Arc<Registry>, channel: String, drain_grace: Duration) -> Self {
        let queue = Arc::new(SubscriberQueue::new());
        registry.register(&channel, queue.clone());
        info!(channel = %channel, subscriber = %queue.id(), "subscriber registered");
        Self {
            registry,
            channel,
            queue,
            drain_grace,
            released: false,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn id(&self) -> SubscriberId {
        self.queue.id()
    }

    /// Next message published to the channel while this subscriber was
    /// waiting. `None` means the subscription has ended.
    pub async fn recv(&self) -> Option<String> {
        self.queue.recv().await
    }

    /// Deregister and start draining.
    pub fn hangup(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.deregister(&self.channel, &self.queue);
        info!(channel = %self.channel, subscriber = %self.queue.id(), "subscriber hung up");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drain(
                    self.queue.clone(),
                    self.channel.clone(),
                    self.drain_grace,
                ));
            }
            // no runtime left to drain on; refuse further handoffs instead
            Err(_) => self.queue.close(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Accept and discard handoffs aimed at a deregistered queue until `grace`
/// runs out, then close it for good.
async fn drain(queue: Arc<SubscriberQueue>, channel: String, grace: Duration) {
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    let mut discarded = 0usize;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            msg = queue.recv() => match msg {
                Some(_) => discarded += 1,
                None => break,
            },
        }
    }
    queue.close();
    debug!(channel = %channel, subscriber = %queue.id(), discarded, "drain finished");
}
