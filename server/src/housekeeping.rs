use fanoutcore::Hub;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::info;

/// Periodically forget channels that have had no listeners and no traffic for
/// `ttl`. Runs every `ttl / 2`, at most once a second.
pub fn spawn_pruner(hub: Hub, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = interval(period);
        loop {
            tick.tick().await;
            let removed = hub.prune_idle(ttl);
            if removed > 0 {
                info!(removed, "pruned idle channels");
            }
        }
    })
}
