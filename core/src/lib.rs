//! In-process channel fanout: a registry of subscribers per channel name and
//! a best-effort broadcast that never waits on a subscriber.

pub mod hub;
pub mod queue;
pub mod registry;
pub mod subscription;

pub use hub::{Delivery, Hub};
pub use queue::{SubscriberId, SubscriberQueue, TrySendError};
pub use registry::Registry;
pub use subscription::{Subscription, DRAIN_GRACE};
