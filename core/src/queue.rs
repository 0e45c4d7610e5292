use parking_lot::Mutex;
use std::fmt;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

/// Random identity attached to a queue for log correlation. Registry
/// membership is decided by pointer identity, never by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Why a handoff was abandoned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError {
    #[error("subscriber not ready to receive")]
    NotReady,
    #[error("subscriber queue closed")]
    Closed,
}

#[derive(Default)]
struct Slot {
    waiting: bool,
    message: Option<String>,
    closed: bool,
}

/// Zero-capacity handoff between publishers and the single task that owns a
/// subscription.
///
/// [`try_send`](Self::try_send) only succeeds while the consumer is parked
/// inside [`recv`](Self::recv); otherwise the message is handed back as an
/// error immediately. Nothing is ever buffered on behalf of a consumer that
/// is busy, so a stalled connection cannot build a backlog.
pub struct SubscriberQueue {
    id: SubscriberId,
    slot: Mutex<Slot>,
    notify: Notify,
}

impl SubscriberQueue {
    pub fn new() -> Self {
        Self {
            id: SubscriberId::new(),
            slot: Mutex::new(Slot::default()),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Hand `message` to the consumer if it is waiting right now.
    pub fn try_send(&self, message: String) -> Result<(), TrySendError> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(TrySendError::Closed);
        }
        if !slot.waiting || slot.message.is_some() {
            return Err(TrySendError::NotReady);
        }
        slot.message = Some(message);
        slot.waiting = false;
        drop(slot);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next message. Returns `None` once the queue is closed.
    ///
    /// Only one task may call this at a time. Cancelling the returned future
    /// withdraws readiness, so publishers stop handing off to it.
    pub async fn recv(&self) -> Option<String> {
        loop {
            {
                let mut slot = self.slot.lock();
                if let Some(message) = slot.message.take() {
                    return Some(message);
                }
                if slot.closed {
                    return None;
                }
                slot.waiting = true;
            }
            let _ready = Ready(self);
            // notify_one stores a permit when nobody is parked yet, so a
            // handoff landing between the unlock above and this await is
            // not lost. Stale permits only cause another trip round the loop.
            self.notify.notified().await;
        }
    }

    /// Stop accepting handoffs and wake the consumer with `None`.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        slot.waiting = false;
        drop(slot);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// Whether a consumer is parked in `recv` at this instant.
    pub fn is_ready(&self) -> bool {
        let slot = self.slot.lock();
        slot.waiting && slot.message.is_none()
    }
}

impl Default for SubscriberQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberQueue")
            .field("id", &self.id)
            .finish()
    }
}

/// Clears the waiting flag when a `recv` future finishes or is dropped.
struct Ready<'a>(&'a SubscriberQueue);

impl Drop for Ready<'_> {
    fn drop(&mut self) {
        self.0.slot.lock().waiting = false;
    }
}
