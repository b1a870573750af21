//! Generic one-slot reply hand-off between the inbound dispatcher and
//! whichever in-flight operation (an outbound send, a heartbeat probe) is
//! waiting on a correlated response.
//!
//! Delivery is a bounded try-send with a timeout rather than an unbounded
//! blocking write, so a waiter that gave up (timed out, cancelled, or was
//! torn down by a reconnect) can never stall the dispatcher.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Holds at most one outstanding reply channel of type `T`.
pub(crate) struct ReplySlot<T> {
    slot: Mutex<Option<mpsc::Sender<T>>>,
}

impl<T: Send + 'static> ReplySlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Installs a fresh one-capacity channel for a new in-flight wait,
    /// returning the receiving half.
    pub async fn begin(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(1);
        *self.slot.lock().await = Some(tx);
        rx
    }

    /// Clears the slot, dropping whatever sender is installed. A waiter
    /// still polling the matching receiver observes the channel closed.
    pub async fn reset(&self) {
        self.slot.lock().await.take();
    }

    /// Hands `value` to whichever wait is currently in flight, if any,
    /// giving up after `timeout` — a reply nobody is waiting for anymore is
    /// simply dropped rather than blocking the caller.
    pub async fn deliver(&self, value: T, timeout: Duration) {
        let sender = self.slot.lock().await.clone();
        let Some(sender) = sender else {
            debug!("reply delivered with nothing waiting, dropping");
            return;
        };
        if tokio::time::timeout(timeout, sender.send(value)).await.is_err() {
            debug!("reply delivery timed out, dropping");
        }
    }
}

impl<T: Send + 'static> Default for ReplySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_with_no_waiter_is_a_no_op() {
        let slot: ReplySlot<u8> = ReplySlot::new();
        slot.deliver(5, Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn begin_then_deliver_reaches_the_waiter() {
        let slot: ReplySlot<u8> = ReplySlot::new();
        let mut rx = slot.begin().await;
        slot.deliver(42, Duration::from_millis(50)).await;
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn reset_closes_the_channel_for_the_waiter() {
        let slot: ReplySlot<u8> = ReplySlot::new();
        let mut rx = slot.begin().await;
        slot.reset().await;
        assert_eq!(rx.recv().await, None);
    }
}
