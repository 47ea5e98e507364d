//! Bounded notification queue between a session and its consumer.
//!
//! Pushing never blocks the producer. When the queue is full the oldest
//! pending notification is dropped (or the new one, if `discard_oldest` is
//! off), so a slow consumer costs completeness, not memory.

use crate::value::DataValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

struct Shared {
    items: Mutex<VecDeque<DataValue>>,
    capacity: usize,
    discard_oldest: bool,
    closed: AtomicBool,
    discarded: AtomicU64,
    notify: Notify,
}

impl Shared {
    fn items(&self) -> MutexGuard<'_, VecDeque<DataValue>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a queue holding at most `capacity` pending notifications.
#[must_use]
pub fn notification_queue(
    capacity: usize,
    discard_oldest: bool,
) -> (NotificationSender, NotificationReceiver) {
    let shared = Arc::new(Shared {
        items: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity: capacity.max(1),
        discard_oldest,
        closed: AtomicBool::new(false),
        discarded: AtomicU64::new(0),
        notify: Notify::new(),
    });

    (
        NotificationSender {
            shared: Arc::clone(&shared),
        },
        NotificationReceiver { shared },
    )
}

/// Producer side, held by the session.
pub struct NotificationSender {
    shared: Arc<Shared>,
}

impl NotificationSender {
    /// Enqueue a notification.
    ///
    /// Returns `false` if the queue is closed.
    pub fn push(&self, value: DataValue) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut items = self.shared.items();
            if items.len() >= self.shared.capacity {
                self.shared.discarded.fetch_add(1, Ordering::Relaxed);
                if !self.shared.discard_oldest {
                    return true;
                }
                items.pop_front();
            }
            items.push_back(value);
        }

        self.shared.notify.notify_one();
        true
    }

    /// Close the queue; the receiver drains what is left, then ends.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Whether the queue was closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Drop for NotificationSender {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consumer side, owned by the subscription binding.
pub struct NotificationReceiver {
    shared: Arc<Shared>,
}

impl NotificationReceiver {
    /// Next notification in arrival order, `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<DataValue> {
        loop {
            if let Some(value) = self.shared.items().pop_front() {
                return Some(value);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Notifications dropped because the queue was full.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }
}

impl Drop for NotificationReceiver {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DataKind, Variant};

    fn sample(n: i64) -> DataValue {
        DataValue::new(Variant::scalar(DataKind::Int64, n))
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, mut rx) = notification_queue(10, true);
        for n in 0..3 {
            assert!(tx.push(sample(n)));
        }

        for n in 0..3 {
            assert_eq!(rx.recv().await, Some(sample(n)));
        }
    }

    #[tokio::test]
    async fn full_queue_discards_oldest() {
        let (tx, mut rx) = notification_queue(2, true);
        for n in 0..5 {
            tx.push(sample(n));
        }
        drop(tx);

        assert_eq!(rx.recv().await, Some(sample(3)));
        assert_eq!(rx.recv().await, Some(sample(4)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.discarded(), 3);
    }

    #[tokio::test]
    async fn full_queue_discards_newest_when_configured() {
        let (tx, mut rx) = notification_queue(2, false);
        for n in 0..4 {
            tx.push(sample(n));
        }
        tx.close();

        assert_eq!(rx.recv().await, Some(sample(0)));
        assert_eq!(rx.recv().await, Some(sample(1)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn receiver_wakes_on_push() {
        let (tx, mut rx) = notification_queue(4, true);
        let consumer = tokio::spawn(async move { rx.recv().await });

        tokio::task::yield_now().await;
        tx.push(sample(11));

        assert_eq!(consumer.await.unwrap(), Some(sample(11)));
    }

    #[test]
    fn dropped_receiver_closes_queue() {
        let (tx, rx) = notification_queue(1, true);
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.push(sample(1)));
    }
}
