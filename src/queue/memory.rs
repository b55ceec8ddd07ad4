// In-process queue backing the default single-binary deployment. The
// trait boundary keeps an external broker swappable in later.

use crate::config::QueueConfig;
use crate::queue::{Delivery, HeadlineQueue, QueueError, QueueMessage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

pub struct MemoryQueue {
    inner: Arc<QueueInner>,
    max_attempts: u32,
    redelivery_delay: Duration,
}

struct QueueInner {
    ready: Mutex<VecDeque<Delivery>>,
    notify: Notify,
    // Published messages not yet acknowledged or dropped, including those
    // still sleeping out a delay.
    outstanding: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                ready: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                outstanding: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
            max_attempts: config.max_delivery_attempts.max(1),
            redelivery_delay: config.redelivery_delay(),
        }
    }

    /// Stop accepting publishes. Consumers drain what remains and then
    /// observe `None` from `next_delivery`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Messages published but not yet acknowledged or dropped.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    fn settle(inner: &QueueInner) {
        // Last message gone; wake consumers blocked on an empty queue so
        // they can observe the drained state.
        if inner.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.notify.notify_waiters();
        }
    }
}

impl QueueInner {
    async fn push(&self, delivery: Delivery) {
        self.ready.lock().await.push_back(delivery);
        self.notify.notify_one();
    }
}

#[async_trait]
impl HeadlineQueue for MemoryQueue {
    async fn publish(&self, message: QueueMessage, delay: Duration) -> Result<(), QueueError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        let delivery = Delivery {
            message,
            attempt: 1,
        };
        if delay.is_zero() {
            self.inner.push(delivery).await;
        } else {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.push(delivery).await;
            });
        }
        Ok(())
    }

    async fn next_delivery(&self) -> Option<Delivery> {
        loop {
            // Arm the waiter before checking state so a push or close
            // racing with the check cannot be missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.inner.ready.lock().await.pop_front() {
                return Some(delivery);
            }
            if self.inner.closed.load(Ordering::SeqCst)
                && self.inner.outstanding.load(Ordering::SeqCst) == 0
            {
                return None;
            }
            notified.await;
        }
    }

    async fn acknowledge(&self, _delivery: Delivery) {
        Self::settle(&self.inner);
    }

    async fn redeliver(&self, delivery: Delivery) {
        if delivery.attempt >= self.max_attempts {
            warn!(
                url = %delivery.message.headline_url,
                attempts = delivery.attempt,
                "Dropping headline after exhausting delivery attempts"
            );
            Self::settle(&self.inner);
            return;
        }

        // Redelivery ignores `closed`: the message is already counted as
        // outstanding and must complete its attempts during drain.
        let next = Delivery {
            message: delivery.message,
            attempt: delivery.attempt + 1,
        };
        let delay = self.redelivery_delay;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.push(next).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::test_message;

    fn test_queue(max_attempts: u32) -> MemoryQueue {
        MemoryQueue::new(&QueueConfig {
            max_delivery_attempts: max_attempts,
            redelivery_delay_secs: 1,
        })
    }

    #[tokio::test]
    async fn test_publish_then_consume() {
        let queue = test_queue(3);
        queue
            .publish(test_message("https://example.com/a"), Duration::ZERO)
            .await
            .unwrap();

        let delivery = queue.next_delivery().await.unwrap();
        assert_eq!(delivery.message.headline_url, "https://example.com/a");
        assert_eq!(delivery.attempt, 1);

        queue.acknowledge(delivery).await;
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_publish_after_close_rejected() {
        let queue = test_queue(3);
        queue.close();
        let err = queue
            .publish(test_message("https://example.com/a"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = test_queue(3);
        queue
            .publish(test_message("https://example.com/a"), Duration::ZERO)
            .await
            .unwrap();
        queue
            .publish(test_message("https://example.com/b"), Duration::ZERO)
            .await
            .unwrap();
        queue.close();

        // Both messages survive the close.
        let first = queue.next_delivery().await.unwrap();
        queue.acknowledge(first).await;
        let second = queue.next_delivery().await.unwrap();
        queue.acknowledge(second).await;

        assert!(queue.next_delivery().await.is_none());
    }

    #[tokio::test]
    async fn test_next_delivery_none_on_closed_empty_queue() {
        let queue = test_queue(3);
        queue.close();
        assert!(queue.next_delivery().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_publish_orders_behind_immediate() {
        let queue = test_queue(3);
        queue
            .publish(test_message("https://example.com/slow"), Duration::from_secs(2))
            .await
            .unwrap();
        queue
            .publish(test_message("https://example.com/fast"), Duration::ZERO)
            .await
            .unwrap();

        let first = queue.next_delivery().await.unwrap();
        assert_eq!(first.message.headline_url, "https://example.com/fast");
        let second = queue.next_delivery().await.unwrap();
        assert_eq!(second.message.headline_url, "https://example.com/slow");
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_increments_attempt() {
        let queue = test_queue(3);
        queue
            .publish(test_message("https://example.com/a"), Duration::ZERO)
            .await
            .unwrap();

        let first = queue.next_delivery().await.unwrap();
        assert_eq!(first.attempt, 1);
        queue.redeliver(first).await;

        let second = queue.next_delivery().await.unwrap();
        assert_eq!(second.attempt, 2);
        assert_eq!(second.message.headline_url, "https://example.com/a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_message_is_dropped() {
        let queue = test_queue(2);
        queue
            .publish(test_message("https://example.com/a"), Duration::ZERO)
            .await
            .unwrap();

        let first = queue.next_delivery().await.unwrap();
        queue.redeliver(first).await;
        let second = queue.next_delivery().await.unwrap();
        assert_eq!(second.attempt, 2);
        queue.redeliver(second).await;

        assert_eq!(queue.outstanding(), 0);
        queue.close();
        assert!(queue.next_delivery().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_delayed_message() {
        let queue = test_queue(3);
        queue
            .publish(test_message("https://example.com/late"), Duration::from_secs(5))
            .await
            .unwrap();
        queue.close();

        // The delayed message was accepted before close and still arrives.
        let delivery = queue.next_delivery().await.unwrap();
        assert_eq!(delivery.message.headline_url, "https://example.com/late");
        queue.acknowledge(delivery).await;
        assert!(queue.next_delivery().await.is_none());
    }
}
