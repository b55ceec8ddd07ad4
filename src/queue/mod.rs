//! Delivery queue between crawl and persistence.
//!
//! Headlines that survive filtering are queued as [`QueueMessage`]s and
//! consumed independently, so a slow or failing store never stalls the
//! crawl. Delivery is at-least-once: a consumer that fails returns the
//! delivery for another attempt, and duplicate deliveries are resolved
//! downstream by the storage layer's URL uniqueness.

mod dispatcher;
mod memory;

pub use dispatcher::{dispatch_all, DispatchSummary};
pub use memory::MemoryQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One headline payload traveling through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub headline_url: String,
    pub publication_id: Option<i64>,
    pub headline: String,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub raw_date: Option<String>,
    pub normalized_date: Option<i64>,
}

/// A message handed to a consumer. `attempt` starts at 1 and counts
/// deliveries of the same message, not publishes.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueueMessage,
    pub attempt: u32,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
}

/// At-least-once delivery queue.
///
/// `next_delivery` blocks until a message is available and returns `None`
/// only once the queue is closed and every outstanding message has been
/// acknowledged or dropped.
#[async_trait]
pub trait HeadlineQueue: Send + Sync {
    /// Enqueue a message, visible to consumers after `delay`.
    async fn publish(&self, message: QueueMessage, delay: Duration) -> Result<(), QueueError>;

    /// Next available delivery, or `None` when closed and drained.
    async fn next_delivery(&self) -> Option<Delivery>;

    /// Mark a delivery as handled; the message leaves the queue for good.
    async fn acknowledge(&self, delivery: Delivery);

    /// Return a failed delivery for a later attempt. A message that has
    /// exhausted its delivery attempts is dropped with a warning.
    async fn redeliver(&self, delivery: Delivery);
}

#[cfg(test)]
pub(crate) fn test_message(url: &str) -> QueueMessage {
    QueueMessage {
        headline_url: url.to_string(),
        publication_id: Some(1),
        headline: format!("Headline for {url}"),
        snippet: None,
        source: None,
        raw_date: None,
        normalized_date: None,
    }
}
