// Drains the queue into the processor. Terminal outcomes acknowledge;
// failures hand the delivery back so the queue can retry or drop it.

use crate::process::{Outcome, Processor};
use crate::queue::HeadlineQueue;
use tracing::{info, warn};

/// Counts of how consumed deliveries resolved. `failures` counts
/// deliveries returned for redelivery, so one message can contribute
/// several times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub inserted: usize,
    pub already_stored: usize,
    pub concurrent_inserts: usize,
    pub invalid_references: usize,
    pub failures: usize,
}

/// Consume deliveries until the queue reports drained.
pub async fn run_consumer(queue: &dyn HeadlineQueue, processor: &Processor) -> ConsumerStats {
    let mut stats = ConsumerStats::default();

    while let Some(delivery) = queue.next_delivery().await {
        match processor.process(&delivery.message).await {
            Ok(outcome) => {
                match outcome {
                    Outcome::Inserted { .. } => stats.inserted += 1,
                    Outcome::AlreadyStored => stats.already_stored += 1,
                    Outcome::ConcurrentInsert => stats.concurrent_inserts += 1,
                    Outcome::InvalidPublication => stats.invalid_references += 1,
                }
                queue.acknowledge(delivery).await;
            }
            Err(e) => {
                warn!(
                    url = %delivery.message.headline_url,
                    attempt = delivery.attempt,
                    error = %e,
                    "Headline processing failed, returning message to queue"
                );
                stats.failures += 1;
                queue.redeliver(delivery).await;
            }
        }
    }

    info!(
        inserted = stats.inserted,
        already_stored = stats.already_stored,
        concurrent_inserts = stats.concurrent_inserts,
        invalid_references = stats.invalid_references,
        failures = stats.failures,
        "Queue drained"
    );
    stats
}

// ============================================================================
// Tests
// ============================================================================
