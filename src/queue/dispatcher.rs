// Publishes filtered headlines onto the queue with bounded concurrency.
// Sends are paced: after every `stagger_batch` successful publishes, the
// visibility delay grows by one `stagger_step`, spreading consumer load
// for large result sets.

use crate::config::DispatchConfig;
use crate::queue::{HeadlineQueue, QueueMessage};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub errors: usize,
}

/// Publish every message, counting successes and failures. A failed
/// publish never aborts the batch; the remaining messages still go out.
pub async fn dispatch_all(
    queue: &dyn HeadlineQueue,
    messages: Vec<QueueMessage>,
    config: &DispatchConfig,
) -> DispatchSummary {
    let total = messages.len();
    let sent = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);
    let batch = config.stagger_batch.max(1);
    let step = config.stagger_step();

    stream::iter(messages)
        .map(|message| {
            let sent = &sent;
            let errors = &errors;
            async move {
                // Delay derives from successful sends so far; failures do
                // not advance the schedule.
                let delay = step * ((sent.load(Ordering::SeqCst) / batch) as u32);
                match queue.publish(message, delay).await {
                    Ok(()) => {
                        sent.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to queue headline");
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect::<Vec<()>>()
        .await;

    let summary = DispatchSummary {
        sent: sent.load(Ordering::SeqCst),
        errors: errors.load(Ordering::SeqCst),
    };
    info!(
        total,
        sent = summary.sent,
        errors = summary.errors,
        "Queued headlines for processing"
    );
    summary
}
