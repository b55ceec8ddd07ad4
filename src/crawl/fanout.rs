use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use super::crawler::{crawl_publication, CrawlOptions, CrawlOutcome};
use crate::search::SearchClient;

/// Crawl every publication URL under a bounded worker pool.
///
/// Results come back in completion order, not input order, each carrying
/// its own success or error state. All crawls run to completion; there is
/// no early abort when one publication fails.
pub async fn crawl_all(
    client: &SearchClient,
    urls: Vec<String>,
    opts: &CrawlOptions<'_>,
    parallelism: usize,
) -> Vec<CrawlOutcome> {
    if urls.is_empty() {
        return Vec::new();
    }

    let total = urls.len();
    let completed = AtomicUsize::new(0);

    stream::iter(urls)
        .map(|url| {
            let completed = &completed;
            async move {
                let outcome = crawl_publication(client, &url, opts).await;
                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                info!(
                    done,
                    total,
                    url = %outcome.url,
                    queries = outcome.queries_made,
                    items = outcome.items.len(),
                    failed = outcome.error.is_some(),
                    "Publication crawl finished"
                );
                outcome
            }
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await
}

// ============================================================================
// Tests
// ============================================================================
