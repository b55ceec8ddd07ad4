//! Run orchestration.
//!
//! [`SyncService::run`] drives one sync end to end: record the run, crawl
//! every configured publication, filter and deduplicate the results, then
//! queue the survivors for processing. Every run leaves exactly one
//! `sync_runs` row that moves from started to one terminal status, with
//! whatever partial counters were known at the time of a failure.

use crate::config::Config;
use crate::crawl::{crawl_all, CrawlOptions};
use crate::dates::{filter_items, DateWindow, DatedItem};
use crate::queue::{dispatch_all, HeadlineQueue, QueueMessage};
use crate::search::{time_filter_for, GeoParams, SearchClient, SearchItem};
use crate::storage::{Database, RunStatus, RunSummary, StoreError, TriggerType};
use crate::util::extract_host;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

/// What one run should cover. Absent fields fall back to configuration.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub trigger: TriggerType,
    /// Date window the run targets; `None` crawls without a time filter.
    pub window: Option<DateWindow>,
    /// Per-publication page budget override.
    pub max_pages: Option<u32>,
    /// Provider country code override (`gl`).
    pub region: Option<String>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    pub run_id: i64,
    pub summary: RunSummary,
}

pub struct SyncService {
    db: Database,
    search: SearchClient,
    queue: Arc<dyn HeadlineQueue>,
    config: Config,
}

impl SyncService {
    pub fn new(
        db: Database,
        search: SearchClient,
        queue: Arc<dyn HeadlineQueue>,
        config: Config,
    ) -> Self {
        Self {
            db,
            search,
            queue,
            config,
        }
    }

    /// Run one sync to completion.
    ///
    /// The run row is created before any network activity. On failure the
    /// row is marked failed with the partial counters, best effort; the
    /// original error always reaches the caller.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let now = Utc::now();
        let max_pages = request.max_pages.unwrap_or(self.config.crawl.max_pages);
        let window_bounds = request
            .window
            .as_ref()
            .map(|w| (w.start.timestamp(), w.end.timestamp()));

        let run_id = self
            .db
            .insert_sync_run(request.trigger, window_bounds, max_pages)
            .await?;
        info!(
            run_id,
            trigger = request.trigger.as_str(),
            max_pages,
            "Sync run started"
        );

        let mut summary = RunSummary::default();
        match self.execute(run_id, request, max_pages, now, &mut summary).await {
            Ok(()) => Ok(SyncReport { run_id, summary }),
            Err(e) => {
                error!(run_id, error = %e, "Sync run failed");
                if let Err(update_err) = self
                    .db
                    .finish_sync_run(run_id, RunStatus::Failed, &summary, Some(&e.to_string()))
                    .await
                {
                    // Bookkeeping only; the run error is what matters.
                    error!(run_id, error = %update_err, "Could not record sync run failure");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: i64,
        request: &SyncRequest,
        max_pages: u32,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<(), SyncError> {
        let publications = self.db.find_publications().await?;
        if publications.is_empty() {
            self.db
                .finish_sync_run(run_id, RunStatus::Completed, summary, None)
                .await?;
            info!(run_id, "No publications configured, nothing to sync");
            return Ok(());
        }

        let mut by_host: HashMap<String, i64> = HashMap::new();
        for publication in &publications {
            if let Some(host) = extract_host(&publication.url) {
                by_host.insert(host, publication.id);
            }
        }

        let geo = GeoParams {
            gl: request
                .region
                .clone()
                .or_else(|| self.config.search.gl.clone()),
            location: self.config.search.location.clone(),
        };
        let time_filter = request.window.as_ref().map(|w| time_filter_for(w, now));
        let options = CrawlOptions {
            time_filter: time_filter.as_deref(),
            geo: &geo,
            max_pages,
            max_results: self.config.crawl.max_results_per_publication,
        };

        let urls: Vec<String> = publications.iter().map(|p| p.url.clone()).collect();
        let outcomes = crawl_all(&self.search, urls, &options, self.config.crawl.parallelism).await;

        let mut credits = 0u32;
        let mut items: Vec<SearchItem> = Vec::new();
        for outcome in outcomes {
            if outcome.error.is_none() {
                summary.publications_fetched += 1;
            }
            credits += outcome.credits_used;
            items.extend(outcome.items);
        }
        summary.total_headlines_fetched = items.len() as u32;
        info!(
            run_id,
            publications = publications.len(),
            fetched = summary.publications_fetched,
            headlines = summary.total_headlines_fetched,
            credits,
            "Crawl finished"
        );

        let buffer = Duration::try_hours(self.config.filter.window_buffer_hours.max(0))
            .unwrap_or_else(Duration::zero);
        let buffered = request.window.as_ref().map(|w| w.with_buffer(buffer));
        let dated = filter_items(items, buffered.as_ref(), now);
        summary.headlines_within_range = dated.len() as u32;

        let messages = self.build_messages(dated, &mut by_host).await?;
        let dispatched = dispatch_all(self.queue.as_ref(), messages, &self.config.dispatch).await;
        summary.messages_queued = dispatched.sent as u32;

        self.db
            .finish_sync_run(run_id, RunStatus::Completed, summary, None)
            .await?;
        info!(
            run_id,
            within_range = summary.headlines_within_range,
            queued = summary.messages_queued,
            "Sync run completed"
        );
        Ok(())
    }

    /// Turn filtered items into queue messages, resolving each item's
    /// hostname to a publication id. Hostnames with no publication row get
    /// one created before any of their items are queued.
    async fn build_messages(
        &self,
        dated: Vec<DatedItem>,
        by_host: &mut HashMap<String, i64>,
    ) -> Result<Vec<QueueMessage>, SyncError> {
        let mut messages = Vec::with_capacity(dated.len());
        for DatedItem { item, published } in dated {
            let Some(host) = extract_host(&item.link) else {
                warn!(link = %item.link, "Dropping item with unusable link");
                continue;
            };
            let publication_id = match by_host.get(&host) {
                Some(id) => *id,
                None => {
                    let name = if item.source.is_empty() {
                        host.clone()
                    } else {
                        item.source.clone()
                    };
                    let url = format!("https://{host}");
                    let id = self.db.insert_publication(&name, &url).await?;
                    info!(publication = %name, %url, "Created publication for unseen hostname");
                    by_host.insert(host, id);
                    id
                }
            };

            messages.push(QueueMessage {
                headline_url: item.link,
                publication_id: Some(publication_id),
                headline: item.title,
                snippet: non_empty(item.snippet),
                source: non_empty(item.source),
                raw_date: non_empty(item.date),
                normalized_date: Some(published.timestamp()),
            });
        }
        Ok(messages)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::queue::MemoryQueue;
    use crate::retry::RetryPolicy;

    fn test_service(db: Database) -> (SyncService, Arc<MemoryQueue>) {
        let config = Config::default();
        let search_config = SearchConfig {
            api_key: Some("test-key".to_string()),
            ..SearchConfig::default()
        };
        let search = SearchClient::new(&search_config, RetryPolicy::immediate(1)).unwrap();
        let queue = Arc::new(MemoryQueue::new(&config.queue));
        let service = SyncService::new(db, search, queue.clone(), config);
        (service, queue)
    }

    fn manual_request() -> SyncRequest {
        SyncRequest {
            trigger: TriggerType::Manual,
            window: None,
            max_pages: None,
            region: None,
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_completes_with_zero_summary() {
        let db = Database::open(":memory:").await.unwrap();
        let (service, queue) = test_service(db.clone());

        // Two runs against an empty catalog: both complete, no messages.
        let first = service.run(&manual_request()).await.unwrap();
        let second = service.run(&manual_request()).await.unwrap();
        assert_ne!(first.run_id, second.run_id);

        for report in [first, second] {
            assert_eq!(report.summary, RunSummary::default());
            let run = db.get_sync_run(report.run_id).await.unwrap().unwrap();
            assert_eq!(run.status, RunStatus::Completed);
            assert!(run.finished_at.is_some());
            assert!(run.error_message.is_none());
        }
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_marks_run_failed() {
        let db = Database::open(":memory:").await.unwrap();
        let (service, _queue) = test_service(db.clone());

        // Break the catalog table so the run fails after it starts.
        sqlx::query("DROP TABLE publications")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = service.run(&manual_request()).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));

        let run = db.get_sync_run(1).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.is_some());
        assert_eq!(run.summary.publications_fetched, 0);
    }

    #[test]
    fn test_non_empty_helper() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("  ".to_string()), None);
        assert_eq!(non_empty("x".to_string()), Some("x".to_string()));
    }
}
