use thiserror::Error;
use tracing::{debug, warn};

use crate::search::{FetchError, GeoParams, PageRequest, SearchClient, SearchItem};
use crate::util::{site_host, UrlError};

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The publication URL could not be turned into a site query.
    /// Detected before any network call is made.
    #[error("Invalid publication URL: {0}")]
    BadUrl(#[from] UrlError),
    /// A page fetch failed terminally (permanent error or retries exhausted).
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Shared crawl parameters for one run.
#[derive(Debug, Clone)]
pub struct CrawlOptions<'a> {
    /// Provider time-filter token applied to every query, if any.
    pub time_filter: Option<&'a str>,
    pub geo: &'a GeoParams,
    /// Pages to request per publication. Values below 1 behave as 1.
    pub max_pages: u32,
    /// Hard cap on items aggregated per publication, independent of
    /// `max_pages`. Pagination stops once the aggregate reaches it.
    pub max_results: usize,
}

/// Aggregate result of crawling one publication.
///
/// `error` is present only when a fetch ultimately failed; a crawl stopped
/// by the pagination heuristics is a success. Items collected before a
/// failure are retained.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub url: String,
    /// Successful page queries issued. Failed fetches are not counted.
    pub queries_made: u32,
    /// Provider credits consumed, summed over successful pages only.
    pub credits_used: u32,
    pub items: Vec<SearchItem>,
    pub error: Option<CrawlError>,
}

impl CrawlOutcome {
    fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            queries_made: 0,
            credits_used: 0,
            items: Vec::new(),
            error: None,
        }
    }
}

/// Crawl one publication: page through its site-restricted news results
/// until a stop condition fires or `max_pages` is exhausted.
///
/// Stop conditions are checked in order after each successful page:
/// aggregate reached `max_results`, page returned zero items, page
/// returned fewer items than the full page size.
pub async fn crawl_publication(
    client: &SearchClient,
    publication_url: &str,
    opts: &CrawlOptions<'_>,
) -> CrawlOutcome {
    let mut outcome = CrawlOutcome::empty(publication_url);

    let site = match site_host(publication_url) {
        Ok(site) => site,
        Err(e) => {
            warn!(url = %publication_url, error = %e, "Skipping publication with malformed URL");
            outcome.error = Some(CrawlError::BadUrl(e));
            return outcome;
        }
    };

    let page_size = client.page_size() as usize;
    let max_pages = opts.max_pages.max(1);

    for page in 1..=max_pages {
        let request = PageRequest {
            site: &site,
            time_filter: opts.time_filter,
            geo: opts.geo,
            page,
        };

        let result = match client.fetch_page(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    site = %site,
                    page,
                    queries_made = outcome.queries_made,
                    error = %e,
                    "Page fetch failed terminally, returning partial crawl"
                );
                outcome.error = Some(CrawlError::Fetch(e));
                return outcome;
            }
        };

        outcome.queries_made += 1;
        outcome.credits_used += result.credits;
        let returned = result.items.len();
        outcome.items.extend(result.items);

        if outcome.items.len() >= opts.max_results {
            // The cap is a hard bound on the aggregate, so the page that
            // crossed it gets trimmed back.
            outcome.items.truncate(opts.max_results);
            debug!(site = %site, page, collected = outcome.items.len(), "Safety cap reached, stopping pagination");
            break;
        }
        if returned == 0 {
            debug!(site = %site, page, "Empty page, stopping pagination");
            break;
        }
        if returned < page_size {
            debug!(site = %site, page, returned, page_size, "Short page, stopping pagination");
            break;
        }
    }

    outcome
}

// ============================================================================
// Tests
// ============================================================================
