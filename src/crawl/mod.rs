//! Per-publication pagination and the bounded fan-out across publications.
//!
//! The page loop is sequential by construction: each stop decision depends
//! on the previous page's result. Publications, in contrast, are crawled
//! concurrently and independently; one publication's failure never cancels
//! its siblings.

mod crawler;
mod fanout;

pub use crawler::{crawl_publication, CrawlError, CrawlOptions, CrawlOutcome};
pub use fanout::crawl_all;
