//! News search provider client.
//!
//! One POST per result page against a serper-style `/news` endpoint. The
//! client owns retry and timeout behavior for a single page; pagination
//! policy lives in [`crate::crawl`].

mod client;
mod types;

pub use client::{FetchError, SearchClient};
pub use types::{time_filter_for, GeoParams, PageRequest, SearchItem, SearchPage};
