//! Headline ingestion pipeline: crawl news search results per publication,
//! filter them into a date window, queue the survivors, and store each one
//! exactly once behind a URL uniqueness constraint.

pub mod classify;
pub mod config;
pub mod crawl;
pub mod dates;
pub mod process;
pub mod queue;
pub mod retry;
pub mod search;
pub mod storage;
pub mod sync;
pub mod util;
