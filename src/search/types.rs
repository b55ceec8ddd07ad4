use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::dates::DateWindow;

/// One headline entry as returned by the provider. Only `title` and `link`
/// are reliably present; the rest default to empty strings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub source: String,
}

/// One page of provider results.
///
/// `credits` is the provider's own count of credits consumed by this
/// request. `search_parameters` echoes the query back and is kept opaque;
/// it is logged for diagnosis but never interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default, rename = "news")]
    pub items: Vec<SearchItem>,
    #[serde(default)]
    pub credits: u32,
    #[serde(default, rename = "searchParameters")]
    pub search_parameters: serde_json::Value,
}

/// Country/locality hints passed through to the provider verbatim.
#[derive(Debug, Clone, Default)]
pub struct GeoParams {
    pub gl: Option<String>,
    pub location: Option<String>,
}

/// Parameters for one page fetch. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    /// Host the results are restricted to (no scheme, no path).
    pub site: &'a str,
    /// Provider time-filter token, e.g. `qdr:w`. See [`time_filter_for`].
    pub time_filter: Option<&'a str>,
    pub geo: &'a GeoParams,
    pub page: u32,
}

/// Encode a date window as the provider's `tbs` time-filter token.
///
/// Windows ending at (or near) `now` map onto the relative tokens
/// `qdr:d` / `qdr:w` / `qdr:m` / `qdr:y`; anything else becomes a custom
/// range token with explicit month/day/year bounds.
pub fn time_filter_for(window: &DateWindow, now: DateTime<Utc>) -> String {
    let ends_at_now = (now - window.end).abs() <= Duration::try_hours(1).unwrap_or(Duration::zero());
    if ends_at_now {
        let span_hours = (window.end - window.start).num_hours();
        if span_hours <= 24 {
            return "qdr:d".to_string();
        }
        if span_hours <= 24 * 7 {
            return "qdr:w".to_string();
        }
        if span_hours <= 24 * 31 {
            return "qdr:m".to_string();
        }
        if span_hours <= 24 * 366 {
            return "qdr:y".to_string();
        }
    }
    format!(
        "cdr:1,cd_min:{},cd_max:{}",
        window.start.format("%-m/%-d/%Y"),
        window.end.format("%-m/%-d/%Y")
    )
}
