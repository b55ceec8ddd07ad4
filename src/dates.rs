//! Provider date normalization and date-window filtering.
//!
//! News search providers return publish dates as loose strings: relative
//! phrases ("2 hours ago"), absolute dates ("Mar 15, 2024"), or literal
//! tokens ("yesterday"). Parsing is layered: relative phrases first, then
//! absolute formats, then the literal tokens. Anything else is treated as
//! having no usable date.
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::debug;

use crate::search::SearchItem;

/// Absolute date formats tried in order. Providers are inconsistent, so the
/// list covers the handful of shapes seen in practice.
const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y-%m-%d",
    "%d %b %Y",
    "%d %B %Y",
    "%m/%d/%Y",
];

// ============================================================================
// Parsing
// ============================================================================

/// Parse a provider date string relative to `now`.
///
/// Returns `None` when the string matches none of the supported layers.
/// Results can only be in the past or at `now`; phrases that would produce
/// a future timestamp (negative quantities) are rejected.
pub fn parse_provider_date(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    parse_relative(trimmed, now)
        .or_else(|| parse_absolute(trimmed))
        .or_else(|| parse_literal(trimmed, now))
}

/// Relative phrases: `<qty> <unit> ago`, with "a"/"an" accepted as quantity 1.
fn parse_relative(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = raw.to_ascii_lowercase();
    let mut parts = lower.split_whitespace();
    let qty_str = parts.next()?;
    let unit = parts.next()?;
    let tail = parts.next()?;
    if tail != "ago" || parts.next().is_some() {
        return None;
    }

    let qty: i64 = match qty_str {
        "a" | "an" => 1,
        other => other.parse().ok()?,
    };
    if qty < 0 {
        return None;
    }

    let delta = match unit {
        "second" | "seconds" | "sec" | "secs" => Duration::try_seconds(qty)?,
        "minute" | "minutes" | "min" | "mins" => Duration::try_minutes(qty)?,
        "hour" | "hours" => Duration::try_hours(qty)?,
        "day" | "days" => Duration::try_days(qty)?,
        "week" | "weeks" => Duration::try_weeks(qty)?,
        "month" | "months" => Duration::try_days(qty.checked_mul(30)?)?,
        "year" | "years" => Duration::try_days(qty.checked_mul(365)?)?,
        _ => return None,
    };

    now.checked_sub_signed(delta)
}

/// Absolute dates: RFC 3339 / RFC 2822 timestamps, then the date-only
/// formats in [`DATE_FORMATS`]. Date-only values resolve to midnight UTC.
fn parse_absolute(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&midnight));
        }
    }
    None
}

/// Literal tokens providers emit instead of a timestamp.
fn parse_literal(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match raw.to_ascii_lowercase().as_str() {
        "now" | "just now" | "today" => Some(now),
        "yesterday" => now.checked_sub_signed(Duration::try_days(1)?),
        _ => None,
    }
}

// ============================================================================
// Date Window
// ============================================================================

/// Inclusive UTC time window. `start <= end` always holds; inverted inputs
/// are swapped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Window covering the last `days` days ending at `now`.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        let span = Duration::try_days(days.max(0)).unwrap_or(Duration::zero());
        Self::new(now - span, now)
    }

    /// Widen the window by `buffer` on both sides. Provider dates are
    /// imprecise (relative phrases lose up to an hour, absolute dates lose
    /// the time of day), so filtering uses a slack margin around the
    /// requested range.
    pub fn with_buffer(&self, buffer: Duration) -> Self {
        Self {
            start: self.start - buffer,
            end: self.end + buffer,
        }
    }

    /// Inclusive containment check.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// A search item with its parsed publish time.
#[derive(Debug, Clone)]
pub struct DatedItem {
    pub item: SearchItem,
    pub published: DateTime<Utc>,
}

/// Deduplicate a crawled batch by link and filter it into a date window.
///
/// Later occurrences of an already-seen link are dropped; the first one
/// wins. Items whose date cannot be parsed are always dropped, window or
/// not: freshness cannot be certified for them. When `window` is present,
/// items outside it are dropped as well.
pub fn filter_items(
    items: Vec<SearchItem>,
    window: Option<&DateWindow>,
    now: DateTime<Utc>,
) -> Vec<DatedItem> {
    let total = items.len();
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = 0usize;
    let mut unparseable = 0usize;
    let mut out_of_range = 0usize;

    let kept: Vec<DatedItem> = items
        .into_iter()
        .filter_map(|item| {
            if !seen.insert(item.link.clone()) {
                duplicates += 1;
                return None;
            }
            let Some(published) = parse_provider_date(&item.date, now) else {
                unparseable += 1;
                return None;
            };
            if let Some(w) = window {
                if !w.contains(published) {
                    out_of_range += 1;
                    return None;
                }
            }
            Some(DatedItem { item, published })
        })
        .collect();

    debug!(
        total,
        kept = kept.len(),
        duplicates,
        unparseable,
        out_of_range,
        "Filtered crawled items"
    );
    kept
}

// ============================================================================
// Tests
// ============================================================================
