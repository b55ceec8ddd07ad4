use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while opening or migrating the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the database locked.
    #[error("Another pressclip process appears to hold the database lock. Close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// Errors raised by individual store operations.
///
/// A URL uniqueness violation on insert is its own variant: under
/// at-least-once delivery it signals "someone already stored this row" and
/// callers treat it as success, never as a failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert hit the headline URL uniqueness constraint.
    #[error("Headline URL already stored")]
    DuplicateUrl,

    /// The operation exceeded its deadline. Raised by callers that wrap
    /// store calls in a timeout; retried like any transient failure.
    #[error("Store operation timed out")]
    Timeout,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Returns true if the operation may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout => true,
            StoreError::DuplicateUrl => false,
            StoreError::Database(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
        }
    }

    /// Classify a raw sqlx error from an insert against a unique column.
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateUrl,
            other => StoreError::Database(other),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Publication catalog entry. The catalog is owned by an external CRUD
/// layer; the pipeline only reads it and creates minimal rows on demand
/// for hostnames it has not seen before.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Publication {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub category: Option<String>,
    pub region: Option<String>,
}

/// Stored headline row. Created exactly once per URL and never mutated
/// by the pipeline afterwards.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Headline {
    pub id: i64,
    pub url: String,
    pub headline: String,
    pub snippet: Option<String>,
    pub source: Option<String>,
    /// Date string exactly as the provider returned it.
    pub raw_date: Option<String>,
    /// Parsed publish time as epoch seconds, when parseable.
    pub normalized_date: Option<i64>,
    pub category: Option<String>,
    pub publication_id: i64,
    pub created_at: i64,
}

/// Insert payload for a new headline.
#[derive(Debug, Clone)]
pub struct NewHeadline {
    pub url: String,
    pub headline: String,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub raw_date: Option<String>,
    pub normalized_date: Option<i64>,
    pub category: String,
    pub publication_id: i64,
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Manual,
    Scheduled,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Scheduled => "scheduled",
        }
    }

    pub(crate) fn from_db(s: &str) -> Result<Self, StoreError> {
        match s {
            "manual" => Ok(TriggerType::Manual),
            "scheduled" => Ok(TriggerType::Scheduled),
            other => Err(StoreError::Database(sqlx::Error::Decode(
                format!("unknown trigger type: {other}").into(),
            ))),
        }
    }
}

/// Sync run lifecycle state. Transitions exactly once, from `Started` to
/// one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub(crate) fn from_db(s: &str) -> Result<Self, StoreError> {
        match s {
            "started" => Ok(RunStatus::Started),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(StoreError::Database(sqlx::Error::Decode(
                format!("unknown run status: {other}").into(),
            ))),
        }
    }
}

/// Counters accumulated over one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Publications whose crawl finished without a terminal error.
    pub publications_fetched: u32,
    /// Items aggregated across all crawls, before filtering.
    pub total_headlines_fetched: u32,
    /// Items surviving deduplication and the date window.
    pub headlines_within_range: u32,
    /// Messages successfully handed to the queue.
    pub messages_queued: u32,
}

/// Audit record of one sync run.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: i64,
    pub trigger: TriggerType,
    pub status: RunStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub window_start: Option<i64>,
    pub window_end: Option<i64>,
    pub max_pages: u32,
    pub summary: RunSummary,
    pub error_message: Option<String>,
}

/// Row type for sync run queries.
pub(crate) type SyncRunRow = (
    i64,            // id
    String,         // trigger_type
    String,         // status
    i64,            // started_at
    Option<i64>,    // finished_at
    Option<i64>,    // window_start
    Option<i64>,    // window_end
    i64,            // max_pages
    i64,            // publications_fetched
    i64,            // total_headlines_fetched
    i64,            // headlines_within_range
    i64,            // messages_queued
    Option<String>, // error_message
);

impl SyncRun {
    pub(crate) fn from_row(row: SyncRunRow) -> Result<Self, StoreError> {
        let (
            id,
            trigger,
            status,
            started_at,
            finished_at,
            window_start,
            window_end,
            max_pages,
            publications_fetched,
            total_headlines_fetched,
            headlines_within_range,
            messages_queued,
            error_message,
        ) = row;
        Ok(Self {
            id,
            trigger: TriggerType::from_db(&trigger)?,
            status: RunStatus::from_db(&status)?,
            started_at,
            finished_at,
            window_start,
            window_end,
            max_pages: max_pages as u32,
            summary: RunSummary {
                publications_fetched: publications_fetched as u32,
                total_headlines_fetched: total_headlines_fetched as u32,
                headlines_within_range: headlines_within_range as u32,
                messages_queued: messages_queued as u32,
            },
            error_message,
        })
    }
}
