use chrono::Utc;

use super::schema::Database;
use super::types::{RunStatus, RunSummary, StoreError, SyncRun, SyncRunRow, TriggerType};

impl Database {
    // ========================================================================
    // Sync Run Operations
    // ========================================================================

    /// Create a sync run in `started` state. Returns the new row's id.
    pub async fn insert_sync_run(
        &self,
        trigger: TriggerType,
        window: Option<(i64, i64)>,
        max_pages: u32,
    ) -> Result<i64, StoreError> {
        let (window_start, window_end) = match window {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sync_runs
                (trigger_type, status, started_at, window_start, window_end, max_pages)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(trigger.as_str())
        .bind(RunStatus::Started.as_str())
        .bind(Utc::now().timestamp())
        .bind(window_start)
        .bind(window_end)
        .bind(max_pages as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Move a run from `started` to a terminal state, recording the final
    /// summary and optional error message.
    ///
    /// The update is guarded on the current status being `started`, which
    /// enforces the one-transition lifecycle in SQL: finishing a run twice
    /// (or finishing an unknown id) returns `RowNotFound`.
    pub async fn finish_sync_run(
        &self,
        id: i64,
        status: RunStatus,
        summary: &RunSummary,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs
            SET status = ?,
                finished_at = ?,
                publications_fetched = ?,
                total_headlines_fetched = ?,
                headlines_within_range = ?,
                messages_queued = ?,
                error_message = ?
            WHERE id = ? AND status = 'started'
        "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().timestamp())
        .bind(summary.publications_fetched as i64)
        .bind(summary.total_headlines_fetched as i64)
        .bind(summary.headlines_within_range as i64)
        .bind(summary.messages_queued as i64)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    pub async fn get_sync_run(&self, id: i64) -> Result<Option<SyncRun>, StoreError> {
        let row: Option<SyncRunRow> = sqlx::query_as(
            r#"
            SELECT id, trigger_type, status, started_at, finished_at,
                   window_start, window_end, max_pages,
                   publications_fetched, total_headlines_fetched,
                   headlines_within_range, messages_queued, error_message
            FROM sync_runs
            WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SyncRun::from_row).transpose()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::storage::{Database, RunStatus, RunSummary, StoreError, TriggerType};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_creates_started_run() {
        let db = test_db().await;
        let id = db
            .insert_sync_run(TriggerType::Manual, Some((1_700_000_000, 1_700_086_400)), 3)
            .await
            .unwrap();

        let run = db.get_sync_run(id).await.unwrap().unwrap();
        assert_eq!(run.trigger, TriggerType::Manual);
        assert_eq!(run.status, RunStatus::Started);
        assert_eq!(run.window_start, Some(1_700_000_000));
        assert_eq!(run.window_end, Some(1_700_086_400));
        assert_eq!(run.max_pages, 3);
        assert!(run.finished_at.is_none());
        assert_eq!(run.summary, RunSummary::default());
        assert!(run.error_message.is_none());
    }

    #[tokio::test]
    async fn test_finish_completed_records_summary() {
        let db = test_db().await;
        let id = db
            .insert_sync_run(TriggerType::Scheduled, None, 2)
            .await
            .unwrap();

        let summary = RunSummary {
            publications_fetched: 4,
            total_headlines_fetched: 40,
            headlines_within_range: 25,
            messages_queued: 25,
        };
        db.finish_sync_run(id, RunStatus::Completed, &summary, None)
            .await
            .unwrap();

        let run = db.get_sync_run(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.summary, summary);
        assert!(run.finished_at.is_some());
        assert!(run.window_start.is_none());
    }

    #[tokio::test]
    async fn test_finish_failed_records_error_message() {
        let db = test_db().await;
        let id = db
            .insert_sync_run(TriggerType::Manual, None, 1)
            .await
            .unwrap();

        let partial = RunSummary {
            publications_fetched: 2,
            total_headlines_fetched: 12,
            ..Default::default()
        };
        db.finish_sync_run(id, RunStatus::Failed, &partial, Some("dispatch exploded"))
            .await
            .unwrap();

        let run = db.get_sync_run(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.summary.publications_fetched, 2);
        assert_eq!(run.error_message.as_deref(), Some("dispatch exploded"));
    }

    #[tokio::test]
    async fn test_finish_twice_rejected() {
        let db = test_db().await;
        let id = db
            .insert_sync_run(TriggerType::Manual, None, 1)
            .await
            .unwrap();

        let summary = RunSummary::default();
        db.finish_sync_run(id, RunStatus::Completed, &summary, None)
            .await
            .unwrap();

        let err = db
            .finish_sync_run(id, RunStatus::Failed, &summary, Some("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Database(sqlx::Error::RowNotFound)
        ));

        // Terminal state is unchanged.
        let run = db.get_sync_run(id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_finish_unknown_id_rejected() {
        let db = test_db().await;
        let err = db
            .finish_sync_run(42, RunStatus::Completed, &RunSummary::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Database(sqlx::Error::RowNotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_missing_run() {
        let db = test_db().await;
        assert!(db.get_sync_run(1).await.unwrap().is_none());
    }
}
