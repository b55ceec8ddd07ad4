use chrono::Utc;

use super::schema::Database;
use super::types::{Headline, NewHeadline, StoreError};

impl Database {
    // ========================================================================
    // Headline Operations
    // ========================================================================

    pub async fn find_headline_by_url(&self, url: &str) -> Result<Option<Headline>, StoreError> {
        let row: Option<Headline> = sqlx::query_as(
            r#"
            SELECT id, url, headline, snippet, source, raw_date, normalized_date,
                   category, publication_id, created_at
            FROM headlines
            WHERE url = ?
        "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a headline row.
    ///
    /// A URL uniqueness violation comes back as [`StoreError::DuplicateUrl`]
    /// so callers can tell "already stored" apart from real failures. Any
    /// other constraint or connection problem is a plain database error.
    pub async fn insert_headline(&self, new: &NewHeadline) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO headlines
                (url, headline, snippet, source, raw_date, normalized_date,
                 category, publication_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&new.url)
        .bind(&new.headline)
        .bind(&new.snippet)
        .bind(&new.source)
        .bind(&new.raw_date)
        .bind(new.normalized_date)
        .bind(&new.category)
        .bind(new.publication_id)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_insert)?;
        Ok(id)
    }

    pub async fn count_headlines(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM headlines")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
