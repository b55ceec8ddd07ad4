use super::schema::Database;
use super::types::{Publication, StoreError};

impl Database {
    // ========================================================================
    // Publication Operations
    // ========================================================================

    /// All cataloged publications, ordered by name.
    pub async fn find_publications(&self) -> Result<Vec<Publication>, StoreError> {
        let rows: Vec<Publication> = sqlx::query_as(
            "SELECT id, name, url, category, region FROM publications ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_publication_by_url(
        &self,
        url: &str,
    ) -> Result<Option<Publication>, StoreError> {
        let row: Option<Publication> = sqlx::query_as(
            "SELECT id, name, url, category, region FROM publications WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a publication, or return the existing row's id when the URL
    /// is already cataloged. The upsert keeps the name current, so calling
    /// this for an unseen hostname mid-run is race-free: whichever writer
    /// lands first, both get the same id back.
    pub async fn insert_publication(&self, name: &str, url: &str) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO publications (name, url)
            VALUES (?, ?)
            ON CONFLICT(url) DO UPDATE SET name = excluded.name
            RETURNING id
        "#,
        )
        .bind(name)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Whether a publication row with this id exists. Used to validate
    /// message references before writing a headline.
    pub async fn publication_exists(&self, id: i64) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM publications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

// ============================================================================
// Tests
// ============================================================================
