//! Accessors for the `uploads` table (spec §3 "Upload" entity)

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Store;

#[derive(Debug, Clone, FromRow)]
pub struct Upload {
    pub id: String,
    pub filename: Option<String>,
    pub file_size: Option<i64>,
    pub byte_offset: i64,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub async fn create_upload(
        &self,
        id: &str,
        file_size: Option<i64>,
        metadata: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO uploads (id, filename, file_size, byte_offset, metadata, created_at, updated_at)
             VALUES (?, NULL, ?, 0, ?, ?, ?);",
        )
        .bind(id)
        .bind(file_size)
        .bind(metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_upload(&self, id: &str) -> Result<Option<Upload>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, filename, file_size, byte_offset, metadata, created_at, updated_at
             FROM uploads WHERE id = ? LIMIT 1;",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Conditionally advance the offset, guarding against a stale client (spec §4.F:
    /// "any out-of-order PATCH is rejected"). Returns `true` if the update applied.
    pub async fn advance_upload_offset(
        &self,
        id: &str,
        expected_offset: i64,
        new_offset: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE uploads SET byte_offset = ?, updated_at = ? WHERE id = ? AND byte_offset = ?;",
        )
        .bind(new_offset)
        .bind(now)
        .bind(id)
        .bind(expected_offset)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_upload(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM uploads WHERE id = ?;")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete Upload rows whose `updated_at` predates `cutoff` (spec §4.D purge loop).
    pub async fn delete_uploads_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM uploads WHERE updated_at < ?;")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn upload_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM uploads WHERE id = ? LIMIT 1;")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn create_and_advance_offset() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        store.create_upload("u1", Some(10), None, now).await.unwrap();

        let u = store.get_upload("u1").await.unwrap().unwrap();
        assert_eq!(u.byte_offset, 0);

        assert!(store.advance_upload_offset("u1", 0, 4, now).await.unwrap());
        assert_eq!(store.get_upload("u1").await.unwrap().unwrap().byte_offset, 4);

        // Stale offset is rejected.
        assert!(!store.advance_upload_offset("u1", 0, 4, now).await.unwrap());
        assert_eq!(store.get_upload("u1").await.unwrap().unwrap().byte_offset, 4);
    }

    #[tokio::test]
    async fn purge_removes_only_stale_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        store.create_upload("old", Some(10), None, now - ChronoDuration::hours(30)).await.unwrap();
        store.create_upload("fresh", Some(10), None, now).await.unwrap();

        let deleted = store.delete_uploads_older_than(now - ChronoDuration::hours(24)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_upload("old").await.unwrap().is_none());
        assert!(store.get_upload("fresh").await.unwrap().is_some());
    }
}
