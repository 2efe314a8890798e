//! Accessors for the `files` table (spec §3 "File" entity)

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row};

use super::{IncrementOutcome, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Expired,
    Deleted,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Expired => "expired",
            FileStatus::Deleted => "deleted",
        }
    }
}

/// The upstream handle quadruple, stored alongside the rest of a File row.
/// Never mutated after create (spec §3 invariant).
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    pub direct_path: Vec<u8>,
    pub media_key: Vec<u8>,
    pub file_enc_hash: Vec<u8>,
    pub file_sha256: Option<Vec<u8>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct File {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: i64,
    pub file_hash: String,
    pub direct_path: Vec<u8>,
    pub media_key: Vec<u8>,
    pub file_enc_hash: Vec<u8>,
    pub file_sha256: Option<Vec<u8>>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub max_downloads: Option<i64>,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
}

impl File {
    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active.as_str()
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct NewFile {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: i64,
    pub file_hash: String,
    pub handle: UpstreamHandle,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub max_downloads: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    pub async fn create_file(&self, f: NewFile) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO files (
                id, filename, mime_type, file_size, file_hash,
                direct_path, media_key, file_enc_hash, file_sha256,
                description, password_hash, max_downloads, download_count,
                created_at, expires_at, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 'active');",
        )
        .bind(&f.id)
        .bind(&f.filename)
        .bind(&f.mime_type)
        .bind(f.file_size)
        .bind(&f.file_hash)
        .bind(&f.handle.direct_path)
        .bind(&f.handle.media_key)
        .bind(&f.handle.file_enc_hash)
        .bind(&f.handle.file_sha256)
        .bind(&f.description)
        .bind(&f.password_hash)
        .bind(f.max_downloads)
        .bind(f.created_at)
        .bind(f.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<File>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, filename, mime_type, file_size, file_hash,
                    direct_path, media_key, file_enc_hash, file_sha256,
                    description, password_hash, max_downloads, download_count,
                    created_at, expires_at, status
             FROM files WHERE id = ? LIMIT 1;",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_active_file_by_hash(&self, file_hash: &str) -> Result<Option<File>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, filename, mime_type, file_size, file_hash,
                    direct_path, media_key, file_enc_hash, file_sha256,
                    description, password_hash, max_downloads, download_count,
                    created_at, expires_at, status
             FROM files WHERE file_hash = ? AND status = 'active' LIMIT 1;",
        )
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_files(&self, limit: i64, offset: i64) -> Result<Vec<File>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, filename, mime_type, file_size, file_hash,
                    direct_path, media_key, file_enc_hash, file_sha256,
                    description, password_hash, max_downloads, download_count,
                    created_at, expires_at, status
             FROM files ORDER BY created_at DESC LIMIT ? OFFSET ?;",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Soft-delete: the only way a File transitions to `deleted` (spec §3).
    pub async fn soft_delete_file(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE files SET status = 'deleted' WHERE id = ? AND status != 'deleted';")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `UPDATE files SET status='expired' WHERE status='active' AND expires_at < now`.
    /// Returns the number of rows transitioned, for janitor logging.
    pub async fn expire_overdue_files(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE files SET status = 'expired' WHERE status = 'active' AND expires_at < ?;")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Atomic cap-check increment (spec §4.A): a single `UPDATE ... RETURNING`
    /// statement, so the decision of whether the cap still had room and the
    /// increment itself happen under the same write. The `target` CTE computes
    /// `can_increment` once from the pre-update row; the `UPDATE` applies it and
    /// `RETURNING` hands the same flag back, so no second query is needed to
    /// disambiguate "cap reached" from "no such row" (`fetch_optional` returning
    /// nothing *is* NotFound, since the `WHERE id = ?` always matches an existing row).
    pub async fn increment_download_count(&self, id: &str) -> Result<IncrementOutcome, sqlx::Error> {
        let row = sqlx::query(
            "WITH target AS (
                 SELECT (max_downloads IS NULL OR download_count < max_downloads) AS can_increment
                 FROM files WHERE id = ?
             )
             UPDATE files
             SET download_count = download_count + (SELECT CASE WHEN can_increment THEN 1 ELSE 0 END FROM target)
             WHERE id = ?
             RETURNING (SELECT can_increment FROM target) AS was_under_cap;",
        )
        .bind(id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(IncrementOutcome::NotFound);
        };

        let was_under_cap: bool = row.try_get("was_under_cap")?;
        Ok(if was_under_cap { IncrementOutcome::Incremented } else { IncrementOutcome::CapReached })
    }

    pub async fn total_active_bytes(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM files WHERE status = 'active';")
            .fetch_one(&self.pool)
            .await
    }
}
