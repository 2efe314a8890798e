//! Accessors for the `stats_hourly` / `stats_daily` tables (spec §3, §4.C)

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::Store;

/// The flushed counters for one period. Mirrors the monotonic (non-gauge) fields
/// of the in-memory [crate::stats::Stats] collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsDelta {
    pub uploads: i64,
    pub downloads: i64,
    pub upload_bytes: i64,
    pub download_bytes: i64,
    pub upload_errors: i64,
    pub download_errors: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatsHourlyRow {
    pub hour: DateTime<Utc>,
    pub uploads: i64,
    pub downloads: i64,
    pub upload_bytes: i64,
    pub download_bytes: i64,
    pub upload_errors: i64,
    pub download_errors: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatsDailyRow {
    pub day: DateTime<Utc>,
    pub uploads: i64,
    pub downloads: i64,
    pub upload_bytes: i64,
    pub download_bytes: i64,
    pub upload_errors: i64,
    pub download_errors: i64,
}

/// Truncate a timestamp to the start of its hour: the bucket key for `stats_hourly`.
pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .and_then(|naive| Utc.from_local_datetime(&naive).single())
        .unwrap_or(ts)
}

/// Truncate a timestamp to midnight: the bucket key for `stats_daily`.
pub fn day_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Utc.from_local_datetime(&naive).single())
        .unwrap_or(ts)
}

impl Store {
    /// UPSERT-accumulate: adds `delta` to whatever row already exists for `hour`,
    /// rather than overwriting it. This is the idempotency contract spec §4.C
    /// depends on — any number of flushes within the same hour simply sum.
    pub async fn flush_hourly(&self, hour: DateTime<Utc>, delta: StatsDelta) -> Result<(), sqlx::Error> {
        let hour = hour_bucket(hour);
        sqlx::query(
            "INSERT INTO stats_hourly (hour, uploads, downloads, upload_bytes, download_bytes, upload_errors, download_errors)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(hour) DO UPDATE SET
                uploads = uploads + excluded.uploads,
                downloads = downloads + excluded.downloads,
                upload_bytes = upload_bytes + excluded.upload_bytes,
                download_bytes = download_bytes + excluded.download_bytes,
                upload_errors = upload_errors + excluded.upload_errors,
                download_errors = download_errors + excluded.download_errors;",
        )
        .bind(hour)
        .bind(delta.uploads)
        .bind(delta.downloads)
        .bind(delta.upload_bytes)
        .bind(delta.download_bytes)
        .bind(delta.upload_errors)
        .bind(delta.download_errors)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sum every `stats_hourly` row belonging to `day` into `stats_daily`, using the
    /// same UPSERT-accumulate pattern (safe to re-run).
    pub async fn aggregate_hourly_to_daily(&self, day: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let day = day_bucket(day);
        let next_day = day + ChronoDuration::days(1);

        let totals: Option<(i64, i64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT COALESCE(SUM(uploads),0), COALESCE(SUM(downloads),0),
                    COALESCE(SUM(upload_bytes),0), COALESCE(SUM(download_bytes),0),
                    COALESCE(SUM(upload_errors),0), COALESCE(SUM(download_errors),0)
             FROM stats_hourly WHERE hour >= ? AND hour < ?;",
        )
        .bind(day)
        .bind(next_day)
        .fetch_optional(&self.pool)
        .await?;

        let (uploads, downloads, upload_bytes, download_bytes, upload_errors, download_errors) =
            totals.unwrap_or_default();

        sqlx::query(
            "INSERT INTO stats_daily (day, uploads, downloads, upload_bytes, download_bytes, upload_errors, download_errors)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(day) DO UPDATE SET
                uploads = excluded.uploads,
                downloads = excluded.downloads,
                upload_bytes = excluded.upload_bytes,
                download_bytes = excluded.download_bytes,
                upload_errors = excluded.upload_errors,
                download_errors = excluded.download_errors;",
        )
        .bind(day)
        .bind(uploads)
        .bind(downloads)
        .bind(upload_bytes)
        .bind(download_bytes)
        .bind(upload_errors)
        .bind(download_errors)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete `stats_hourly` rows older than 7 days (spec §4.D).
    pub async fn trim_hourly_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stats_hourly WHERE hour < ?;")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_hourly(&self, since: DateTime<Utc>) -> Result<Vec<StatsHourlyRow>, sqlx::Error> {
        sqlx::query_as("SELECT hour, uploads, downloads, upload_bytes, download_bytes, upload_errors, download_errors FROM stats_hourly WHERE hour >= ? ORDER BY hour ASC;")
            .bind(since)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_daily(&self, since: DateTime<Utc>) -> Result<Vec<StatsDailyRow>, sqlx::Error> {
        sqlx::query_as("SELECT day, uploads, downloads, upload_bytes, download_bytes, upload_errors, download_errors FROM stats_daily WHERE day >= ? ORDER BY day ASC;")
            .bind(since)
            .fetch_all(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(uploads: i64, bytes: i64) -> StatsDelta {
        StatsDelta {
            uploads,
            upload_bytes: bytes,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn flush_hourly_accumulates_across_calls() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();

        store.flush_hourly(now, delta(2, 100)).await.unwrap();
        store.flush_hourly(now, delta(3, 50)).await.unwrap();

        let rows = store.get_hourly(now - ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uploads, 5);
        assert_eq!(rows[0].upload_bytes, 150);
    }

    #[tokio::test]
    async fn aggregate_sums_hourly_into_daily() {
        let store = Store::open_in_memory().await.unwrap();
        let day_start = day_bucket(Utc::now());

        store.flush_hourly(day_start, delta(1, 10)).await.unwrap();
        store.flush_hourly(day_start + ChronoDuration::hours(5), delta(2, 20)).await.unwrap();

        store.aggregate_hourly_to_daily(day_start).await.unwrap();

        let rows = store.get_daily(day_start - ChronoDuration::days(1)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uploads, 3);
        assert_eq!(rows[0].upload_bytes, 30);
    }

    #[tokio::test]
    async fn trim_hourly_removes_old_buckets() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        store.flush_hourly(now - ChronoDuration::days(8), delta(1, 1)).await.unwrap();
        store.flush_hourly(now, delta(1, 1)).await.unwrap();

        let deleted = store.trim_hourly_older_than(now - ChronoDuration::days(7)).await.unwrap();
        assert_eq!(deleted, 1);
    }
}
