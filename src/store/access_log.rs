//! Accessors for the append-only `access_log` table (spec §3 "AccessLog" entity)

use chrono::{DateTime, Utc};

use super::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Download,
    PasswordFail,
}

impl AccessAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessAction::Download => "download",
            AccessAction::PasswordFail => "password_fail",
        }
    }
}

impl Store {
    pub async fn record_access(
        &self,
        file_id: &str,
        action: AccessAction,
        ip: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO access_log (file_id, action, ip, user_agent, created_at) VALUES (?, ?, ?, ?, ?);",
        )
        .bind(file_id)
        .bind(action.as_str())
        .bind(ip)
        .bind(user_agent)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete AccessLog rows older than the retention cutoff (spec §4.D, 30 days).
    pub async fn trim_access_log(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM access_log WHERE created_at < ?;")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_access_log_for_file(&self, file_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM access_log WHERE file_id = ?;")
            .bind(file_id)
            .fetch_one(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn trim_removes_rows_older_than_cutoff() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        store
            .record_access("f1", AccessAction::Download, Some("1.2.3.4"), None, now - ChronoDuration::days(31))
            .await
            .unwrap();
        store
            .record_access("f1", AccessAction::Download, Some("1.2.3.4"), None, now)
            .await
            .unwrap();

        let deleted = store.trim_access_log(now - ChronoDuration::days(30)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_access_log_for_file("f1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn password_fail_is_logged() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        store
            .record_access("f1", AccessAction::PasswordFail, None, Some("curl/8.0"), now)
            .await
            .unwrap();
        assert_eq!(store.count_access_log_for_file("f1").await.unwrap(), 1);
    }
}
