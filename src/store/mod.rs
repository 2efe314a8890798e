//! Durable local metadata store: the only path to persisted application state
//! (spec §3/§4.A). Everything else — the upstream blob, the in-memory stats
//! counters — is either ephemeral or owned by a different component entirely.

pub mod access_log;
pub mod files;
pub mod stats;
pub mod uploads;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Signal returned by the atomic cap-check increment on `files.download_count`.
/// Distinguishing "cap reached" from "not found" lets callers map each to its
/// own HTTP status without re-querying (spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    Incremented,
    CapReached,
    NotFound,
}

/// Handle to the metadata database. Cheap to clone (wraps a pooled connection
/// handle internally); hands out typed accessors per entity, grouped by module.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    /// Open (creating if necessary) the sqlite database at `path`, enable WAL
    /// journaling and a 5 second busy timeout, and run all pending migrations.
    ///
    /// Any failure here is fatal at boot (spec §7: "database open/migrate failure").
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Open a throwaway in-memory database, migrated the same way as [Store::open].
    /// Used by unit tests and by the integration test suite under `tests/`.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
