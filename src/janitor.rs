//! Background retention loops (spec §4.D). Four independent supervised tasks,
//! each following the teacher's `cleanup_cronjob` shape — fire once immediately,
//! then tick on a fixed period — but split one period/action per loop instead of
//! the teacher's single combined job.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::stats::Stats;
use crate::store::Store;

const EXPIRE_PERIOD: Duration = Duration::from_secs(3600);
const PURGE_PERIOD: Duration = Duration::from_secs(6 * 3600);
const STATS_PERIOD: Duration = Duration::from_secs(3600);
const ACCESS_LOG_PERIOD: Duration = Duration::from_secs(24 * 3600);

const UPLOAD_IDLE_CUTOFF: ChronoDuration = ChronoDuration::hours(24);
const HOURLY_RETENTION: ChronoDuration = ChronoDuration::days(7);
const ACCESS_LOG_RETENTION: ChronoDuration = ChronoDuration::days(30);

fn interval(period: Duration) -> tokio::time::Interval {
    let mut iv = tokio::time::interval(period);
    // Fire immediately on the first tick, then every `period` after.
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}

/// `UPDATE files SET status='expired' WHERE status='active' AND expires_at < now`, hourly.
pub async fn expire_loop(store: Store, shutdown: CancellationToken) {
    let mut ticker = interval(EXPIRE_PERIOD);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("expire loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        match store.expire_overdue_files(Utc::now()).await {
            Ok(count) if count > 0 => tracing::info!(count, "expired overdue files"),
            Ok(_) => {}
            Err(e) => tracing::error!("expire loop query failed: {e}"),
        }
    }
}

/// Delete Upload rows older than 24h, then scan `temp_dir` for orphaned `.tmp`
/// files older than 24h with no backing Upload row (spec §4.D).
pub async fn purge_stale_uploads_loop(store: Store, temp_dir: PathBuf, shutdown: CancellationToken) {
    let mut ticker = interval(PURGE_PERIOD);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("purge loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let cutoff = Utc::now() - UPLOAD_IDLE_CUTOFF;
        match store.delete_uploads_older_than(cutoff).await {
            Ok(count) if count > 0 => tracing::info!(count, "purged stale upload rows"),
            Ok(_) => {}
            Err(e) => {
                tracing::error!("purge loop query failed: {e}");
                continue;
            }
        }

        if let Err(e) = reconcile_orphan_temp_files(&store, &temp_dir).await {
            tracing::error!("purge loop temp-dir scan failed: {e}");
        }
    }
}

async fn reconcile_orphan_temp_files(store: &Store, temp_dir: &PathBuf) -> std::io::Result<()> {
    let mut entries = match tokio::fs::read_dir(temp_dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let cutoff = std::time::SystemTime::now() - UPLOAD_IDLE_CUTOFF.to_std().unwrap_or(Duration::from_secs(86400));

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("tmp") {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = metadata.modified().unwrap_or(std::time::SystemTime::now());
        if modified > cutoff {
            continue;
        }

        match store.upload_exists(stem).await {
            Ok(true) => continue,
            Ok(false) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::error!(path = %path.display(), "failed to remove orphan temp file: {e}");
                } else {
                    tracing::info!(path = %path.display(), "removed orphan temp file");
                }
            }
            Err(e) => tracing::error!("upload lookup failed during orphan scan: {e}"),
        }
    }

    Ok(())
}

/// Flush counters into `stats_hourly`; at local hour 0, roll yesterday's hourly
/// buckets into `stats_daily` and trim hourly rows older than 7 days (spec §4.D).
/// Performs a final flush on shutdown so in-flight counters are never lost.
pub async fn stats_loop(store: Store, stats: std::sync::Arc<Stats>, shutdown: CancellationToken) {
    let mut ticker = interval(STATS_PERIOD);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("stats loop performing final flush before stopping");
                flush_and_maybe_rollup(&store, &stats).await;
                return;
            }
            _ = ticker.tick() => {}
        }

        flush_and_maybe_rollup(&store, &stats).await;
    }
}

async fn flush_and_maybe_rollup(store: &Store, stats: &Stats) {
    let now = Utc::now();
    let delta = stats.take_and_reset();
    if let Err(e) = store.flush_hourly(now, delta).await {
        tracing::error!("stats flush failed: {e}");
        return;
    }

    if now.hour() == 0 {
        let yesterday = now - ChronoDuration::days(1);
        if let Err(e) = store.aggregate_hourly_to_daily(yesterday).await {
            tracing::error!("stats daily rollup failed: {e}");
            return;
        }
        match store.trim_hourly_older_than(now - HOURLY_RETENTION).await {
            Ok(count) if count > 0 => tracing::info!(count, "trimmed old hourly stats buckets"),
            Ok(_) => {}
            Err(e) => tracing::error!("stats trim failed: {e}"),
        }
    }
}

/// Delete AccessLog rows older than 30 days, daily.
pub async fn access_log_trim_loop(store: Store, shutdown: CancellationToken) {
    let mut ticker = interval(ACCESS_LOG_PERIOD);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("access log trim loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        match store.trim_access_log(Utc::now() - ACCESS_LOG_RETENTION).await {
            Ok(count) if count > 0 => tracing::info!(count, "trimmed old access log rows"),
            Ok(_) => {}
            Err(e) => tracing::error!("access log trim failed: {e}"),
        }
    }
}

/// Spawn all four loops, returning their join handles so the caller can await
/// them during shutdown drain.
pub fn spawn_all(
    store: Store,
    stats: std::sync::Arc<Stats>,
    temp_dir: PathBuf,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(expire_loop(store.clone(), shutdown.clone())),
        tokio::spawn(purge_stale_uploads_loop(store.clone(), temp_dir, shutdown.clone())),
        tokio::spawn(stats_loop(store.clone(), stats, shutdown.clone())),
        tokio::spawn(access_log_trim_loop(store, shutdown)),
    ]
}
