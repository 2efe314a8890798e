//! In-memory counters for the Stats Collector (spec §4.C). Lock-free so the hot
//! upload/download paths never contend with the hourly flush.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use crate::store::stats::StatsDelta;

/// Snapshot returned by [Stats::snapshot], and what `GET /api/status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uploads: u64,
    pub downloads: u64,
    pub upload_bytes: u64,
    pub download_bytes: u64,
    pub upload_errors: u64,
    pub download_errors: u64,
    pub active_uploads: i64,
    pub active_downloads: i64,
}

/// The running counters. Monotonic fields (everything but the two gauges) are
/// reset to zero by [Stats::take_and_reset] once their delta has been durably
/// flushed; the gauges track in-flight work and are never reset by a flush.
#[derive(Debug, Default)]
pub struct Stats {
    uploads: AtomicU64,
    downloads: AtomicU64,
    upload_bytes: AtomicU64,
    download_bytes: AtomicU64,
    upload_errors: AtomicU64,
    download_errors: AtomicU64,
    active_uploads: AtomicI64,
    active_downloads: AtomicI64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_upload(&self, bytes: u64) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.upload_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_upload_error(&self) {
        self.upload_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: u64) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.download_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_download_error(&self) {
        self.download_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_started(&self) {
        self.active_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_finished(&self) {
        self.active_uploads.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn download_started(&self) {
        self.active_downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn download_finished(&self) {
        self.active_downloads.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            upload_bytes: self.upload_bytes.load(Ordering::Relaxed),
            download_bytes: self.download_bytes.load(Ordering::Relaxed),
            upload_errors: self.upload_errors.load(Ordering::Relaxed),
            download_errors: self.download_errors.load(Ordering::Relaxed),
            active_uploads: self.active_uploads.load(Ordering::Relaxed),
            active_downloads: self.active_downloads.load(Ordering::Relaxed),
        }
    }

    /// Atomically read the monotonic counters and zero them, handing back a
    /// delta ready for [crate::store::Store::flush_hourly]. Gauges are untouched.
    pub fn take_and_reset(&self) -> StatsDelta {
        StatsDelta {
            uploads: self.uploads.swap(0, Ordering::Relaxed) as i64,
            downloads: self.downloads.swap(0, Ordering::Relaxed) as i64,
            upload_bytes: self.upload_bytes.swap(0, Ordering::Relaxed) as i64,
            download_bytes: self.download_bytes.swap(0, Ordering::Relaxed) as i64,
            upload_errors: self.upload_errors.swap(0, Ordering::Relaxed) as i64,
            download_errors: self.download_errors.swap(0, Ordering::Relaxed) as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_activity() {
        let stats = Stats::new();
        stats.record_upload(100);
        stats.record_download(50);
        stats.record_upload_error();
        stats.upload_started();

        let snap = stats.snapshot();
        assert_eq!(snap.uploads, 1);
        assert_eq!(snap.upload_bytes, 100);
        assert_eq!(snap.downloads, 1);
        assert_eq!(snap.download_bytes, 50);
        assert_eq!(snap.upload_errors, 1);
        assert_eq!(snap.active_uploads, 1);
    }

    #[test]
    fn take_and_reset_zeroes_counters_but_not_gauges() {
        let stats = Stats::new();
        stats.record_upload(10);
        stats.download_started();

        let delta = stats.take_and_reset();
        assert_eq!(delta.uploads, 1);
        assert_eq!(delta.upload_bytes, 10);

        let snap = stats.snapshot();
        assert_eq!(snap.uploads, 0);
        assert_eq!(snap.active_downloads, 1);
    }
}
