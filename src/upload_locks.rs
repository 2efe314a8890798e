//! Per-upload-id mutual exclusion for the resumable PATCH critical section.
//!
//! The read-check-write-CAS sequence in `handlers::upload_resumable::patch`
//! must run as a single critical section per upload id: two concurrent
//! PATCHes that both read the same stale `byte_offset` would otherwise both
//! pass the pre-check and both append to the shared temp file before either
//! offset CAS lands, corrupting the file even though the CAS still picks a
//! single winner at the database layer. Grounded on the gateway's QR
//! single-flight lock (`gateway::WhatsAppGateway::get_qr`, which holds its
//! `RwLock` across a whole fetch-or-generate section): same idea, keyed per
//! upload id instead of a single global slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct UploadLockRegistry {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UploadLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire (creating if necessary) the lock for `id`. Hold the returned
    /// guard across the whole read-check-write-CAS sequence.
    pub async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_id_serializes_concurrent_critical_sections() {
        let registry = Arc::new(UploadLockRegistry::new());
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let registry = registry.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.lock("same-id").await;
                let before = counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                assert_eq!(counter.load(Ordering::SeqCst), before + 1);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn different_ids_do_not_contend() {
        let registry = UploadLockRegistry::new();
        let guard_a = registry.lock("a").await;
        let guard_b = registry.lock("b").await;
        drop(guard_a);
        drop(guard_b);
    }
}
