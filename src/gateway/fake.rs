//! In-memory [MediaGateway] test double used by handler tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{GatewayError, MediaGateway, MediaKind, QrInfo, UploadHandle};

/// Stores uploaded bytes keyed by their own sha256 digest (used as `direct_path`),
/// so `download` can hand back exactly what was uploaded without a real upstream.
#[derive(Default)]
pub struct FakeGateway {
    connected: AtomicBool,
    logged_in: AtomicBool,
    blobs: Mutex<HashMap<Vec<u8>, Bytes>>,
}

impl FakeGateway {
    pub fn new_connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            logged_in: AtomicBool::new(true),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_disconnected() -> Self {
        Self {
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(true),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaGateway for FakeGateway {
    async fn upload(&self, bytes: Bytes, _kind: MediaKind) -> Result<UploadHandle, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let digest = Sha256::digest(&bytes).to_vec();
        let length = bytes.len() as u64;
        self.blobs.lock().await.insert(digest.clone(), bytes);
        Ok(UploadHandle {
            direct_path: digest.clone(),
            media_key: vec![0u8; 32],
            file_enc_hash: digest.clone(),
            file_sha256: Some(digest),
            file_length: length,
        })
    }

    async fn download(&self, handle: &UploadHandle, _kind: MediaKind) -> Result<Bytes, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.blobs
            .lock()
            .await
            .get(&handle.direct_path)
            .cloned()
            .ok_or_else(|| GatewayError::DownloadFailed("blob not found".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_qr(&self) -> Result<QrInfo, GatewayError> {
        Ok(QrInfo {
            code: "fake-qr-code".into(),
            png_base64: "".into(),
            timeout_secs: 120,
        })
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
