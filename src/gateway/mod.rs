//! Upstream media gateway: a thin, duck-typed wrapper over the external
//! end-to-end-encrypted messaging platform used as opaque blob storage.
//!
//! The concrete messaging client library is explicitly out of scope (spec §1); this
//! module only specifies the narrow interface the rest of the system consumes
//! ([MediaGateway]) plus the bookkeeping (connection state, QR single-flight cache,
//! auto-reconnect) that sits in front of it. [fake::FakeGateway] implements the same
//! trait in memory so handlers can be tested without a live session.

pub mod fake;
pub mod null_session;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Classification of uploaded media, derived purely from the MIME prefix.
/// Feeds the upstream call but never affects local policy (spec §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            MediaKind::Image
        } else if mime_type.starts_with("video/") {
            MediaKind::Video
        } else if mime_type.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Document
        }
    }
}

/// The opaque handle quadruple returned by the upstream on upload, required in full
/// to download the blob back. `file_sha256` may be absent for legacy rows (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub direct_path: Vec<u8>,
    pub media_key: Vec<u8>,
    pub file_enc_hash: Vec<u8>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_length: u64,
}

#[derive(Debug, Clone)]
pub struct QrInfo {
    pub code: String,
    pub png_base64: String,
    pub timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not connected to upstream")]
    NotConnected,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("upstream upload failed: {0}")]
    UploadFailed(String),
    #[error("upstream download failed: {0}")]
    DownloadFailed(String),
    #[error("upstream request timed out")]
    Timeout,
    #[error("qr generation failed: {0}")]
    Qr(String),
    #[error("upstream error: {0}")]
    Other(String),
}

/// The narrow interface the core consumes from the upstream messaging client.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    async fn upload(&self, bytes: Bytes, kind: MediaKind) -> Result<UploadHandle, GatewayError>;
    async fn download(&self, handle: &UploadHandle, kind: MediaKind) -> Result<Bytes, GatewayError>;
    fn is_connected(&self) -> bool;
    fn is_logged_in(&self) -> bool;
    async fn connect(&self) -> Result<(), GatewayError>;
    async fn get_qr(&self) -> Result<QrInfo, GatewayError>;
    async fn logout(&self) -> Result<(), GatewayError>;
}

/// The actual bytes-in, bytes-out transport the gateway drives. This stands in for
/// the vendored messaging client, which is out of scope here (spec §1).
#[async_trait]
pub trait UpstreamSession: Send + Sync {
    async fn upload_bytes(&self, bytes: Bytes, kind: MediaKind) -> Result<UploadHandle, GatewayError>;
    async fn download_bytes(&self, handle: &UploadHandle, kind: MediaKind) -> Result<Bytes, GatewayError>;
    async fn do_connect(&self) -> Result<(), GatewayError>;
    async fn do_logout(&self) -> Result<(), GatewayError>;
    async fn request_qr(&self) -> Result<QrInfo, GatewayError>;
    fn logged_in(&self) -> bool;
}

struct CachedQr {
    info: QrInfo,
    expires_at: Instant,
}

struct GatewayInner {
    connected: bool,
    connected_at: Option<Instant>,
    cached_qr: Option<CachedQr>,
}

/// Production [MediaGateway] implementation layered over an [UpstreamSession].
///
/// Owns the connection state, the QR single-flight cache (spec §4.B: "only one
/// pairing session may be open" and "a generated QR is cached until its
/// server-provided timeout elapses"), and the reconnect counter consulted by
/// [WhatsAppGateway::auto_reconnect].
pub struct WhatsAppGateway<S: UpstreamSession> {
    session: S,
    inner: RwLock<GatewayInner>,
    reconnect_count: AtomicU64,
}

impl<S: UpstreamSession + 'static> WhatsAppGateway<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            inner: RwLock::new(GatewayInner {
                connected: false,
                connected_at: None,
                cached_qr: None,
            }),
            reconnect_count: AtomicU64::new(0),
        }
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Fire-and-forget supervised loop: while logged in but not connected, retry
    /// every 5s; back off to 30s for the attempt immediately after a failure, then
    /// resume the 5s cadence (spec §4.B).
    pub fn spawn_auto_reconnect(self: &Arc<Self>, shutdown: CancellationToken) {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut next_delay = Duration::from_secs(5);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(next_delay) => {}
                }

                if !gateway.is_logged_in() || gateway.is_connected() {
                    next_delay = Duration::from_secs(5);
                    continue;
                }

                gateway.reconnect_count.fetch_add(1, Ordering::Relaxed);
                match gateway.connect().await {
                    Ok(()) => {
                        tracing::info!("upstream auto-reconnect succeeded");
                        next_delay = Duration::from_secs(5);
                    }
                    Err(e) => {
                        tracing::warn!("upstream auto-reconnect failed: {e}");
                        next_delay = Duration::from_secs(30);
                    }
                }
            }
        });
    }
}

#[async_trait]
impl<S: UpstreamSession + 'static> MediaGateway for WhatsAppGateway<S> {
    async fn upload(&self, bytes: Bytes, kind: MediaKind) -> Result<UploadHandle, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.session.upload_bytes(bytes, kind).await
    }

    async fn download(&self, handle: &UploadHandle, kind: MediaKind) -> Result<Bytes, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.session.download_bytes(handle, kind).await
    }

    fn is_connected(&self) -> bool {
        self.inner.try_read().map(|g| g.connected).unwrap_or(false)
    }

    fn is_logged_in(&self) -> bool {
        self.session.logged_in()
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        self.session.do_connect().await?;
        let mut inner = self.inner.write().await;
        inner.connected = true;
        inner.connected_at = Some(Instant::now());
        Ok(())
    }

    async fn get_qr(&self) -> Result<QrInfo, GatewayError> {
        // Hold the lock across the whole fetch-or-generate critical section so
        // concurrent callers share a single in-flight request (single-flight).
        let mut inner = self.inner.write().await;

        if let Some(cached) = &inner.cached_qr {
            if cached.expires_at > Instant::now() {
                return Ok(cached.info.clone());
            }
        }

        let info = self.session.request_qr().await?;
        inner.cached_qr = Some(CachedQr {
            info: info.clone(),
            expires_at: Instant::now() + Duration::from_secs(info.timeout_secs),
        });
        Ok(info)
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.session.do_logout().await?;
        let mut inner = self.inner.write().await;
        inner.connected = false;
        inner.connected_at = None;
        // Pairing is invalidated on logout just as it is on a successful login.
        inner.cached_qr = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_classifies_by_mime_prefix() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Document);
        assert_eq!(MediaKind::from_mime(""), MediaKind::Document);
    }
}
