//! Placeholder [UpstreamSession] used when no concrete messaging-client binding
//! is wired in. The actual vendor SDK integration is explicitly out of scope
//! (spec §1) and is a deployment detail layered in by whoever embeds this
//! crate; this stub keeps the process bootable (and its `/health`, janitor,
//! and metadata-only routes fully functional) without one.

use async_trait::async_trait;
use bytes::Bytes;

use super::{GatewayError, MediaKind, QrInfo, UploadHandle, UpstreamSession};

pub struct NullSession {
    session_path: String,
}

impl NullSession {
    pub fn new(session_path: impl Into<String>) -> Self {
        Self { session_path: session_path.into() }
    }

    /// Crude liveness signal: a session file having been written previously
    /// means some prior process paired successfully.
    fn session_file_exists(&self) -> bool {
        std::path::Path::new(&self.session_path).exists()
    }
}

#[async_trait]
impl UpstreamSession for NullSession {
    async fn upload_bytes(&self, _bytes: Bytes, _kind: MediaKind) -> Result<UploadHandle, GatewayError> {
        Err(GatewayError::Other("no upstream messaging client is configured".into()))
    }

    async fn download_bytes(&self, _handle: &UploadHandle, _kind: MediaKind) -> Result<Bytes, GatewayError> {
        Err(GatewayError::Other("no upstream messaging client is configured".into()))
    }

    async fn do_connect(&self) -> Result<(), GatewayError> {
        Err(GatewayError::Other("no upstream messaging client is configured".into()))
    }

    async fn do_logout(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn request_qr(&self) -> Result<QrInfo, GatewayError> {
        Err(GatewayError::Qr("no upstream messaging client is configured".into()))
    }

    fn logged_in(&self) -> bool {
        self.session_file_exists()
    }
}
