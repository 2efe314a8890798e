//! Shared application state handed to every axum handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::admin_session::AdminSessionStore;
use crate::config::AppConfig;
use crate::gateway::MediaGateway;
use crate::stats::Stats;
use crate::store::Store;
use crate::upload_locks::UploadLockRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub gateway: Arc<dyn MediaGateway>,
    pub stats: Arc<Stats>,
    pub config: Arc<AppConfig>,
    pub admin_sessions: Arc<AdminSessionStore>,
    pub upload_locks: Arc<UploadLockRegistry>,
    pub shutdown: CancellationToken,
}
