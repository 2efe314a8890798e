//! Lifecycle Supervisor (spec §4.H): boot ordering and graceful shutdown.
//! Grounded in the teacher's `main()` + `shutdown_handler`, extended with
//! SIGTERM handling and the bounded drain sequence spec §4.H requires.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use relaydrop::admin_session::AdminSessionStore;
use relaydrop::config::AppConfig;
use relaydrop::gateway::null_session::NullSession;
use relaydrop::gateway::{MediaGateway, WhatsAppGateway};
use relaydrop::state::AppState;
use relaydrop::stats::Stats;
use relaydrop::store::Store;
use relaydrop::upload_locks::UploadLockRegistry;
use relaydrop::{handlers, janitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config
    let config = AppConfig::from_env();

    // Logger
    tracing_subscriber::fmt().with_max_level(config.log_level).init();

    tracing::info!(port = config.port, admin_enabled = config.admin_enabled(), "starting up");

    // MetadataStore (migrations)
    let store = Store::open(&config.database_path).await?;

    // Upstream (open local session store, attempt Connect if logged in)
    let session = NullSession::new(config.wa_session_path.clone());
    let gateway = Arc::new(WhatsAppGateway::new(session));
    if gateway.is_logged_in() {
        if let Err(e) = gateway.connect().await {
            tracing::warn!("initial upstream connect failed, relying on auto-reconnect: {e}");
        }
    }

    let shutdown = CancellationToken::new();

    // Upstream.AutoReconnect
    gateway.spawn_auto_reconnect(shutdown.clone());

    // Stats.Init
    let stats = Arc::new(Stats::new());

    tokio::fs::create_dir_all(&config.temp_dir).await?;

    let app_state = AppState {
        store: store.clone(),
        gateway: gateway.clone(),
        stats: stats.clone(),
        config: Arc::new(config.clone()),
        admin_sessions: Arc::new(AdminSessionStore::new(config.admin_session_max_age)),
        upload_locks: Arc::new(UploadLockRegistry::new()),
        shutdown: shutdown.clone(),
    };

    // Janitor.Start
    let janitor_handles = janitor::spawn_all(store.clone(), stats.clone(), config.temp_dir.clone().into(), shutdown.clone());

    // HTTP server
    let app = handlers::router(app_state.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    let server = axum::serve(listener, app.into_make_service());

    tokio::select! {
        result = server.with_graceful_shutdown(wait_for_shutdown_signal()) => {
            if let Err(e) = result {
                tracing::error!("server error: {e}");
            }
        }
    }

    tracing::info!("shutdown signal received, draining");
    drain(app_state, shutdown, janitor_handles, config.shutdown_timeout_secs).await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Steps (b)-(e) of spec §4.H, bounded by `ShutdownTimeout` in total.
async fn drain(state: AppState, shutdown: CancellationToken, janitor_handles: Vec<tokio::task::JoinHandle<()>>, timeout_secs: u64) {
    let budget = Duration::from_secs(timeout_secs);
    let deadline = tokio::time::Instant::now() + budget;

    // (b) wait for in-flight uploads/downloads to finish, or the deadline.
    let drain_active = async {
        loop {
            let snap = state.stats.snapshot();
            if snap.active_uploads <= 0 && snap.active_downloads <= 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    let _ = tokio::time::timeout_at(deadline, drain_active).await;

    // (c) Janitor.Stop: cancel and join all four loops (stats loop performs a final flush).
    shutdown.cancel();
    let join_all = futures_join_all(janitor_handles);
    let _ = tokio::time::timeout_at(deadline, join_all).await;

    // (d) Upstream.Disconnect + Close.
    if let Err(e) = state.gateway.logout().await {
        tracing::warn!("upstream logout during shutdown failed: {e}");
    }

    // (e) MetadataStore.Close.
    state.store.close().await;

    tracing::info!("shutdown complete");
}

async fn futures_join_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}
