//! Unauthenticated health/status probes (spec §6.1).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    status: &'static str,
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

pub async fn ready(State(state): State<AppState>) -> StatusCode {
    if state.gateway.is_connected() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Debug, Serialize)]
pub struct PublicStatus {
    connected: bool,
}

pub async fn public_status(State(state): State<AppState>) -> Json<PublicStatus> {
    Json(PublicStatus { connected: state.gateway.is_connected() })
}
