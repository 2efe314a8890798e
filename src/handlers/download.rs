//! Download handler: ordered policy gate then atomic counter (spec §4.G).
//! Grounded in the teacher's `download::download_endpoint` (lookup, stream,
//! atomic increment), generalized with expiry/password/cap checks.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::{AppError, ErrorCode};
use crate::gateway::{GatewayError, MediaKind, UploadHandle};
use crate::store::access_log::AccessAction;
use crate::store::IncrementOutcome;
use crate::state::AppState;
use crate::util;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub password: Option<String>,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    // 1. Lookup.
    let file = state
        .store
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::not_found("file not found"))?;

    let now = util::now();

    // 2/3. Expiry and soft-delete gates.
    if file.status == "deleted" {
        return AppError::err(StatusCode::GONE, ErrorCode::FileDeleted, "file has been deleted");
    }
    if file.status == "expired" || now >= file.expires_at {
        return AppError::err(StatusCode::GONE, ErrorCode::FileExpired, "file has expired");
    }

    // 4. Password gate.
    if let Some(hash) = &file.password_hash {
        let supplied = headers
            .get("x-password")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| query.password.clone());

        let Some(supplied) = supplied else {
            return AppError::err(StatusCode::UNAUTHORIZED, ErrorCode::PasswordRequired, "password required");
        };

        let ok = bcrypt::verify(&supplied, hash).unwrap_or(false);
        if !ok {
            state
                .store
                .record_access(&id, AccessAction::PasswordFail, client_ip(&headers).as_deref(), user_agent(&headers).as_deref(), now)
                .await?;
            return AppError::err(StatusCode::UNAUTHORIZED, ErrorCode::InvalidPassword, "incorrect password");
        }
    }

    // 5. Upstream connectivity.
    if !state.gateway.is_connected() {
        return AppError::err(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::WhatsappNotConnected, "upstream not connected");
    }

    // 6. Fetch bytes, then gate, per spec's deliberate ordering (§4.G step 7 /
    // §9): the cap check happens after the fetch, wasting one upstream call on
    // the losing racer but keeping the only correctness-critical guard at the
    // store's atomic UPDATE.
    state.stats.download_started();
    let kind = MediaKind::from_mime(&file.mime_type);
    let handle = UploadHandle {
        direct_path: file.direct_path.clone(),
        media_key: file.media_key.clone(),
        file_enc_hash: file.file_enc_hash.clone(),
        file_sha256: file.file_sha256.clone(),
        file_length: file.file_size as u64,
    };
    let fetch_result = state.gateway.download(&handle, kind).await;
    state.stats.download_finished();

    let bytes = match fetch_result {
        Ok(b) => b,
        Err(e) => {
            state.stats.record_download_error();
            let code = match e {
                GatewayError::NotConnected => ErrorCode::WhatsappNotConnected,
                _ => ErrorCode::DownloadFailed,
            };
            let status = if code == ErrorCode::WhatsappNotConnected {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return AppError::err(status, code, format!("download failed: {e}"));
        }
    };

    // 7. Atomic cap-check increment.
    match state.store.increment_download_count(&id).await? {
        IncrementOutcome::Incremented => {}
        IncrementOutcome::CapReached => {
            return AppError::err(StatusCode::GONE, ErrorCode::DownloadLimitReached, "download limit reached");
        }
        IncrementOutcome::NotFound => {
            return Err(AppError::not_found("file not found"));
        }
    }

    // 8. Log, respond.
    state.store.record_access(&id, AccessAction::Download, client_ip(&headers).as_deref(), user_agent(&headers).as_deref(), now).await?;
    state.stats.record_download(bytes.len() as u64);

    let disposition = format!("attachment; filename=\"{}\"", file.filename.replace('"', ""));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.mime_type.clone())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|e| AppError::new500(e.to_string()))?;
    Ok(response.into_response())
}
