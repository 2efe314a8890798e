//! Resumable upload handler: the tus 1.0.0-compatible CREATE/HEAD/PATCH/DELETE
//! state machine (spec §4.F). The teacher has no resumable-upload code to
//! generalize, so this is written fresh in the teacher's handler idiom
//! (axum extractors, `AppError` returns, `#[tracing::instrument]`-free but
//! otherwise matching `upload.rs`'s plain `async fn(...) -> Result<_, AppError>`
//! shape).

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, ErrorCode};
use crate::handlers::completion::{complete_upload, RawUploadFields};
use crate::short_id;
use crate::state::AppState;
use crate::util;

const TUS_VERSION: &str = "1.0.0";
const TUS_EXTENSIONS: &str = "creation,termination";
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_ID_RETRIES: u32 = 8;

fn temp_path(state: &AppState, id: &str) -> std::path::PathBuf {
    std::path::Path::new(&state.config.temp_dir).join(format!("{id}.tmp"))
}

fn require_tus_version(headers: &HeaderMap) -> Result<(), AppError> {
    let version = headers.get("tus-resumable").and_then(|v| v.to_str().ok());
    if version == Some(TUS_VERSION) {
        Ok(())
    } else {
        AppError::err(StatusCode::PRECONDITION_FAILED, ErrorCode::UnsupportedVersion, "unsupported or missing Tus-Resumable version")
    }
}

fn tus_headers(resp: Response) -> Response {
    let mut resp = resp;
    resp.headers_mut().insert("Tus-Resumable", HeaderValue::from_static(TUS_VERSION));
    resp
}

/// Decode `Upload-Metadata`: comma-separated `key base64(value)` pairs.
fn parse_metadata(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, ' ');
        let Some(key) = parts.next() else { continue };
        let value = parts
            .next()
            .and_then(|v| BASE64.decode(v).ok())
            .and_then(|b| String::from_utf8(b).ok())
            .unwrap_or_default();
        map.insert(key.to_string(), value);
    }
    map
}

pub async fn options(State(state): State<AppState>) -> Response {
    let resp = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Tus-Version", TUS_VERSION)
        .header("Tus-Extension", TUS_EXTENSIONS)
        .header("Tus-Max-Size", state.config.max_upload_size.to_string())
        .body(axum::body::Body::empty())
        .unwrap();
    tus_headers(resp)
}

pub async fn create(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    require_tus_version(&headers)?;

    let length: i64 = headers
        .get("upload-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidLength, "missing or invalid Upload-Length"))?;

    if length <= 0 {
        return AppError::err(StatusCode::BAD_REQUEST, ErrorCode::InvalidLength, "Upload-Length must be positive");
    }
    if length as u64 > state.config.max_upload_size {
        return AppError::err(StatusCode::PAYLOAD_TOO_LARGE, ErrorCode::FileTooLarge, "Upload-Length exceeds configured maximum");
    }

    let raw_metadata = headers.get("upload-metadata").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
    let parsed = raw_metadata.as_deref().map(parse_metadata).unwrap_or_default();
    let filename = parsed.get("filename").map(|f| util::sanitize_filename(f));

    let now = util::now();
    let mut last_err = None;
    let id = 'retry: {
        for _ in 0..MAX_ID_RETRIES {
            let candidate = short_id::generate_upload_id();
            match state.store.create_upload(&candidate, Some(length), raw_metadata.as_deref(), now).await {
                Ok(()) => break 'retry candidate,
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    last_err = Some("upload id collision".to_string());
                    continue;
                }
                Err(e) => return Err(AppError::new500(e.to_string())),
            }
        }
        return Err(AppError::new500(last_err.unwrap_or_else(|| "exhausted upload id retries".into())));
    };

    tokio::fs::File::create(temp_path(&state, &id)).await.map_err(|e| AppError::new500(e.to_string()))?;

    let _ = filename; // informational only; re-derived from metadata at completion

    let resp = Response::builder()
        .status(StatusCode::CREATED)
        .header("Location", format!("/api/upload/{id}"))
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::new500(e.to_string()))?;
    Ok(tus_headers(resp))
}

pub async fn head(State(state): State<AppState>, Path(id): Path<String>, headers: HeaderMap) -> Result<Response, AppError> {
    require_tus_version(&headers)?;

    let upload = state.store.get_upload(&id).await?.ok_or_else(|| AppError::not_found("upload not found"))?;

    let mut builder = Response::builder().status(StatusCode::OK).header("Upload-Offset", upload.byte_offset.to_string());
    if let Some(len) = upload.file_size {
        builder = builder.header("Upload-Length", len.to_string());
    }
    let resp = builder.body(axum::body::Body::empty()).map_err(|e| AppError::new500(e.to_string()))?;
    Ok(tus_headers(resp))
}

#[derive(Debug, Serialize)]
struct OffsetConflictBody {
    error: &'static str,
    message: String,
    current_offset: i64,
}

fn offset_conflict(current_offset: i64) -> Response {
    let body = OffsetConflictBody {
        error: ErrorCode::OffsetMismatch.as_str(),
        message: "client offset does not match the server's current offset".to_string(),
        current_offset,
    };
    tus_headers((StatusCode::CONFLICT, Json(body)).into_response())
}

pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    require_tus_version(&headers)?;

    let content_type_ok = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s == "application/offset+octet-stream")
        .unwrap_or(false);
    if !content_type_ok {
        return AppError::err(StatusCode::UNSUPPORTED_MEDIA_TYPE, ErrorCode::InvalidRequest, "Content-Type must be application/offset+octet-stream");
    }

    let client_offset: i64 = headers
        .get("upload-offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidOffset, "missing or invalid Upload-Offset"))?;

    // Serialize the whole read-check-write-CAS sequence per upload id: two
    // concurrent PATCHes reading the same stale offset must not both reach
    // `append_chunk` before either offset CAS below lands.
    let _guard = state.upload_locks.lock(&id).await;

    let upload = state.store.get_upload(&id).await?.ok_or_else(|| AppError::not_found("upload not found"))?;

    // Pre-write check: per spec §8, a stale offset must leave the temp file untouched.
    if client_offset != upload.byte_offset {
        return Ok(offset_conflict(upload.byte_offset));
    }

    let new_offset = client_offset + body.len() as i64;
    if let Some(declared) = upload.file_size {
        if new_offset > declared {
            return AppError::err(StatusCode::BAD_REQUEST, ErrorCode::InvalidOffset, "PATCH would exceed declared Upload-Length");
        }
    }

    state.stats.upload_started();
    let write_result = append_chunk(&temp_path(&state, &id), &body).await;
    state.stats.upload_finished();
    write_result.map_err(|e| AppError::new500(format!("failed to write temp file: {e}")))?;

    let now = util::now();
    if !state.store.advance_upload_offset(&id, client_offset, new_offset, now).await? {
        // Should be unreachable under the per-id lock above; kept as a second-line
        // guard in case the offset moved between the pre-check and this CAS.
        let current = state.store.get_upload(&id).await?.map(|u| u.byte_offset).unwrap_or(new_offset);
        return Ok(offset_conflict(current));
    }

    let declared_complete = upload.file_size.map(|declared| new_offset >= declared).unwrap_or(false);
    if declared_complete {
        spawn_completion(state.clone(), id.clone());
    }

    let resp = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Upload-Offset", new_offset.to_string())
        .body(axum::body::Body::empty())
        .map_err(|e| AppError::new500(e.to_string()))?;
    Ok(tus_headers(resp))
}

async fn append_chunk(path: &std::path::Path, chunk: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().append(true).create(true).open(path).await?;
    file.write_all(chunk).await?;
    file.flush().await
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    let _guard = state.upload_locks.lock(&id).await;
    let removed = state.store.delete_upload(&id).await?;
    if !removed {
        return Err(AppError::not_found("upload not found"));
    }
    let _ = tokio::fs::remove_file(temp_path(&state, &id)).await;
    Ok(StatusCode::NO_CONTENT)
}

/// The detached completion task (spec §4.F, §9 "Detached completion task").
/// Cleans up the temp file and Upload row on every exit path; never surfaces
/// errors to an HTTP caller since none is still listening.
fn spawn_completion(state: AppState, id: String) {
    tokio::spawn(async move {
        let outcome = tokio::time::timeout(COMPLETION_TIMEOUT, run_completion(&state, &id)).await;
        match outcome {
            Ok(Ok(())) => tracing::info!(upload_id = %id, "resumable upload completed"),
            Ok(Err(e)) => tracing::error!(upload_id = %id, "resumable upload completion failed: {e}"),
            Err(_) => tracing::error!(upload_id = %id, "resumable upload completion timed out"),
        }

        let _guard = state.upload_locks.lock(&id).await;
        let _ = tokio::fs::remove_file(temp_path(&state, &id)).await;
        if let Err(e) = state.store.delete_upload(&id).await {
            tracing::error!(upload_id = %id, "failed to remove upload row after completion: {e}");
        }
    });
}

async fn run_completion(state: &AppState, id: &str) -> anyhow::Result<()> {
    let upload = state
        .store
        .get_upload(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("upload row vanished before completion"))?;

    let bytes = tokio::fs::read(temp_path(state, id)).await?;
    let metadata = upload.metadata.as_deref().map(parse_metadata).unwrap_or_default();

    let fields = RawUploadFields {
        filename: metadata.get("filename").cloned(),
        declared_mime: None,
        description: metadata.get("description").cloned(),
        password: metadata.get("password").cloned(),
        max_downloads: metadata.get("max_downloads").cloned(),
        expires_in: metadata.get("expires_in").cloned(),
    };

    state.stats.upload_started();
    let result = complete_upload(state, bytes::Bytes::from(bytes), fields).await;
    state.stats.upload_finished();

    match result {
        Ok(file) => {
            state.stats.record_upload(file.file_size as u64);
            Ok(())
        }
        Err(e) => {
            state.stats.record_upload_error();
            Err(anyhow::anyhow!(e.to_string()))
        }
    }
}
