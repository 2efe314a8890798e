//! One-shot multipart upload (spec §4.E). Grounded in the teacher's
//! `upload::upload_endpoint` field-loop shape, generalized to plaintext
//! bytes (the upstream handles encryption) plus the policy fields this
//! server adds: description, password, max_downloads, expires_in.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;

use crate::error::{AppError, ErrorCode};
use crate::handlers::completion::{complete_upload, CompletionError, RawUploadFields};
use crate::handlers::files::FileView;
use crate::state::AppState;

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        match e {
            CompletionError::InvalidField(f) => AppError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, format!("invalid field: {f}")),
            CompletionError::UpstreamNotConnected => AppError::new(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::WhatsappNotConnected, "upstream not connected"),
            CompletionError::UpstreamFailed(m) => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::UploadFailed, m),
            CompletionError::SaveFailed(m) => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::SaveFailed, m),
        }
    }
}

pub async fn upload_simple(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileView>), AppError> {
    // (1) verify upstream connected before doing any work.
    if !state.gateway.is_connected() {
        return AppError::err(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::WhatsappNotConnected, "upstream not connected");
    }

    let mut fields = RawUploadFields::default();
    let mut file_bytes: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, e.to_string()))? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                fields.filename = field.file_name().map(|s| s.to_string());
                fields.declared_mime = field.content_type().map(|s| s.to_string());
                let bytes = field.bytes().await.map_err(|e| AppError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, e.to_string()))?;
                if bytes.len() as u64 > state.config.max_upload_size {
                    state.stats.record_upload_error();
                    return AppError::err(StatusCode::PAYLOAD_TOO_LARGE, ErrorCode::FileTooLarge, "file exceeds configured maximum upload size");
                }
                file_bytes = Some(bytes);
            }
            "description" => fields.description = Some(text(field).await?),
            "password" => fields.password = Some(text(field).await?),
            "max_downloads" => fields.max_downloads = Some(text(field).await?),
            "expires_in" => fields.expires_in = Some(text(field).await?),
            _ => {}
        }
    }

    let Some(bytes) = file_bytes else {
        return AppError::err(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, "missing \"file\" field");
    };

    state.stats.upload_started();
    let byte_len = bytes.len() as u64;
    let result = complete_upload(&state, bytes, fields).await;
    state.stats.upload_finished();

    match result {
        Ok(file) => {
            state.stats.record_upload(byte_len);
            Ok((StatusCode::CREATED, Json(file.into())))
        }
        Err(e) => {
            state.stats.record_upload_error();
            Err(e.into())
        }
    }
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, e.to_string()))
}
