//! Unified error type for request handlers, mapped to the public error taxonomy

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// A stable, machine-readable error code as used in HTTP error bodies and logs.
///
/// These strings are part of the public API; do not rename without a good reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    InvalidOffset,
    InvalidLength,
    InvalidMetadata,
    UnsupportedVersion,
    NotFound,
    PasswordRequired,
    InvalidPassword,
    Unauthorized,
    OffsetMismatch,
    AlreadyDeleted,
    FileExpired,
    FileDeleted,
    DownloadLimitReached,
    FileTooLarge,
    WhatsappNotConnected,
    AuthNotConfigured,
    UploadFailed,
    DownloadFailed,
    SaveFailed,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidOffset => "invalid_offset",
            ErrorCode::InvalidLength => "invalid_length",
            ErrorCode::InvalidMetadata => "invalid_metadata",
            ErrorCode::UnsupportedVersion => "unsupported_version",
            ErrorCode::NotFound => "not_found",
            ErrorCode::PasswordRequired => "password_required",
            ErrorCode::InvalidPassword => "invalid_password",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::OffsetMismatch => "offset_mismatch",
            ErrorCode::AlreadyDeleted => "already_deleted",
            ErrorCode::FileExpired => "file_expired",
            ErrorCode::FileDeleted => "file_deleted",
            ErrorCode::DownloadLimitReached => "download_limit_reached",
            ErrorCode::FileTooLarge => "file_too_large",
            ErrorCode::WhatsappNotConnected => "whatsapp_not_connected",
            ErrorCode::AuthNotConfigured => "auth_not_configured",
            ErrorCode::UploadFailed => "upload_failed",
            ErrorCode::DownloadFailed => "download_failed",
            ErrorCode::SaveFailed => "save_failed",
            ErrorCode::Internal => "internal_error",
        }
    }
}

/// Error type returned by fallible request handlers.
///
/// Follows the same shape as a plain status-code-plus-message error, but additionally
/// carries a stable [ErrorCode] and a per-request id so that clients and logs can be
/// correlated. Converts automatically from anyhow::Error (and therefore from any error
/// that implements `std::error::Error`) so handlers can keep using `?`.
#[derive(Debug)]
pub struct AppError {
    pub status_code: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub request_id: Uuid,
}

impl AppError {
    pub fn new(status_code: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code,
            message: message.into(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn err<T>(status_code: StatusCode, code: ErrorCode, message: impl Into<String>) -> Result<T, Self> {
        Err(Self::new(status_code, code, message))
    }

    pub fn new500(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Mirror the teacher's severity split: client errors are warnings, server errors
        // are errors, 404s are too common to bother logging at all.
        if self.status_code.is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                code = self.code.as_str(),
                "{}",
                self.message
            );
        } else if self.status_code.is_client_error() && self.status_code != StatusCode::NOT_FOUND {
            tracing::warn!(
                request_id = %self.request_id,
                code = self.code.as_str(),
                "{}",
                self.message
            );
        }

        let body = ErrorBody {
            error: self.code.as_str(),
            message: &self.message,
            request_id: self.request_id.to_string(),
        };

        (self.status_code, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::new500(err.into().to_string())
    }
}
