//! Public file metadata, admin listing, and admin delete (spec §6.1).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::handlers::admin::AdminSession;
use crate::state::AppState;
use crate::store::files::File;

/// The subset of a File row safe to expose publicly — never `password_hash`
/// or the upstream handle quadruple.
#[derive(Debug, Serialize)]
pub struct FileView {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub file_size: i64,
    pub description: Option<String>,
    pub has_password: bool,
    pub max_downloads: Option<i64>,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
}

impl From<File> for FileView {
    fn from(f: File) -> Self {
        Self {
            id: f.id,
            filename: f.filename,
            mime_type: f.mime_type,
            file_size: f.file_size,
            description: f.description,
            has_password: f.password_hash.is_some(),
            max_downloads: f.max_downloads,
            download_count: f.download_count,
            created_at: f.created_at,
            expires_at: f.expires_at,
            status: f.status,
        }
    }
}

pub async fn get_file_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileView>, AppError> {
    let file = state
        .store
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::not_found("file not found"))?;

    Ok(Json(file.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_files(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<FileView>>, AppError> {
    let limit = q.limit.clamp(1, 500);
    let offset = q.offset.max(0);
    let files = state.store.list_files(limit, offset).await?;
    Ok(Json(files.into_iter().map(FileView::from).collect()))
}

pub async fn delete_file(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let file = state
        .store
        .get_file(&id)
        .await?
        .ok_or_else(|| AppError::not_found("file not found"))?;

    if file.status == "deleted" {
        return AppError::err(StatusCode::CONFLICT, ErrorCode::AlreadyDeleted, "file already deleted");
    }

    state.store.soft_delete_file(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
