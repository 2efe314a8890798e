//! Shared completion pipeline used by both the simple and resumable upload
//! handlers: hash, sniff, classify, call the gateway, persist the File row.
//! Grounded in the teacher's `upload::upload_endpoint` body (spec §4.E step
//! 6-10, reused verbatim by §4.F's detached completion step per spec §4.F).

use bytes::Bytes;
use chrono::Duration as ChronoDuration;
use sha2::{Digest, Sha256};

use crate::gateway::{GatewayError, MediaKind};
use crate::short_id;
use crate::state::AppState;
use crate::store::files::{File, NewFile, UpstreamHandle};
use crate::util;

const MAX_ID_RETRIES: u32 = 8;

#[derive(Debug)]
pub enum CompletionError {
    InvalidField(String),
    UpstreamNotConnected,
    UpstreamFailed(String),
    SaveFailed(String),
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionError::InvalidField(m) => write!(f, "invalid field: {m}"),
            CompletionError::UpstreamNotConnected => write!(f, "upstream not connected"),
            CompletionError::UpstreamFailed(m) => write!(f, "upstream upload failed: {m}"),
            CompletionError::SaveFailed(m) => write!(f, "save failed: {m}"),
        }
    }
}

/// The raw, unparsed optional fields shared by both upload entry points.
/// Parsing happens once, here, so the validation rules are identical for
/// the simple and resumable paths (spec §4.F: "the same rules as §4.E").
#[derive(Debug, Default)]
pub struct RawUploadFields {
    pub filename: Option<String>,
    pub declared_mime: Option<String>,
    pub description: Option<String>,
    pub password: Option<String>,
    pub max_downloads: Option<String>,
    pub expires_in: Option<String>,
}

fn parse_max_downloads(raw: &Option<String>) -> Result<Option<i64>, CompletionError> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CompletionError::InvalidField("max_downloads".into()))
            .and_then(|v| {
                if v > 0 {
                    Ok(Some(v))
                } else {
                    Err(CompletionError::InvalidField("max_downloads".into()))
                }
            }),
    }
}

fn parse_expires_in(raw: &Option<String>) -> Result<Option<i64>, CompletionError> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CompletionError::InvalidField("expires_in".into()))
            .map(Some),
    }
}

/// Run the shared completion pipeline: sha256, mime sniff, classify, upload to
/// the gateway, generate a short id (retrying on collision), persist the File.
pub async fn complete_upload(
    state: &AppState,
    bytes: Bytes,
    fields: RawUploadFields,
) -> Result<File, CompletionError> {
    let max_downloads = parse_max_downloads(&fields.max_downloads)?;
    let expires_in = parse_expires_in(&fields.expires_in)?;
    let password_hash = match &fields.password {
        Some(p) if !p.is_empty() => Some(
            bcrypt::hash(p, bcrypt::DEFAULT_COST)
                .map_err(|e| CompletionError::InvalidField(format!("password: {e}")))?,
        ),
        _ => None,
    };

    let filename = util::sanitize_filename(fields.filename.as_deref().unwrap_or(""));
    let file_hash = hex::encode(Sha256::digest(&bytes));
    let mime_type = util::detect_mime_type(&bytes, fields.declared_mime.as_deref());
    let kind = MediaKind::from_mime(&mime_type);
    let file_size = bytes.len() as i64;

    let handle = state.gateway.upload(bytes, kind).await.map_err(|e| match e {
        GatewayError::NotConnected | GatewayError::NotLoggedIn => CompletionError::UpstreamNotConnected,
        other => CompletionError::UpstreamFailed(other.to_string()),
    })?;

    let now = util::now();
    let expires_at = now + ChronoDuration::days(state.config.clamp_expiry_days(expires_in));

    let mut last_err = None;
    for _ in 0..MAX_ID_RETRIES {
        let id = short_id::generate_file_id(state.config.short_id_length);
        let new_file = NewFile {
            id: id.clone(),
            filename: filename.clone(),
            mime_type: mime_type.clone(),
            file_size,
            file_hash: file_hash.clone(),
            handle: UpstreamHandle {
                direct_path: handle.direct_path.clone(),
                media_key: handle.media_key.clone(),
                file_enc_hash: handle.file_enc_hash.clone(),
                file_sha256: handle.file_sha256.clone(),
            },
            description: fields.description.clone(),
            password_hash: password_hash.clone(),
            max_downloads,
            created_at: now,
            expires_at,
        };

        match state.store.create_file(new_file).await {
            Ok(()) => {
                return state
                    .store
                    .get_file(&id)
                    .await
                    .map_err(|e| CompletionError::SaveFailed(e.to_string()))?
                    .ok_or_else(|| CompletionError::SaveFailed("file vanished immediately after insert".into()));
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                last_err = Some("short id collision".to_string());
                continue;
            }
            Err(e) => return Err(CompletionError::SaveFailed(e.to_string())),
        }
    }

    Err(CompletionError::SaveFailed(
        last_err.unwrap_or_else(|| "exhausted id retries".into()),
    ))
}
