//! Admin session issuance and protected admin routes (spec §6.1).
//!
//! Grounded in the teacher's `admin::admin_login`/`admin_logout` (random
//! session token, constant-time password compare, http-only/secure/strict
//! cookie) generalized from the teacher's argon2-hashed admin password
//! verification to a constant-time byte comparison against the configured
//! plaintext (spec §6.1 calls for "constant-time comparison against
//! configured admin password", not a stored hash — there is only ever one
//! admin password, read fresh from the environment at boot).

use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::{AppError, ErrorCode};
use crate::gateway::QrInfo;
use crate::state::AppState;
use crate::stats::StatsSnapshot;
use crate::store::stats::{StatsDailyRow, StatsHourlyRow};

pub const SESSION_COOKIE: &str = "admin_session";

/// Extractor guarding every protected admin route. Resolves to 503
/// `auth_not_configured` when no admin password is set, and 401
/// `unauthorized` when the cookie is missing, unknown, or expired.
pub struct AdminSession;

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.config.admin_enabled() {
            return AppError::err(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::AuthNotConfigured, "admin auth not configured");
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "missing session cookie"))?;

        if state.admin_sessions.validate(&token).await {
            Ok(AdminSession)
        } else {
            Err(AppError::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "invalid or expired session"))
        }
    }
}

fn session_cookie(token: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(cookie::time::Duration::seconds(max_age_secs))
        .build()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, StatusCode), AppError> {
    let Some(configured) = &state.config.admin_password else {
        return AppError::err(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::AuthNotConfigured, "admin auth not configured");
    };

    let matches: bool = configured.as_bytes().ct_eq(req.password.as_bytes()).into();
    if !matches {
        return AppError::err(StatusCode::UNAUTHORIZED, ErrorCode::InvalidPassword, "incorrect admin password");
    }

    let token = state.admin_sessions.issue().await;
    let jar = jar.add(session_cookie(token, state.config.admin_session_max_age));
    Ok((jar, StatusCode::OK))
}

/// Clears the cookie unconditionally; does not require (or check) a valid session.
pub async fn logout_session(jar: CookieJar) -> (CookieJar, StatusCode) {
    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    (jar, StatusCode::NO_CONTENT)
}

/// Protected: revokes the session server-side, then clears the cookie.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    _admin: AdminSession,
) -> (CookieJar, StatusCode) {
    if let Some(c) = jar.get(SESSION_COOKIE) {
        state.admin_sessions.revoke(c.value()).await;
    }
    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    (jar, StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct AdminStatus {
    pub connected: bool,
    pub logged_in: bool,
}

pub async fn status(State(state): State<AppState>, _admin: AdminSession) -> Json<AdminStatus> {
    Json(AdminStatus {
        connected: state.gateway.is_connected(),
        logged_in: state.gateway.is_logged_in(),
    })
}

pub async fn qr(State(state): State<AppState>, _admin: AdminSession) -> Result<Json<QrSerde>, AppError> {
    let info = state.gateway.get_qr().await.map_err(|e| AppError::new500(e.to_string()))?;
    Ok(Json(QrSerde::from(info)))
}

#[derive(Debug, Serialize)]
pub struct QrSerde {
    code: String,
    png_base64: String,
    timeout_secs: u64,
}

impl From<QrInfo> for QrSerde {
    fn from(q: QrInfo) -> Self {
        Self { code: q.code, png_base64: q.png_base64, timeout_secs: q.timeout_secs }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsOverview {
    pub current: StatsSnapshot,
}

pub async fn stats_overview(State(state): State<AppState>, _admin: AdminSession) -> Json<StatsOverview> {
    Json(StatsOverview { current: state.stats.snapshot() })
}

#[derive(Debug, Deserialize)]
pub struct HourlyQuery {
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_hours() -> i64 {
    24
}

pub async fn stats_hourly(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(q): Query<HourlyQuery>,
) -> Result<Json<Vec<StatsHourlyRow>>, AppError> {
    let hours = q.hours.clamp(1, 168);
    let since = Utc::now() - ChronoDuration::hours(hours);
    Ok(Json(state.store.get_hourly(since).await?))
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

pub async fn stats_daily(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(q): Query<DailyQuery>,
) -> Result<Json<Vec<StatsDailyRow>>, AppError> {
    let days = q.days.clamp(1, 365);
    let since = Utc::now() - ChronoDuration::days(days);
    Ok(Json(state.store.get_daily(since).await?))
}
