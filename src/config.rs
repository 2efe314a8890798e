//! Environment-driven application configuration, read once at boot

use std::env;

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use tracing::Level;

/// Global configuration for the entire application, populated from environment
/// variables at startup. See the table in the crate's README for the full list
/// of recognized variables and their defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub wa_session_path: String,
    pub temp_dir: String,
    pub max_upload_size: u64,
    pub default_expiry_days: i64,
    pub max_expiry_days: i64,
    pub short_id_length: usize,
    pub admin_password: Option<String>,
    pub admin_session_secret: String,
    pub admin_session_max_age: i64,
    pub shutdown_timeout_secs: u64,
    pub log_level: Level,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Generate a random session-signing secret when `ADMIN_SESSION_SECRET` is absent.
///
/// Acceptable for single-instance deployments (sessions simply invalidate on
/// restart); it must never silently fail, since a broken RNG here is fatal per
/// the error-handling design (§7: "session-secret RNG failure" is fatal).
fn generate_session_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

impl AppConfig {
    /// Build configuration from the process environment.
    ///
    /// Never fails on missing optional values (those fall back to documented
    /// defaults); `ADMIN_PASSWORD` is the only variable allowed to be absent
    /// while still producing a valid, if admin-disabled, configuration.
    pub fn from_env() -> Self {
        let log_level = match env_string("LOG_LEVEL", "INFO").to_uppercase().as_str() {
            "ERROR" => Level::ERROR,
            "WARN" => Level::WARN,
            "DEBUG" => Level::DEBUG,
            "TRACE" => Level::TRACE,
            _ => Level::INFO,
        };

        Self {
            host: env_string("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 3000u16),
            database_path: env_string("DATABASE_PATH", "./data/relaydrop.db"),
            wa_session_path: env_string("WA_SESSION_PATH", "./data/session.db"),
            temp_dir: env_string("TEMP_DIR", "./data/tmp"),
            max_upload_size: env_parsed("MAX_UPLOAD_SIZE", 2 * 1024 * 1024 * 1024u64),
            default_expiry_days: env_parsed("DEFAULT_EXPIRY_DAYS", 30i64),
            max_expiry_days: env_parsed("MAX_EXPIRY_DAYS", 30i64),
            short_id_length: env_parsed("SHORT_ID_LENGTH", 6usize),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
            admin_session_secret: env::var("ADMIN_SESSION_SECRET")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(generate_session_secret),
            admin_session_max_age: env_parsed("ADMIN_SESSION_MAX_AGE", 86_400i64),
            shutdown_timeout_secs: env_parsed("SHUTDOWN_TIMEOUT", 300u64),
            log_level,
        }
    }

    pub fn admin_enabled(&self) -> bool {
        self.admin_password.is_some()
    }

    /// Clamp a client-requested expiry in seconds to `[1 day, max_expiry_days]`,
    /// defaulting to `default_expiry_days` when unset, per spec §4.E / §9 Open Question 2.
    pub fn clamp_expiry_days(&self, expires_in_secs: Option<i64>) -> i64 {
        match expires_in_secs {
            None => self.default_expiry_days,
            Some(secs) => {
                // Sub-day values round *up* to a day rather than being rejected or
                // truncated to zero; see DESIGN.md for this Open Question resolution.
                let days = (secs.max(0) + 86_399) / 86_400;
                days.clamp(1, self.max_expiry_days)
            }
        }
    }
}
