//! Library crate backing the `relaydrop` binary, split out so integration
//! tests can drive the full axum [Router] via `tower::ServiceExt::oneshot`
//! without a live process.

pub mod admin_session;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod janitor;
pub mod short_id;
pub mod state;
pub mod stats;
pub mod store;
pub mod upload_locks;
pub mod util;
