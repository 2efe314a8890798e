//! End-to-end handler tests driven through the real axum [Router] via
//! `tower::ServiceExt::oneshot`, against an in-memory sqlite pool and the
//! in-memory [FakeGateway] test double — no live upstream required.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use relaydrop::gateway::fake::FakeGateway;
use relaydrop::gateway::MediaGateway;
use relaydrop::state::AppState;
use relaydrop::store::files::{NewFile, UpstreamHandle};
use relaydrop::store::Store;
use relaydrop::{admin_session::AdminSessionStore, config::AppConfig, handlers, stats::Stats};
use std::sync::Arc;
use tower::ServiceExt;

fn test_config(temp_dir: String) -> AppConfig {
    AppConfig {
        host: "0.0.0.0".into(),
        port: 0,
        database_path: ":memory:".into(),
        wa_session_path: ":memory:".into(),
        temp_dir,
        max_upload_size: 10 * 1024 * 1024,
        default_expiry_days: 30,
        max_expiry_days: 30,
        short_id_length: 6,
        admin_password: Some("hunter2".to_string()),
        admin_session_secret: "test-secret".into(),
        admin_session_max_age: 3600,
        shutdown_timeout_secs: 5,
        log_level: tracing::Level::ERROR,
    }
}

async fn test_state() -> AppState {
    let temp_dir = std::env::temp_dir().join(format!("relaydrop-test-{}", relaydrop::short_id::generate(12)));
    tokio::fs::create_dir_all(&temp_dir).await.unwrap();

    let store = Store::open_in_memory().await.unwrap();
    let gateway: Arc<dyn relaydrop::gateway::MediaGateway> = Arc::new(FakeGateway::new_connected());

    AppState {
        store,
        gateway,
        stats: Arc::new(Stats::new()),
        config: Arc::new(test_config(temp_dir.to_string_lossy().to_string())),
        admin_sessions: Arc::new(AdminSessionStore::new(3600)),
        upload_locks: Arc::new(relaydrop::upload_locks::UploadLockRegistry::new()),
        shutdown: tokio_util::sync::CancellationToken::new(),
    }
}

fn multipart_body(boundary: &str, fields: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content_type, bytes) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n").as_bytes()),
            None => body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes()),
        }
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn simple_upload_then_download_round_trips() {
    let state = test_state().await;
    let app = handlers::router(state);

    let boundary = "X-TEST-BOUNDARY";
    let body = multipart_body(boundary, &[("file", Some("hello.txt"), Some("text/plain"), b"hello world")]);

    let upload_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/files")
                .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(upload_resp.status(), StatusCode::CREATED);
    let created = body_json(upload_resp).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["filename"], "hello.txt");

    let download_resp = app
        .oneshot(Request::builder().uri(format!("/api/files/{id}/download")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(download_resp.status(), StatusCode::OK);
    let bytes = download_resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello world");
}

#[tokio::test]
async fn upload_rejects_oversized_file() {
    let mut state = test_state().await;
    state.config = Arc::new(AppConfig { max_upload_size: 4, ..(*state.config).clone() });
    let app = handlers::router(state);

    let boundary = "B";
    let body = multipart_body(boundary, &[("file", Some("big.bin"), None, b"way more than four bytes")]);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/files")
                .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn download_enforces_password_gate_and_logs_failures() {
    let state = test_state().await;
    let store = state.store.clone();
    let app = handlers::router(state);

    let boundary = "B";
    let body = multipart_body(
        boundary,
        &[("file", Some("secret.txt"), None, b"top secret"), ("password", None, None, b"swordfish")],
    );
    let upload_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/files")
                .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let created = body_json(upload_resp).await;
    let id = created["id"].as_str().unwrap().to_string();

    // Missing password.
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(format!("/api/files/{id}/download")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Wrong password.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/files/{id}/download"))
                .header("X-Password", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.count_access_log_for_file(&id).await.unwrap(), 1);

    // Correct password.
    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/files/{id}/download"))
                .header("X-Password", "swordfish")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn download_cap_is_enforced_atomically() {
    let state = test_state().await;
    let store = state.store.clone();
    let now = relaydrop::util::now();

    let uploaded = state
        .gateway
        .upload(bytes::Bytes::from_static(b"cap"), relaydrop::gateway::MediaKind::Document)
        .await
        .unwrap();
    store
        .create_file(NewFile {
            id: "capfile".into(),
            filename: "f.bin".into(),
            mime_type: "application/octet-stream".into(),
            file_size: 3,
            file_hash: "abc".into(),
            handle: UpstreamHandle {
                direct_path: uploaded.direct_path,
                media_key: uploaded.media_key,
                file_enc_hash: uploaded.file_enc_hash,
                file_sha256: uploaded.file_sha256,
            },
            description: None,
            password_hash: None,
            max_downloads: Some(2),
            created_at: now,
            expires_at: now + chrono::Duration::days(1),
        })
        .await
        .unwrap();

    let app = handlers::router(state);

    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/api/files/capfile/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .oneshot(Request::builder().uri("/api/files/capfile/download").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GONE);
}

#[tokio::test]
async fn expired_file_returns_gone() {
    let state = test_state().await;
    let store = state.store.clone();
    let now = relaydrop::util::now();
    store
        .create_file(NewFile {
            id: "oldfile".into(),
            filename: "f.bin".into(),
            mime_type: "application/octet-stream".into(),
            file_size: 3,
            file_hash: "abc".into(),
            handle: UpstreamHandle { direct_path: b"p".to_vec(), media_key: b"k".to_vec(), file_enc_hash: b"e".to_vec(), file_sha256: None },
            description: None,
            password_hash: None,
            max_downloads: None,
            created_at: now - chrono::Duration::days(40),
            expires_at: now - chrono::Duration::days(10),
        })
        .await
        .unwrap();

    let app = handlers::router(state);
    let resp = app
        .oneshot(Request::builder().uri("/api/files/oldfile/download").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GONE);
}

#[tokio::test]
async fn resumable_upload_patch_rejects_stale_offset_without_touching_temp_file() {
    let state = test_state().await;
    let temp_dir = state.config.temp_dir.clone();
    let app = handlers::router(state);

    let create_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Length", "11")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_resp.status(), StatusCode::CREATED);
    let location = create_resp.headers().get("Location").unwrap().to_str().unwrap().to_string();
    let id = location.rsplit('/').next().unwrap().to_string();

    let temp_path = std::path::Path::new(&temp_dir).join(format!("{id}.tmp"));
    let before = tokio::fs::read(&temp_path).await.unwrap();
    assert!(before.is_empty());

    // Wrong offset: server expects 0.
    let resp = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/upload/{id}"))
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", "5")
                .header("Content-Type", "application/offset+octet-stream")
                .body(Body::from(b"hello".to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let after = tokio::fs::read(&temp_path).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn resumable_upload_completes_across_two_chunks() {
    let state = test_state().await;
    let store = state.store.clone();
    let app = handlers::router(state);

    let payload = b"hello world";
    let create_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Length", payload.len().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = create_resp.headers().get("Location").unwrap().to_str().unwrap().to_string();
    let id = location.rsplit('/').next().unwrap().to_string();

    let resp1 = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/upload/{id}"))
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", "0")
                .header("Content-Type", "application/offset+octet-stream")
                .body(Body::from(payload[..5].to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp1.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp1.headers().get("Upload-Offset").unwrap(), "5");

    let resp2 = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/upload/{id}"))
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", "5")
                .header("Content-Type", "application/offset+octet-stream")
                .body(Body::from(payload[5..].to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp2.status(), StatusCode::NO_CONTENT);

    // Completion is detached; poll briefly for the File row to land.
    let mut found = false;
    for _ in 0..50 {
        if !store.list_files(10, 0).await.unwrap().is_empty() {
            found = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(found, "completion task did not persist a File row in time");
}

#[tokio::test]
async fn resumable_upload_concurrent_patches_at_same_offset_serialize() {
    let state = test_state().await;
    let temp_dir = state.config.temp_dir.clone();
    let app = handlers::router(state);

    let create_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Length", "10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = create_resp.headers().get("Location").unwrap().to_str().unwrap().to_string();
    let id = location.rsplit('/').next().unwrap().to_string();

    let build_patch = |app: axum::Router, body: &'static [u8]| {
        app.oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/upload/{id}"))
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", "0")
                .header("Content-Type", "application/offset+octet-stream")
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
    };

    // Two clients racing a retry of the same PATCH: both read offset 0 at the
    // HTTP layer, but the per-upload-id lock must keep their read-check-write
    // sequences from interleaving, so only one chunk ever lands on disk.
    let (resp_a, resp_b) = tokio::join!(build_patch(app.clone(), b"AAAAA"), build_patch(app.clone(), b"BBBBB"));

    let statuses = [resp_a.unwrap().status(), resp_b.unwrap().status()];
    let ok_count = statuses.iter().filter(|s| **s == StatusCode::NO_CONTENT).count();
    let conflict_count = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!(ok_count, 1, "exactly one concurrent PATCH at the same offset should succeed");
    assert_eq!(conflict_count, 1, "the loser must see a 409, not a silent double-append");

    let temp_path = std::path::Path::new(&temp_dir).join(format!("{id}.tmp"));
    let contents = tokio::fs::read(&temp_path).await.unwrap();
    assert_eq!(contents.len(), 5, "temp file must contain exactly the winning chunk, never both");
    assert!(contents == b"AAAAA" || contents == b"BBBBB");
}

#[tokio::test]
async fn admin_routes_require_login() {
    let state = test_state().await;
    let app = handlers::router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/api/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let login_resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/login")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"password":"hunter2"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login_resp.status(), StatusCode::OK);
    assert!(login_resp.headers().get("set-cookie").is_some());
}

#[tokio::test]
async fn admin_login_rejects_wrong_password() {
    let state = test_state().await;
    let app = handlers::router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/login")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"password":"nope"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_and_status_are_public() {
    let state = test_state().await;
    let app = handlers::router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
