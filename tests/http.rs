mod support;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, SERVER},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use streamsnap::{
    application::{
        intercept::Intercept,
        pipeline::{RunMode, StreamingPipeline},
        readiness::{ActiveVersion, ReadinessGate},
        storage::StorageBackend,
    },
    infra::{
        http::{
            ASSET_CACHE_CONTROL, HttpState, SERVER_IDENT, SNAPSHOT_CACHE_CONTROL, build_router,
        },
        storage::{FsStorage, MemoryStorage},
    },
};
use support::{pipeline, read_stored, ready_gate, renderer};
use tempfile::TempDir;
use tower::ServiceExt;

fn app(gate: ReadinessGate, mode: RunMode) -> Router {
    router(&pipeline(gate, mode))
}

fn router(pipeline: &StreamingPipeline) -> Router {
    build_router(HttpState::new(pipeline.clone()))
}

async fn send(app: &Router, method: Method, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn readiness_probe_tracks_the_gate() {
    let gate = ReadinessGate::pending();
    let app = app(gate.clone(), RunMode::Development);

    let pending = send(&app, Method::GET, "/_health/ready").await;
    assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(pending.headers()[SERVER], SERVER_IDENT);

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    gate.publish(renderer(), storage);

    let ready = send(&app, Method::GET, "/_health/ready").await;
    assert_eq!(ready.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn renders_root_as_streamed_html_and_stores_it() {
    let storage = Arc::new(MemoryStorage::new());
    let pipeline = pipeline(ready_gate(storage.clone()), RunMode::Development);
    let app = router(&pipeline);

    let response = send(&app, Method::GET, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(response.headers()[SERVER], SERVER_IDENT);
    let html = body_text(response).await;
    assert!(html.contains(r#"<section class="recommend">"#));
    assert!(html.contains(r#"<script src="/app.3f2a.js" defer></script>"#));
    pipeline.flush_snapshots().await;
    assert_eq!(read_stored(storage.as_ref(), "static/home.html").await, html);
}

#[tokio::test]
async fn development_answers_repeat_requests_from_the_snapshot() {
    let storage = Arc::new(MemoryStorage::new());
    let pipeline = pipeline(ready_gate(storage.clone()), RunMode::Development);
    let app = router(&pipeline);

    let first = body_text(send(&app, Method::GET, "/all").await).await;
    pipeline.flush_snapshots().await;
    storage
        .write("static/all.html", Bytes::from_static(b"<p>cached all</p>"))
        .await
        .expect("overwrite snapshot");

    let second = send(&app, Method::GET, "/all").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(body_text(second).await, "<p>cached all</p>");
    assert_ne!(first, "<p>cached all</p>");
}

#[tokio::test]
async fn assets_are_served_from_storage() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .write("app.3f2a.js", Bytes::from_static(b"console.log(1)"))
        .await
        .expect("seed asset");
    let app = app(ready_gate(storage), RunMode::Development);

    let response = send(&app, Method::GET, "/app.3f2a.js").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], ASSET_CACHE_CONTROL);
    assert_eq!(response.headers()[CONTENT_LENGTH], "14");
    assert!(
        response.headers()[CONTENT_TYPE]
            .to_str()
            .expect("content type")
            .contains("javascript")
    );
    assert_eq!(body_text(response).await, "console.log(1)");

    let missing = send(&app, Method::GET, "/missing.9f9f.js").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn production_snapshots_go_through_the_static_stage() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("static")).expect("mkdir");
    std::fs::write(dir.path().join("static/home.html"), "<p>home</p>").expect("seed");
    let storage = Arc::new(FsStorage::new(dir.path().to_path_buf()).expect("storage"));
    let app = app(ready_gate(storage), RunMode::Production);

    let response = send(&app, Method::GET, "/?utm=feed").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], SNAPSHOT_CACHE_CONTROL);
    assert_eq!(response.headers()[CONTENT_LENGTH], "11");
    assert!(
        response.headers()[CONTENT_TYPE]
            .to_str()
            .expect("content type")
            .starts_with("text/html")
    );
    assert_eq!(body_text(response).await, "<p>home</p>");
}

#[tokio::test]
async fn dynamic_routes_render_without_storing() {
    let storage = Arc::new(MemoryStorage::new());
    let app = app(ready_gate(storage.clone()), RunMode::Production);

    let response = send(&app, Method::GET, "/album/42").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(r#"<section class="album">42</section>"#));
    assert_eq!(storage.file_count(), 0);
}

#[tokio::test]
async fn rejects_non_read_methods() {
    let storage = Arc::new(MemoryStorage::new());
    let app = app(ready_gate(storage.clone()), RunMode::Development);

    let response = send(&app, Method::POST, "/").await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(storage.file_count(), 0);
}

/// Claims a single path and leaves everything else to the pipeline.
struct Maintenance;

#[async_trait]
impl Intercept for Maintenance {
    async fn intercept(&self, _version: &ActiveVersion, path: &str) -> Option<Response> {
        (path == "/all")
            .then(|| (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance").into_response())
    }
}

#[tokio::test]
async fn custom_intercepts_bypass_rendering() {
    let storage = Arc::new(MemoryStorage::new());
    let state = HttpState::new(pipeline(ready_gate(storage.clone()), RunMode::Development))
        .with_intercept(Arc::new(Maintenance));
    let app = build_router(state);

    let claimed = send(&app, Method::GET, "/all").await;
    assert_eq!(claimed.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(claimed.headers()[SERVER], SERVER_IDENT);
    assert_eq!(body_text(claimed).await, "down for maintenance");
    assert!(!storage.exists("static/all.html").await.expect("exists"));

    let passed = send(&app, Method::GET, "/").await;
    assert_eq!(passed.status(), StatusCode::OK);
}
