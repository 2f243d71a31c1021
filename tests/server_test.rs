// Integration tests for the HTTP build API

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

use appforge::agents::{
    CodeSynthesizer, DynamicValidator, PersistenceDecision, PersistenceDetector, StaticAnalyzer,
};
use appforge::artifacts::{FileSnapshot, FsArtifactStore, SnapshotFile};
use appforge::config::ServerConfig;
use appforge::deploy::DeploymentProvider;
use appforge::forge::{Issue, NamespaceContext, Review, TestResult};
use appforge::server::ForgeServer;
use appforge::session::InMemorySessionStore;
use appforge::{BuildAgents, BuildService, ForgeResult, LoopConfig};

// ── Fakes ───────────────────────────────────────────────────────────────

fn app(body: &str) -> FileSnapshot {
    FileSnapshot::new(vec![SnapshotFile::new(
        "index.html",
        format!(
            "<!DOCTYPE html><html><head><title>t</title></head><body>{}</body></html>",
            body
        ),
    )])
    .unwrap()
}

/// Returns a fixed app; optionally parks `generate` until released
struct StaticSynthesizer {
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl CodeSynthesizer for StaticSynthesizer {
    async fn generate(
        &self,
        task: &str,
        _namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(app(&format!("<p>{}</p>", task.len())))
    }

    async fn fix(
        &self,
        current: &FileSnapshot,
        _blocking: &[Issue],
        _test_errors: &[String],
        _namespace: Option<&NamespaceContext>,
    ) -> ForgeResult<FileSnapshot> {
        Ok(current.clone())
    }
}

struct CleanAnalyzer;

#[async_trait]
impl StaticAnalyzer for CleanAnalyzer {
    async fn review(&self, _snapshot: &FileSnapshot) -> ForgeResult<Review> {
        Ok(Review::clean())
    }
}

struct PassingValidator;

#[async_trait]
impl DynamicValidator for PassingValidator {
    async fn test(&self, _workspace: &Path) -> ForgeResult<TestResult> {
        Ok(TestResult::pass())
    }
}

struct NoPersistence;

#[async_trait]
impl PersistenceDetector for NoPersistence {
    async fn detect(&self, _prompt: &str) -> PersistenceDecision {
        PersistenceDecision::not_needed("static")
    }
}

struct FixedUrlDeployer;

#[async_trait]
impl DeploymentProvider for FixedUrlDeployer {
    async fn deploy(&self, _workspace: &Path) -> ForgeResult<String> {
        Ok("http://preview.test/".to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct TestApp {
    router: axum::Router,
    _workspace: TempDir,
}

fn test_app_with(gate: Option<Arc<Notify>>, body_limit: usize) -> TestApp {
    let workspace = TempDir::new().unwrap();
    let service = BuildService::new(
        BuildAgents {
            synthesizer: Arc::new(StaticSynthesizer { gate }),
            analyzer: Arc::new(CleanAnalyzer),
            validator: Arc::new(PassingValidator),
            detector: Arc::new(NoPersistence),
            provisioner: None,
        },
        Arc::new(FsArtifactStore::new(workspace.path())),
        Arc::new(FixedUrlDeployer),
        Arc::new(InMemorySessionStore::new()),
        LoopConfig::default(),
    );
    let config = ServerConfig {
        body_limit_bytes: body_limit,
        ..ServerConfig::default()
    };
    TestApp {
        router: ForgeServer::new(service, config).router(),
        _workspace: workspace,
    }
}

fn test_app() -> TestApp {
    test_app_with(None, 4 * 1024 * 1024)
}

// ── Helpers ─────────────────────────────────────────────────────────────

async fn send(router: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn wait_for_status(router: &axum::Router, id: &str, wanted: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = send(router, "GET", &format!("/api/status/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == wanted {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {id} never reached {wanted}");
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_requires_prompt() {
    let app = test_app();

    let (status, body) = send(&app.router, "POST", "/api/create", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Prompt is required");

    let (status, _) = send(&app.router, "POST", "/api/create", Some(json!({ "prompt": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_gets_json_error() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/create")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = test_app();
    for (method, uri) in [
        ("GET", "/api/status/nope"),
        ("GET", "/api/versions/nope"),
        ("POST", "/api/stop-preview/nope"),
    ] {
        let (status, body) = send(&app.router, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/iterate/nope",
        Some(json!({ "changeRequest": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_then_poll_until_completed() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/create",
        Some(json!({ "prompt": "todo app", "projectId": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_id"], "demo");
    assert_eq!(body["status"], "started");

    let session = wait_for_status(&app.router, "demo", "completed").await;
    assert_eq!(session["prompt"], "todo app");
    assert_eq!(session["iteration"], 1);
    assert_eq!(session["url"], "http://preview.test/");
    assert_eq!(session["outcome"]["kind"], "accepted");
    assert!(session["logs"].as_array().unwrap().len() > 3);

    // polling is side-effect free
    let (_, again) = send(&app.router, "GET", "/api/status/demo", None).await;
    assert_eq!(again, session);
}

#[tokio::test]
async fn test_create_without_id_uses_timestamp() {
    let app = test_app();
    let (status, body) = send(&app.router, "POST", "/api/create", Some(json!({ "prompt": "todo" }))).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["project_id"].as_str().unwrap();
    assert!(id.parse::<i64>().is_ok(), "{id}");
}

#[tokio::test]
async fn test_iterate_rejected_while_generating_and_duplicate_create() {
    let gate = Arc::new(Notify::new());
    let app = test_app_with(Some(gate.clone()), 4 * 1024 * 1024);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/create",
        Some(json!({ "prompt": "todo", "projectId": "slow" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/iterate/slow",
        Some(json!({ "changeRequest": "dark mode" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("generating"));

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/create",
        Some(json!({ "prompt": "again", "projectId": "slow" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    gate.notify_one();
    wait_for_status(&app.router, "slow", "completed").await;
}

#[tokio::test]
async fn test_iterate_and_versions() {
    let app = test_app();
    send(
        &app.router,
        "POST",
        "/api/create",
        Some(json!({ "prompt": "todo app", "projectId": "demo" })),
    )
    .await;
    wait_for_status(&app.router, "demo", "completed").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/iterate/demo",
        Some(json!({ "changeRequest": "add dark mode" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "iterating");

    let session = wait_for_status(&app.router, "demo", "completed").await;
    let logs: Vec<&str> = session["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["message"].as_str().unwrap())
        .collect();
    assert!(logs.iter().any(|l| l.contains("New iteration: add dark mode")));

    let (status, body) = send(&app.router, "GET", "/api/versions/demo", None).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["Initial generation", "Iteration: add dark mode"]);
}

#[tokio::test]
async fn test_stop_preview_without_local_preview() {
    let app = test_app();
    send(
        &app.router,
        "POST",
        "/api/create",
        Some(json!({ "prompt": "todo app", "projectId": "demo" })),
    )
    .await;
    wait_for_status(&app.router, "demo", "completed").await;

    let (status, body) = send(&app.router, "POST", "/api/stop-preview/demo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], false);
    assert_eq!(body["message"], "No local preview running");
}

#[tokio::test]
async fn test_body_limit() {
    let app = test_app_with(None, 1024);
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/create",
        Some(json!({ "prompt": "x".repeat(4096) })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_cors_is_permissive() {
    let app = test_app();
    let request = Request::builder()
        .uri("/health")
        .header("origin", "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
