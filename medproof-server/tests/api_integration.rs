//! API integration tests for medproof-server.
//!
//! These tests drive the router with realistic multipart requests over the
//! in-memory ledger and content store, covering the register/verify/fetch
//! flow through the REST endpoints.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use medproof_core::{IntegrityService, LocalArchive, MemoryLedger, MemoryStore};
use medproof_server::{create_router, AppState, IDENTITY_HEADER, ROLE_HEADER};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "----TestBoundary7MA4YWxkTrZu0gW";
const CLINICIAN: &str = "0x1111111111111111111111111111111111111111";
const ADMIN: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

struct TestApp {
    router: Router,
    ledger: Arc<MemoryLedger>,
    store: Arc<MemoryStore>,
    _archive: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let archive = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(MemoryStore::new());
        let service = IntegrityService::new(
            ledger.clone(),
            store.clone(),
            LocalArchive::new(archive.path()),
        );
        Self {
            router: create_router(AppState::new(service)),
            ledger,
            store,
            _archive: archive,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn register(&self, file_name: &str, content: &[u8], subject: &str) -> Response {
        let body = MultipartBody::new()
            .file(file_name, content)
            .text("subject_reference", subject)
            .finish();
        self.send(multipart_request("/files", CLINICIAN, "clinician", body))
            .await
    }

    async fn verify(&self, id: u64, content: &[u8], notes: Option<&str>) -> Response {
        let mut body = MultipartBody::new().file("copy.txt", content);
        if let Some(notes) = notes {
            body = body.text("notes", notes);
        }
        self.send(multipart_request(
            &format!("/files/{id}/verify"),
            CLINICIAN,
            "clinician",
            body.finish(),
        ))
        .await
    }
}

/// Helper to build a multipart/form-data body
struct MultipartBody(Vec<u8>);

impl MultipartBody {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn file(mut self, file_name: &str, content: &[u8]) -> Self {
        self.0
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.0.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
                .as_bytes(),
        );
        self.0
            .extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        self.0.extend_from_slice(content);
        self.0.extend_from_slice(b"\r\n");
        self
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.0
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.0.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.0.extend_from_slice(value.as_bytes());
        self.0.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.0
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.0
    }
}

fn multipart_request(uri: &str, identity: &str, role: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(IDENTITY_HEADER, identity)
        .header(ROLE_HEADER, role)
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(IDENTITY_HEADER, CLINICIAN)
        .header(ROLE_HEADER, "clinician")
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_reports_components() {
    let app = TestApp::new();

    let response = app.send(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["ledger"]["healthy"], true);
    assert_eq!(json["store"]["healthy"], true);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_degraded_and_not_ready_when_store_down() {
    let app = TestApp::new();
    app.store.set_available(false);

    let response = app.send(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store"]["healthy"], false);

    let response = app.send(get("/ready")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new();

    let response = app.send(get("/api-docs/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json(response).await;
    assert!(json["paths"]["/files/{id}/verify"].is_object());
}

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
async fn test_register_returns_created_record() {
    let app = TestApp::new();

    let body = MultipartBody::new()
        .file("patient note.txt", b"ok")
        .text("subject_reference", "patient-42")
        .text("metadata", r#"{"ward":"3B"}"#)
        .text("description", "Discharge summary")
        .finish();
    let response = app
        .send(multipart_request("/files", CLINICIAN, "clinician", body))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json(response).await;
    let record = &json["record"];
    assert_eq!(record["id"], 1);
    assert_eq!(record["file_name"], "patient_note.txt");
    assert_eq!(record["file_type"], "txt");
    assert_eq!(record["file_size_bytes"], 2);
    assert_eq!(
        record["fingerprint"],
        "2689367b205c16ce32ed4200942b8b8b1e262dfc70d9bc9fbc77c49699a4f1df"
    );
    assert_eq!(record["uploader"], CLINICIAN);
    assert_eq!(record["subject_reference"], "patient-42");
    assert_eq!(record["metadata"]["ward"], "3B");
    assert_eq!(record["metadata"]["description"], "Discharge summary");
    assert_eq!(record["valid"], true);
    assert_eq!(json["pinned"], true);
}

#[tokio::test]
async fn test_register_rejects_disallowed_extension_before_io() {
    let app = TestApp::new();

    let response = app.register("payload.exe", b"MZ", "patient-42").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["code"], "VALIDATION_ERROR");
    assert_eq!(app.store.put_count(), 0);
    assert_eq!(app.ledger.record_count(), 0);
}

#[tokio::test]
async fn test_register_requires_subject_reference() {
    let app = TestApp::new();

    let body = MultipartBody::new().file("note.txt", b"ok").finish();
    let response = app
        .send(multipart_request("/files", CLINICIAN, "clinician", body))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.ledger.record_count(), 0);
}

#[tokio::test]
async fn test_register_without_actor_headers_is_unauthorized() {
    let app = TestApp::new();

    let body = MultipartBody::new()
        .file("note.txt", b"ok")
        .text("subject_reference", "patient-42")
        .finish();
    let request = Request::builder()
        .method("POST")
        .uri("/files")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_patient_may_not_register() {
    let app = TestApp::new();

    let body = MultipartBody::new()
        .file("note.txt", b"ok")
        .text("subject_reference", "patient-42")
        .finish();
    let response = app
        .send(multipart_request("/files", CLINICIAN, "patient", body))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(response).await["code"], "PERMISSION_DENIED");
    assert_eq!(app.ledger.record_count(), 0);
}

#[tokio::test]
async fn test_register_with_ledger_down_is_service_unavailable() {
    let app = TestApp::new();
    app.ledger.set_available(false);

    let response = app.register("note.txt", b"ok", "patient-42").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(response).await["code"], "LEDGER_UNAVAILABLE");
}

// ============================================================================
// Verification Tests
// ============================================================================

#[tokio::test]
async fn test_verify_match_and_tamper_are_both_logged() {
    let app = TestApp::new();
    assert_eq!(
        app.register("patient_note.txt", b"ok", "patient-42").await.status(),
        StatusCode::CREATED
    );

    let response = app.verify(1, b"ok", Some("routine audit")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let verified = json(response).await;
    assert_eq!(verified["status"], "verified");
    assert_eq!(verified["is_match"], true);
    assert_eq!(verified["logged"], true);
    assert!(verified.get("log_error").is_none());

    let response = app.verify(1, b"ok\0", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tampered = json(response).await;
    assert_eq!(tampered["status"], "tampered");
    assert_eq!(tampered["is_match"], false);
    assert_ne!(
        tampered["presented_fingerprint"],
        tampered["registered_fingerprint"]
    );

    let response = app.send(get("/files/1/verifications")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let history = json(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["is_match"], true);
    assert_eq!(history[0]["notes"], "routine audit");
    assert_eq!(history[1]["is_match"], false);
    assert!(history[1]["notes"]
        .as_str()
        .unwrap()
        .starts_with("Verification performed at"));
}

#[tokio::test]
async fn test_verify_unknown_record_is_not_found() {
    let app = TestApp::new();

    let response = app.verify(7, b"ok", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["code"], "RECORD_NOT_FOUND");
    assert_eq!(app.ledger.log_count(), 0);
}

#[tokio::test]
async fn test_verify_reports_unlogged_outcome() {
    let app = TestApp::new();
    app.register("note.txt", b"ok", "patient-42").await;
    app.ledger.set_reject_appends(true);

    let response = app.verify(1, b"ok", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json(response).await;
    assert_eq!(json["status"], "verified");
    assert_eq!(json["logged"], false);
    assert!(json["log_id"].is_null());
    assert!(json["log_error"].is_string());
}

// ============================================================================
// Record & Content Tests
// ============================================================================

#[tokio::test]
async fn test_get_unknown_record_is_not_found() {
    let app = TestApp::new();

    let response = app.send(get("/files/0")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_from_store() {
    let app = TestApp::new();
    app.register("note.txt", b"ok", "patient-42").await;

    let response = app.send(get("/files/1/content")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-source"], "content_store");
    assert_eq!(response.headers()["x-fingerprint-match"], "true");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"note.txt\""
    );
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn test_content_falls_back_to_archive_when_store_unreachable() {
    let app = TestApp::new();
    app.register("note.txt", b"ok", "patient-42").await;
    app.store.set_available(false);

    let response = app.send(get("/files/1/content")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-source"], "local_archive");
    assert_eq!(response.headers()["x-fingerprint-match"], "true");
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn test_list_by_subject_and_uploader() {
    let app = TestApp::new();
    app.register("a.txt", b"a", "patient-42").await;
    app.register("b.txt", b"b", "patient-7").await;
    app.register("c.txt", b"c", "patient-42").await;

    let response = app.send(get("/subjects/patient-42/files")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let ids: Vec<u64> = json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);

    let response = app
        .send(get(&format!("/uploaders/{CLINICIAN}/files")))
        .await;
    assert_eq!(json(response).await.as_array().unwrap().len(), 3);

    let response = app.send(get("/uploaders/not-an-address/files")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalidate_is_admin_only_and_keeps_record() {
    let app = TestApp::new();
    app.register("note.txt", b"ok", "patient-42").await;

    let invalidate = |identity: &str, role: &str| {
        Request::builder()
            .method("POST")
            .uri("/files/1/invalidate")
            .header(IDENTITY_HEADER, identity)
            .header(ROLE_HEADER, role)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.send(invalidate(CLINICIAN, "clinician")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(invalidate(ADMIN, "admin")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let record = json(app.send(get("/files/1")).await).await;
    assert_eq!(record["valid"], false);

    let outcome = json(app.verify(1, b"ok", None).await).await;
    assert_eq!(outcome["status"], "verified");
    assert_eq!(outcome["record_valid"], false);
}
