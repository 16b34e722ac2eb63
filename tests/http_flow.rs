use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use httpmock::{Method::POST, Mock, MockServer};
use rustyscribe::{
    api::create_router,
    backend::{Backend, MemoryBackend},
    datauri,
    genai::GeminiClient,
    pdf,
    service::ScribeService,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const MODEL_PATH: &str = "/v1beta/models/test-model:generateContent";
const BOUNDARY: &str = "scribe-test-boundary";
const BODY_LIMIT: usize = 64 * 1024 * 1024;

struct Harness {
    app: Router,
    model: MockServer,
    token: String,
}

impl Harness {
    async fn new() -> Self {
        let model = MockServer::start_async().await;
        let genai = Arc::new(GeminiClient::new(
            model.base_url(),
            "test-model".into(),
            "secret".into(),
            5,
        ));
        let backend = Backend::in_memory(Arc::new(MemoryBackend::new()));
        let service = Arc::new(ScribeService::new(genai, backend));
        let app = create_router(service, BODY_LIMIT);

        let (status, auth) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/signup",
                None,
                json!({ "email": "grace@example.com", "password": "hopper1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = auth["id_token"].as_str().expect("id token").to_string();

        Self { app, model, token }
    }

    async fn reply_with(&self, payload: Value) -> Mock<'_> {
        self.model
            .mock_async(|when, then| {
                when.method(POST).path(MODEL_PATH);
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": payload.to_string() }], "role": "model" },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await
    }

    async fn upload(&self, name: &str, mime: &str, bytes: &[u8]) -> Value {
        self.upload_to("/files?wait=true", name, mime, bytes).await
    }

    async fn upload_to(&self, uri: &str, name: &str, mime: &str, bytes: &[u8]) -> Value {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .body(Body::from(multipart_body(name, mime, bytes)))
            .expect("request");
        let (status, report) = send(&self.app, request).await;
        assert_eq!(status, StatusCode::OK, "upload failed: {report}");
        report
    }

    async fn call(&self, method: Method, uri: &str, payload: Value) -> (StatusCode, Value) {
        send(&self.app, json_request(method, uri, Some(&self.token), payload)).await
    }

    async fn usage(&self) -> u64 {
        let (_, session) = self.call(Method::GET, "/session", Value::Null).await;
        session["usage"].as_u64().expect("usage")
    }
}

fn multipart_body(name: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn json_request(method: Method, uri: &str, token: Option<&str>, payload: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(payload.to_string()))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn pdf_with_pages(pages: usize) -> Vec<u8> {
    let text = (0..pages * pdf::LINES_PER_PAGE)
        .map(|line| format!("line {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    let bytes = pdf::render_text_document("pages", &text).expect("render pdf");
    assert_eq!(pdf::page_count(&bytes).expect("page count") as usize, pages);
    bytes
}

#[tokio::test]
async fn unsupported_files_never_reach_the_model() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "never", "is_table": false }))
        .await;

    let report = harness
        .upload("archive.zip", "application/zip", b"PK\x03\x04")
        .await;
    let file = &report["files"][0];
    assert_eq!(file["status"], "error");
    assert_eq!(file["error"], "Unsupported file type.");

    let id = file["id"].as_str().expect("id");
    let (status, _) = harness
        .call(Method::POST, &format!("/files/{id}/process"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(mock.hits_async().await, 0);
    assert_eq!(harness.usage().await, 0);
    let (_, metrics) = harness.call(Method::GET, "/metrics", Value::Null).await;
    assert_eq!(metrics["files_rejected"], 1);
}

#[tokio::test]
async fn failed_extraction_is_rolled_back_exactly_once() {
    let harness = Harness::new().await;
    let mock = harness
        .model
        .mock_async(|when, then| {
            when.method(POST).path(MODEL_PATH);
            then.status(500)
                .json_body(json!({ "error": { "message": "backend exploded" } }));
        })
        .await;

    let report = harness.upload("scan.png", "image/png", b"png-bytes").await;
    let file = &report["files"][0];
    assert_eq!(file["status"], "error");
    assert!(file["text"].is_null());

    mock.assert_hits_async(1).await;
    assert_eq!(harness.usage().await, 0);
    let (_, metrics) = harness.call(Method::GET, "/metrics", Value::Null).await;
    assert_eq!(metrics["usage_rollbacks"], 1);
    assert_eq!(metrics["extractions_failed"], 1);
    assert_eq!(metrics["extractions_succeeded"], 0);
}

#[tokio::test]
async fn cropping_twice_with_the_same_image_gives_the_same_text() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "Receipt total 42", "is_table": false }))
        .await;

    let report = harness.upload("receipt.jpg", "image/jpeg", b"jpeg").await;
    let id = report["files"][0]["id"].as_str().expect("id").to_string();
    let cropped = datauri::encode("image/jpeg", b"cropped-jpeg");

    let (status, first) = harness
        .call(
            Method::POST,
            &format!("/files/{id}/crop"),
            json!({ "data_uri": cropped }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = harness
        .call(
            Method::POST,
            &format!("/files/{id}/crop"),
            json!({ "data_uri": cropped }),
        )
        .await;
    assert_eq!(first["text"], second["text"]);
    assert_eq!(second["status"], "success");

    mock.assert_hits_async(3).await;
    assert_eq!(harness.usage().await, 3);
}

#[tokio::test]
async fn pdf_at_the_page_limit_is_accepted_and_one_over_is_rejected() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "page text", "is_table": false }))
        .await;

    let accepted = harness
        .upload("one.pdf", "application/pdf", &pdf_with_pages(1))
        .await;
    assert_eq!(accepted["files"][0]["status"], "success");

    let rejected = harness
        .upload("two.pdf", "application/pdf", &pdf_with_pages(2))
        .await;
    let file = &rejected["files"][0];
    assert_eq!(file["status"], "error");
    assert!(
        file["error"]
            .as_str()
            .expect("error message")
            .contains("PDF has 2 pages")
    );

    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn free_plan_stops_after_three_extractions() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "ok", "is_table": false }))
        .await;

    for index in 0..3 {
        let report = harness
            .upload(&format!("page-{index}.png"), "image/png", b"png")
            .await;
        assert_eq!(report["files"][0]["status"], "success");
    }

    let report = harness.upload("page-3.png", "image/png", b"png").await;
    assert_eq!(report["files"][0]["status"], "queued");
    assert_eq!(report["limit_reached"]["plan"], "free");
    assert_eq!(report["limit_reached"]["limit"], 3);

    let id = report["files"][0]["id"].as_str().expect("id");
    let (status, notice) = harness
        .call(Method::POST, &format!("/files/{id}/process"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(notice["upgrade_url"], "/plans");

    let (status, _) = harness
        .call(Method::POST, "/summarize", json!({ "text": "some text" }))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    mock.assert_hits_async(3).await;
    assert_eq!(harness.usage().await, 3);
}

#[tokio::test]
async fn background_upload_at_quota_reports_the_limit_without_calling_the_model() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "ok", "is_table": false }))
        .await;

    for index in 0..3 {
        harness
            .upload(&format!("page-{index}.png"), "image/png", b"png")
            .await;
    }

    let report = harness
        .upload_to("/files", "page-3.png", "image/png", b"png")
        .await;
    assert_eq!(report["files"][0]["status"], "queued");
    assert_eq!(report["limit_reached"]["plan"], "free");
    assert_eq!(report["limit_reached"]["limit"], 3);
    assert_eq!(report["usage"], 3);

    tokio::task::yield_now().await;
    let id = report["files"][0]["id"].as_str().expect("id");
    let (status, file) = harness
        .call(Method::GET, &format!("/files/{id}"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["status"], "queued");
    mock.assert_hits_async(3).await;
    assert_eq!(harness.usage().await, 3);
}

#[tokio::test]
async fn processed_files_are_not_billed_twice() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "ok", "is_table": false }))
        .await;

    let report = harness.upload("scan.png", "image/png", b"png").await;
    assert_eq!(report["files"][0]["status"], "success");
    let id = report["files"][0]["id"].as_str().expect("id");

    let (status, _) = harness
        .call(Method::POST, &format!("/files/{id}/process"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    mock.assert_hits_async(1).await;
    assert_eq!(harness.usage().await, 1);
}

#[tokio::test]
async fn ten_megabyte_file_is_rejected_on_the_free_plan() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "never", "is_table": false }))
        .await;

    let report = harness
        .upload("huge.png", "image/png", &vec![0u8; 10 * 1024 * 1024])
        .await;
    let file = &report["files"][0];
    assert_eq!(file["status"], "error");
    assert_eq!(
        file["error"],
        "File is too large. The free plan accepts files up to 5 MB."
    );
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn tabular_results_expose_a_table_view() {
    let harness = Harness::new().await;
    harness
        .reply_with(json!({
            "text": "name qty\napple 1\npear 2",
            "is_table": true,
            "csv_data": "name,qty\napple,1\npear,2"
        }))
        .await;

    let report = harness.upload("stock.png", "image/png", b"png").await;
    let id = report["files"][0]["id"].as_str().expect("id").to_string();

    let (status, file) = harness
        .call(Method::GET, &format!("/files/{id}"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["is_table"], true);
    assert_eq!(file["table"]["header"], json!(["name", "qty"]));
    let body_rows = file["table"]["rows"].as_array().expect("rows").len();
    assert_eq!(body_rows + 1, 3);

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/files/{id}/export/csv"),
            Some(&harness.token),
            Value::Null,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&body[..], b"name,qty\napple,1\npear,2");
}

#[tokio::test]
async fn text_files_are_read_locally_and_billed() {
    let harness = Harness::new().await;
    let mock = harness
        .reply_with(json!({ "text": "never", "is_table": false }))
        .await;

    let report = harness
        .upload("notes.txt", "text/plain", b"plain words")
        .await;
    assert_eq!(report["files"][0]["status"], "success");
    assert_eq!(report["files"][0]["text"], "plain words");
    assert_eq!(report["usage"], 1);
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn upgrading_unlocks_document_exports() {
    let harness = Harness::new().await;
    harness
        .reply_with(json!({ "text": "Quarterly report", "is_table": false }))
        .await;
    let report = harness.upload("report.png", "image/png", b"png").await;
    let id = report["files"][0]["id"].as_str().expect("id").to_string();

    let (status, _) = harness
        .call(Method::GET, &format!("/files/{id}/export/docx"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, outcome) = harness
        .call(Method::POST, "/checkout", json!({ "plan": "pro" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "paid");
    assert_eq!(outcome["receipt"]["gateway"], "stripe");

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            Method::GET,
            &format!("/files/{id}/export/pdf"),
            Some(&harness.token),
            Value::Null,
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(pdf::page_count(&body).expect("pages"), 1);
}

#[tokio::test]
async fn removing_files_releases_them() {
    let harness = Harness::new().await;
    harness
        .reply_with(json!({ "text": "x", "is_table": false }))
        .await;
    let first = harness.upload("a.png", "image/png", b"a").await;
    harness.upload("b.png", "image/png", b"b").await;

    let (_, listing) = harness.call(Method::GET, "/files", Value::Null).await;
    let files = listing["files"].as_array().expect("files");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["file"]["name"], "b.png");

    let id = first["files"][0]["id"].as_str().expect("id");
    let (status, _) = harness
        .call(Method::DELETE, &format!("/files/{id}"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = harness
        .call(Method::GET, &format!("/files/{id}/preview"), Value::Null)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, cleared) = harness.call(Method::DELETE, "/files", Value::Null).await;
    assert_eq!(cleared["removed"], 1);
}
