//! HTTP API integration tests.
//!
//! Sends requests through the full router with `tower::ServiceExt::oneshot`
//! against an engine backed by a temporary directory.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tower::ServiceExt;

use common::{Outcome, ScriptedTranscoder, TestHarness, compress_spec, engine_config, wait_for_state, wait_for_terminal};
use fileforge::engine::{FileFormat, JobId, JobState, OperationKind};

const BOUNDARY: &str = "fileforge-test-boundary";

async fn pdf_harness(transcoder: ScriptedTranscoder, workers: usize, depth: usize) -> TestHarness {
    TestHarness::with_transcoder(
        engine_config(workers, depth),
        FileFormat::Pdf,
        FileFormat::Pdf,
        OperationKind::Compress,
        Arc::new(transcoder),
    )
    .await
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value).as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn job_id(body: &Value) -> JobId {
    body["data"]["job_id"].as_str().unwrap().parse().unwrap()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;
    let (status, _, body) = send(&harness.app(), empty_request("GET", "/api/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

// ---------------------------------------------------------------------------
// Upload, submit, poll, download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_then_compress_and_download() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[30, 60], Outcome::Reverse), 1, 4).await;
    let app = harness.app();

    let (status, upload) = send_json(&app, multipart_request("/api/v1/uploads", &[Part::File("report.pdf", b"12345")])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(upload["data"]["source_format"], "pdf");
    assert_eq!(upload["data"]["size"], 5);
    let source_ref = upload["data"]["source_ref"].as_str().unwrap().to_string();

    let (status, created) = send_json(
        &app,
        json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "source_ref": source_ref,
                "source_format": "pdf",
                "target_format": "pdf",
                "operation": "compress",
                "target_ratio": 50
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(created["status"], "success");
    let id = job_id(&created);
    assert_eq!(created["data"]["status_url"], format!("/api/v1/jobs/{}", id));

    wait_for_terminal(&harness.engine, id).await;

    let (status, job) = send_json(&app, empty_request("GET", &format!("/api/v1/jobs/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["data"]["state"], "completed");
    assert_eq!(job["data"]["progress"], 100);
    assert_eq!(job["data"]["processing"], false);
    assert_eq!(job["data"]["target_ratio"], 50);

    let (status, result) = send_json(&app, empty_request("GET", &format!("/api/v1/jobs/{}/result", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["data"]["content_type"], "application/pdf");
    assert_eq!(result["data"]["output_bytes"], 5);
    assert_eq!(result["data"]["result_ref"], format!("results/{}.pdf", id));

    let (status, headers, body) = send(&app, empty_request("GET", &format!("/api/v1/jobs/{}/result/content", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"54321");
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(headers[header::CONTENT_LENGTH], "5");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"compressed-"));
    assert!(disposition.ends_with(".pdf\""));
}

#[tokio::test]
async fn upload_rejects_unknown_file_type() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, body) = send_json(
        &harness.app(),
        multipart_request("/api/v1/uploads", &[Part::File("notes.txt", b"hello")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn upload_rejects_empty_file() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, _) = send_json(&harness.app(), multipart_request("/api/v1/uploads", &[Part::File("a.pdf", b"")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Submission errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_pair_returns_422() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;
    let source = harness.put_source("a.pdf", b"data").await;

    let (status, body) = send_json(
        &harness.app(),
        json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "source_ref": source,
                "source_format": "pdf",
                "target_format": "docx",
                "operation": "convert"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn unknown_source_ref_returns_400() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, _) = send_json(
        &harness.app(),
        json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "source_ref": "uploads/nope.pdf",
                "source_format": "pdf",
                "target_format": "pdf",
                "operation": "compress"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ratio_out_of_range_returns_400() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;
    let source = harness.put_source("a.pdf", b"data").await;

    let (status, _) = send_json(
        &harness.app(),
        json_request(
            "POST",
            "/api/v1/jobs",
            json!({
                "source_ref": source,
                "source_format": "pdf",
                "target_format": "pdf",
                "operation": "compress",
                "target_ratio": 101
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_queue_returns_429_with_retry_after() {
    let (transcoder, release) = ScriptedTranscoder::held(&[], Outcome::Reverse);
    let harness = pdf_harness(transcoder, 1, 1).await;
    let source = harness.put_source("a.pdf", b"data").await;
    let app = harness.app();

    let running = harness.submit(compress_spec(&source, FileFormat::Pdf, 50)).await;
    wait_for_state(&harness.engine, running.id, JobState::Processing).await;
    harness.submit(compress_spec(&source, FileFormat::Pdf, 50)).await;

    let request = json_request(
        "POST",
        "/api/v1/jobs",
        json!({
            "source_ref": source,
            "source_format": "pdf",
            "target_format": "pdf",
            "operation": "compress"
        }),
    );
    let (status, headers, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "5");
    release.store(true, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// Queries and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;
    let app = harness.app();
    let id = JobId::new();

    let (status, _) = send_json(&app, empty_request("GET", &format!("/api/v1/jobs/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, empty_request("POST", &format!("/api/v1/jobs/{}/cancel", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_running_job_then_conflict() {
    let (transcoder, _release) = ScriptedTranscoder::held(&[10], Outcome::Reverse);
    let harness = pdf_harness(transcoder, 1, 4).await;
    let source = harness.put_source("a.pdf", b"data").await;
    let app = harness.app();

    let job = harness.submit(compress_spec(&source, FileFormat::Pdf, 50)).await;
    wait_for_state(&harness.engine, job.id, JobState::Processing).await;

    let (status, result) = send_json(&app, empty_request("GET", &format!("/api/v1/jobs/{}/result", job.id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(result["status"], "error");

    let (status, body) = send_json(&app, empty_request("POST", &format!("/api/v1/jobs/{}/cancel", job.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "cancelled");

    let (status, _) = send_json(&app, empty_request("POST", &format!("/api/v1/jobs/{}/cancel", job.id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_jobs_filters_by_state() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;
    let source = harness.put_source("a.pdf", b"data").await;
    let app = harness.app();

    let job = harness.submit(compress_spec(&source, FileFormat::Pdf, 50)).await;
    wait_for_terminal(&harness.engine, job.id).await;

    let (status, completed) = send_json(&app, empty_request("GET", "/api/v1/jobs?state=completed")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["data"].as_array().unwrap().len(), 1);
    assert_eq!(completed["data"][0]["id"], job.id.to_string());

    let (_, failed) = send_json(&app, empty_request("GET", "/api/v1/jobs?state=failed")).await;
    assert!(failed["data"].as_array().unwrap().is_empty());

    let (_, all) = send_json(&app, empty_request("GET", "/api/v1/jobs")).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn formats_lists_registered_operations() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, body) = send_json(&harness.app(), empty_request("GET", "/api/v1/formats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([{"source_format": "pdf", "target_format": "pdf", "operation": "compress"}])
    );
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_stream_ends_after_terminal_event() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[50], Outcome::Reverse), 1, 4).await;
    let source = harness.put_source("a.pdf", b"data").await;
    let app = harness.app();

    let job = harness.submit(compress_spec(&source, FileFormat::Pdf, 50)).await;

    let request = empty_request("GET", &format!("/api/v1/jobs/{}/events", job.id));
    let (status, headers, body) = tokio::time::timeout(Duration::from_secs(5), send(&app, request))
        .await
        .expect("event stream did not close");

    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("event: progress"));
    assert!(text.contains("\"state\":\"completed\""));
}

#[tokio::test]
async fn events_for_unknown_job_return_404() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, _) = send_json(&harness.app(), empty_request("GET", &format!("/api/v1/jobs/{}/events", JobId::new()))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Multipart shortcuts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compress_shortcut_accepts_file_and_level() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, body) = send_json(
        &harness.app(),
        multipart_request(
            "/api/v1/compress",
            &[Part::Text("compressionLevel", "30"), Part::File("scan.pdf", b"abc")],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let done = wait_for_terminal(&harness.engine, job_id(&body)).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.operation.target_ratio(), Some(30));
}

#[tokio::test]
async fn convert_shortcut_removes_upload_when_rejected() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, _) = send_json(
        &harness.app(),
        multipart_request(
            "/api/v1/convert",
            &[Part::File("scan.pdf", b"abc"), Part::Text("targetFormat", "docx")],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let uploads = harness.dir.path().join("uploads");
    let leftover = std::fs::read_dir(&uploads).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn compress_shortcut_defaults_level_to_fifty() {
    let harness = pdf_harness(ScriptedTranscoder::new(&[], Outcome::Reverse), 1, 4).await;

    let (status, body) = send_json(
        &harness.app(),
        multipart_request("/api/v1/compress", &[Part::File("scan.pdf", b"abc")]),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let done = wait_for_terminal(&harness.engine, job_id(&body)).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.operation.target_ratio(), Some(50));
}
