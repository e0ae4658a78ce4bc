use std::io::Write;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use tempfile::tempdir;
use tower::ServiceExt;
use zip::write::FileOptions;

use zip_push::server::{create_router, AppState, STATUS_HEADER};
use zip_push_core::config::PipelineConfig;
use zip_push_core::contract::{CommandOutput, MockCommandRunner};

const BOUNDARY: &str = "zip-push-test-boundary";

fn zip_bytes() -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        zip.start_file("site/index.html", FileOptions::default())
            .unwrap();
        zip.write_all(b"<h1>hello</h1>\n").unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Builds a multipart/form-data body from text fields and an optional zip file.
fn multipart_body(fields: &[(&str, &str)], zip: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .unwrap();
    }
    if let Some((file_name, bytes)) = zip {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"zipfile\"; filename=\"{file_name}\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .unwrap();
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    write!(body, "--{BOUNDARY}--\r\n").unwrap();
    body
}

fn post(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn state(work_root: &std::path::Path, runner: MockCommandRunner) -> AppState {
    AppState {
        config: Arc::new(PipelineConfig {
            work_root: work_root.to_path_buf(),
            ..PipelineConfig::default()
        }),
        runner: Arc::new(runner),
    }
}

fn unused_runner() -> MockCommandRunner {
    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();
    runner
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn get_renders_the_empty_form() {
    let tmp = tempdir().unwrap();
    let app = create_router(state(tmp.path(), unused_runner()), 1024 * 1024);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("name=\"zipfile\""));
    assert!(!page.contains("<pre>"));
}

#[tokio::test]
async fn healthz_answers_ok() {
    let tmp = tempdir().unwrap();
    let app = create_router(state(tmp.path(), unused_runner()), 1024);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn missing_token_is_rejected_without_running_git() {
    let tmp = tempdir().unwrap();
    let app = create_router(state(tmp.path(), unused_runner()), 1024 * 1024);
    let zip = zip_bytes();
    let body = multipart_body(
        &[("repo", "https://example.com/user/repo.git"), ("token", "")],
        Some(("site.zip", &zip)),
    );

    let response = app.oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[STATUS_HEADER], "rejected");
    let page = body_text(response).await;
    assert!(page.contains("ERROR: Personal Access Token is required."));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_zip_file_is_rejected() {
    let tmp = tempdir().unwrap();
    let app = create_router(state(tmp.path(), unused_runner()), 1024 * 1024);
    let body = multipart_body(
        &[("repo", "https://example.com/user/repo.git"), ("token", "t")],
        None,
    );

    let response = app.oneshot(post(body)).await.unwrap();

    assert_eq!(response.headers()[STATUS_HEADER], "rejected");
    assert!(body_text(response).await.contains("ERROR: No ZIP file uploaded."));
}

#[tokio::test]
async fn valid_upload_runs_git_and_renders_the_log() {
    let tmp = tempdir().unwrap();
    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .returning(|_, _, _| CommandOutput::exited(0, "", ""));
    let app = create_router(state(tmp.path(), runner), 1024 * 1024);
    let zip = zip_bytes();
    let body = multipart_body(
        &[
            ("repo", "https://example.com/user/repo.git"),
            ("user", "alice"),
            ("email", "alice@example.com"),
            ("token", "secret-token"),
        ],
        Some(("site.zip", &zip)),
    );

    let response = app.oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[STATUS_HEADER], "pushed");
    let page = body_text(response).await;
    assert!(page.contains("Project root: site"), "page:\n{page}");
    assert!(page.contains("$ git push -u origin main"));
    assert!(page.contains("Pushed to origin"));
    assert!(!page.contains("ERROR:"));
    assert!(!page.contains("secret-token"));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn body_over_the_limit_is_refused() {
    let tmp = tempdir().unwrap();
    let app = create_router(state(tmp.path(), unused_runner()), 256);
    let big = vec![0u8; 4096];
    let body = multipart_body(
        &[("repo", "https://example.com/user/repo.git"), ("token", "t")],
        Some(("big.zip", &big)),
    );

    let response = app.oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
