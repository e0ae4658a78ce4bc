//! axum router serving the upload form.
//!
//! Routes:
//! - `GET  /`        - Empty form
//! - `POST /`        - Multipart upload (`repo`, `user`, `email`, `token`, `zipfile`); runs the pipeline
//! - `GET  /healthz` - Health check

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{info, instrument, warn};
use zip_push_core::config::PipelineConfig;
use zip_push_core::contract::CommandRunner;
use zip_push_core::log::OperationLog;
use zip_push_core::publish::{publish, ArchiveUpload, PublishRequest};

/// Response header carrying the [`zip_push_core::publish::PublishStatus`] of a run.
pub const STATUS_HEADER: &str = "x-publish-status";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PipelineConfig>,
    pub runner: Arc<dyn CommandRunner>,
}

/// Build the axum [`Router`] with the form routes and shared state.
pub fn create_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(handle_form).post(handle_publish))
        .route("/healthz", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn handle_form() -> Result<Html<String>, AppError> {
    Ok(Html(IndexTemplate::empty().render()?))
}

async fn handle_health() -> &'static str {
    "ok"
}

/// `POST /`
///
/// Reads the multipart form, runs the pipeline and renders its log. Pipeline
/// failures are part of the page; only unreadable request bodies are HTTP errors.
#[instrument(skip_all)]
async fn handle_publish(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut request = PublishRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "zipfile" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                request.archive = Some(ArchiveUpload { file_name, bytes });
            }
            "repo" => request.repo_url = field.text().await?,
            "token" => request.token = field.text().await?,
            "user" => request.user_name = Some(field.text().await?),
            "email" => request.user_email = Some(field.text().await?),
            other => warn!(field = other, "Ignoring unknown form field"),
        }
    }

    let report = publish(&state.config, state.runner.as_ref(), request).await;
    info!(status = %report.status, "Publish request handled");

    let page = IndexTemplate::with_log(&report.log).render()?;
    Ok((
        StatusCode::OK,
        [(STATUS_HEADER, report.status.as_str())],
        Html(page),
    )
        .into_response())
}

/// The upload form, followed by the run's log once a form was submitted.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    log: Option<Vec<String>>,
}

impl IndexTemplate {
    fn empty() -> Self {
        Self { log: None }
    }

    fn with_log(log: &OperationLog) -> Self {
        Self {
            log: Some(log.lines().map(str::to_string).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AppError {
    /// The multipart body could not be read (malformed, or over the body limit).
    Multipart(MultipartError),
    Template(askama::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Multipart(err) => {
                warn!(error = %err, "failed to read multipart body");
                (err.status(), err.body_text()).into_response()
            }
            AppError::Template(err) => {
                tracing::error!(error = %err, "Template rendering failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Template rendering error").into_response()
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Multipart(err)
    }
}

impl From<askama::Error> for AppError {
    fn from(err: askama::Error) -> Self {
        AppError::Template(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_are_escaped() {
        let mut log = OperationLog::new();
        log.push("<script>alert('x')</script> & more");
        let page = IndexTemplate::with_log(&log).render().unwrap();
        assert!(page.contains("&lt;script&gt;alert("), "page:\n{page}");
        assert!(page.contains("&amp; more"));
        assert!(!page.contains("<script>"));
        assert!(!page.contains("alert('x')"));
    }

    #[test]
    fn log_lines_are_rendered_in_order_inside_pre() {
        let mut log = OperationLog::new();
        log.push("Saved site.zip (10 bytes).");
        log.error("boom");
        let page = IndexTemplate::with_log(&log).render().unwrap();
        let saved = page.find("Saved site.zip (10 bytes).").unwrap();
        let error = page.find("ERROR: boom").unwrap();
        let pre = page.find("<pre>").unwrap();
        assert!(pre < saved && saved < error);
        assert!(page.contains("</pre>"));
    }

    #[test]
    fn empty_form_has_every_field() {
        let page = IndexTemplate::empty().render().unwrap();
        for field in ["repo", "user", "email", "token", "zipfile"] {
            assert!(page.contains(&format!("name=\"{field}\"")), "missing {field}");
        }
        assert!(!page.contains("<pre>"));
    }
}
