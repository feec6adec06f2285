//! HTTP endpoints for Streaman.
//!
//! Form posts mirror the HTML page: each one performs a single recorder
//! operation and redirects back to the page with `302 Found`. The data
//! directory is also shared read-write over WebDAV at `{prefix}/dav/`.

use crate::files::list_recorded_files;
use crate::page::{PageModel, Pages};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get, post},
    Form, Json, Router,
};
use dav_server::{localfs::LocalFs, memls::MemLs, DavHandler};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use streamrec::{validate_channel, Recorder, RecorderError, RecordingId};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub recorder: Recorder,
    pub data_dir: PathBuf,
    /// Whether the record form may request transcoding.
    pub allow_transcode: bool,
    pub start_time: Instant,
    pages: Arc<Pages>,
}

impl WebState {
    pub fn new(
        recorder: Recorder,
        data_dir: impl Into<PathBuf>,
        allow_transcode: bool,
    ) -> Result<Self, handlebars::TemplateError> {
        Ok(Self {
            recorder,
            data_dir: data_dir.into(),
            allow_transcode,
            start_time: Instant::now(),
            pages: Arc::new(Pages::new()?),
        })
    }
}

/// Routes mounted under `prefix`, which is `""` or `/segment` with no
/// trailing slash. `/health` always lives at the root.
pub fn router(state: WebState, prefix: &str) -> Router {
    let files = ServeDir::new(&state.data_dir);
    let dav = dav_handler(&state.data_dir, prefix);
    let dav = any(move |req: Request| async move { dav.handle(req).await.into_response() });

    let mut app = Router::new()
        .route("/health", get(health))
        .route(&format!("{prefix}/"), get(index))
        .route(&format!("{prefix}/record"), post(record))
        .route(&format!("{prefix}/stop-recording"), post(stop_recording))
        .route(&format!("{prefix}/delete-failure"), post(delete_failure))
        .route(&format!("{prefix}/api/recordings"), get(api_recordings))
        .route(&format!("{prefix}/dav"), dav.clone())
        .route(&format!("{prefix}/dav/"), dav.clone())
        .route(&format!("{prefix}/dav/{{*path}}"), dav)
        .nest_service(&format!("{prefix}/files"), files);

    if !prefix.is_empty() {
        let target = format!("{prefix}/");
        app = app.route(
            prefix,
            get(move || async move { (StatusCode::FOUND, [(header::LOCATION, target)]) }),
        );
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// WebDAV over the data directory. Locks live in memory only.
fn dav_handler(data_dir: &Path, prefix: &str) -> DavHandler {
    DavHandler::builder()
        .filesystem(LocalFs::new(data_dir, false, false, false))
        .locksystem(MemLs::new())
        .strip_prefix(format!("{prefix}/dav"))
        .build_handler()
}

#[derive(Debug, Deserialize)]
struct RecordForm {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    transcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdForm {
    #[serde(default)]
    id: String,
}

fn back_to_page() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "./")]).into_response()
}

async fn index(State(state): State<WebState>) -> Response {
    let files = match list_recorded_files(&state.data_dir) {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(data_dir = %state.data_dir.display(), error = %e, "Cannot list data directory");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("cannot list directory: {}", e),
            )
                .into_response();
        }
    };

    let model = PageModel::new(state.recorder.list(), files, state.allow_transcode);
    match state.pages.render(&model) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn record(State(state): State<WebState>, Form(form): Form<RecordForm>) -> Response {
    let channel = form.channel.trim();
    if let Err(e) = validate_channel(channel) {
        tracing::debug!(error = %e, "Rejected record request");
        return (StatusCode::BAD_REQUEST, "invalid channel").into_response();
    }

    let transcode = state.allow_transcode && form.transcode.as_deref() == Some("on");
    let id = state.recorder.start(channel, transcode);
    tracing::debug!(recording.id = %id, "Record request accepted");

    back_to_page()
}

async fn stop_recording(State(state): State<WebState>, Form(form): Form<IdForm>) -> Response {
    match state.recorder.stop(&RecordingId::from(form.id)) {
        Ok(()) => back_to_page(),
        Err(e) => {
            let status = stop_error_status(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "Stop request failed");
            }
            (status, e.to_string()).into_response()
        }
    }
}

/// Unknown ids are the caller's fault; an undeliverable signal is ours.
fn stop_error_status(err: &RecorderError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn delete_failure(State(state): State<WebState>, Form(form): Form<IdForm>) -> Response {
    state.recorder.dismiss(&RecordingId::from(form.id));
    back_to_page()
}

async fn api_recordings(State(state): State<WebState>) -> impl IntoResponse {
    Json(state.recorder.list())
}

async fn health(State(state): State<WebState>) -> Json<serde_json::Value> {
    let stats = state.recorder.stats();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "recordings": {
            "active": stats.active,
            "failed": stats.failed,
        }
    }))
}
