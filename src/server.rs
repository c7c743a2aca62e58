//! HTTP front end of the spool.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Informational banner |
//! | `POST`, `PUT` | `/spool` | Spool the raw request body |
//! | `GET`  | `/spool` | List entries (id and status) |
//! | `GET`  | `/spool/{id}` | Status of one entry |
//!
//! A `200 OK` on `/spool` confirms durable receipt only. Post-processing
//! happens elsewhere and may take much longer; poll the URL returned in the
//! `Location` header.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_data", "message": "no data" } }
//! ```
//!
//! Error codes: `no_data` (400), `bad_request` (400), `not_found` (404),
//! `transport` (408), `too_large` (413), `storage` (500), `internal` (500).
//!
//! Request bodies are read under an idle deadline of `[server].timeout_secs`
//! and a size cap of `[server].max_body_bytes`. Both failures surface
//! through the same JSON contract.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, FailedToBufferBody},
        DefaultBodyLimit, Path, Request, State,
    },
    http::{header, HeaderMap, HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::RequestBodyTimeoutLayer;
use tracing::{error, info};

use blobproc_core::models::{Receipt, SpoolEntry, SpoolStatus};

use crate::config::Config;
use crate::logging::ACCESS_LOG_TARGET;
use crate::spool::{SpoolError, SpoolService};

const BANNER: &str = r#"{"id": "blobprocd", "about": "Send your PDF payload to {addr}/spool - a 200 OK status only confirms receipt, not successful postprocessing, which may take more time. Check Location header for spool id."}"#;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    spool: Arc<SpoolService>,
    /// Header that may carry the payload's source URL.
    urlmap_header: HeaderName,
    listen_addr: String,
    body_timeout: Duration,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, spool: Arc<SpoolService>) -> anyhow::Result<Self> {
        let urlmap_header = HeaderName::try_from(config.urlmap.header.as_str())
            .with_context(|| format!("invalid urlmap header: '{}'", config.urlmap.header))?;
        Ok(Self {
            spool,
            urlmap_header,
            listen_addr: config.server.bind.clone(),
            body_timeout: config.timeout(),
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let body_timeout = state.body_timeout;
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/", get(handle_banner))
        .route(
            "/spool",
            get(handle_list).post(handle_ingest).put(handle_ingest),
        )
        .route("/spool/{id}", get(handle_status))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyTimeoutLayer::new(body_timeout))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// Bind to `[server].bind` and serve until Ctrl-C.
pub async fn run_server(config: &Config, spool: Arc<SpoolService>) -> anyhow::Result<()> {
    let state = AppState::new(config, spool)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(
        hostport = %config.server.bind,
        spool = %config.spool.dir.display(),
        "starting server"
    );
    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let resp = next.run(req).await;
    info!(
        target: ACCESS_LOG_TARGET,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    resp
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SpoolError> for AppError {
    fn from(err: SpoolError) -> Self {
        let (status, code) = match &err {
            SpoolError::NoData => (StatusCode::BAD_REQUEST, "no_data"),
            SpoolError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SpoolError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            SpoolError::Transport(_) => (StatusCode::REQUEST_TIMEOUT, "transport"),
            SpoolError::TooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "too_large"),
            SpoolError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_banner(State(state): State<AppState>) -> Response {
    let body = BANNER.replace("{addr}", &state.listen_addr) + "\n";
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

// ============ POST|PUT /spool ============

/// Spools the buffered body. Responds with the receipt and a `Location`
/// header for status polling.
async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let bytes = body.map_err(|rejection| body_error(rejection, state.max_body_bytes))?;

    let source_url = headers
        .get(&state.urlmap_header)
        .and_then(|v| v.to_str().ok());
    let receipt: Receipt = state.spool.ingest(bytes, source_url).await?;

    let location = receipt.location.clone();
    Ok((StatusCode::OK, [(header::LOCATION, location)], Json(receipt)).into_response())
}

fn body_error(rejection: BytesRejection, limit: usize) -> AppError {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            SpoolError::TooLarge(limit).into()
        }
        other => SpoolError::Transport(other.body_text()).into(),
    }
}

// ============ GET /spool ============

#[derive(Serialize)]
struct SpoolListResponse {
    entries: Vec<SpoolEntry>,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<SpoolListResponse>, AppError> {
    let entries = state.spool.list();
    let entries = tokio::task::spawn_blocking(move || entries.collect::<Vec<_>>())
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(SpoolListResponse { entries }))
}

// ============ GET /spool/{id} ============

async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SpoolStatus>, AppError> {
    Ok(Json(state.spool.status(&id).await?))
}
