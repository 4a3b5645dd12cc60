//! HTTP service exposing convert, download and info

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{
            ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
        },
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use grabkit::{
    ConvertRequest, DownloadOutcome, DownloadRequest, FetchError, Operation, ProxiedStream, Tool,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    tool: Arc<Tool>,
}

/// Successful JSON responses
#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> Envelope<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Build the service router
pub fn router(tool: Tool) -> Router {
    let state = AppState {
        tool: Arc::new(tool),
    };

    Router::new()
        .route(
            "/api/convert",
            post(convert).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/api/download",
            post(download).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/api/info",
            get(info).options(preflight).fallback(method_not_allowed),
        )
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, RANGE])
        .expose_headers([CONTENT_RANGE, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE])
}

/// Serve until ctrl-c
pub async fn serve(listener: tokio::net::TcpListener, tool: Tool) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "GrabKit listening");
    }
    axum::serve(listener, router(tool))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn info(State(state): State<AppState>) -> Response {
    Json(state.tool.capabilities()).into_response()
}

async fn convert(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ConvertRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return invalid_body(e),
    };

    match state.tool.convert(request).await {
        Ok(payload) => Envelope::ok(payload).into_response(),
        Err(e) => fetch_error(e, Operation::Convert),
    }
}

async fn download(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mut request: DownloadRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return invalid_body(e),
    };
    request.range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.tool.download(request).await {
        Ok(DownloadOutcome::Info(info)) => Envelope::ok(info).into_response(),
        Ok(DownloadOutcome::Stream(stream)) => stream_response(stream),
        Err(e) => fetch_error(e, Operation::Download),
    }
}

fn stream_response(stream: ProxiedStream) -> Response {
    let status = StatusCode::from_u16(stream.status).unwrap_or(StatusCode::OK);
    let mut headers = HeaderMap::new();
    for (name, value) in stream.headers() {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => warn!(header = name, "Dropping unrepresentable header value"),
        }
    }
    if !headers.contains_key(CONTENT_DISPOSITION) {
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"download.bin\""),
        );
    }

    (status, headers, Body::from_stream(stream.body)).into_response()
}

fn invalid_body(e: serde_json::Error) -> Response {
    warn!(error = %e, "Rejecting malformed request body");
    error_body(StatusCode::BAD_REQUEST, "Invalid request body")
}

fn fetch_error(e: FetchError, operation: Operation) -> Response {
    warn!(error = %e, ?operation, "Request failed");
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    error_body(status, &e.public_message(operation))
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
