//! Purpose: Provide the HTTP/JSONL validation server for paramflow.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based loopback server exposing one endpoint's validation pipeline.
//! Invariants: Each `POST /v0/validate` body is one stream with its own mutability state.
//! Invariants: Loopback-only unless explicitly allowed.
//! Notes: Results stream back as JSONL in element order; rejections do not end the stream.

use axum::body::Body;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{Value, json};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::command_dispatch::parse_jsonl;
use crate::endpoint_json::{endpoint_json, error_body_json};
use paramflow::api::{Endpoint, Error, ErrorKind, RequestMetadata, ValidationService};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub endpoint: Endpoint,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
    pub channel_capacity: usize,
}

#[derive(Clone)]
struct AppState {
    service: ValidationService,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let service =
        ValidationService::new(config.endpoint).with_channel_capacity(config.channel_capacity);
    tracing::info!(
        endpoint = %service.endpoint().name(),
        bind = %config.bind,
        "serving validation pipeline"
    );
    let app = router(AppState { service }, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;

    // Open streams finish their current element before the listener closes.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("server failed")
            .with_source(err)
    })?;
    tracing::info!("validation server stopped");
    Ok(())
}

fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v0/endpoint", get(describe_endpoint))
        .route("/v0/validate", post(validate_requests))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if config.channel_capacity == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--channel-capacity must be greater than zero")
            .with_hint("Use a positive value like 16."));
    }

    Ok(())
}

/// Logs to stderr; `RUST_LOG` overrides the `info` default.
fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable; stopping on ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn describe_endpoint(State(state): State<Arc<AppState>>) -> Response {
    json_response(endpoint_json(state.service.endpoint()))
}

async fn validate_requests(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let base = request_metadata(remote, &headers);
    let requests = match parse_jsonl(&body, "POST /v0/validate", &base) {
        Ok(requests) => requests,
        Err(err) => return error_response(err),
    };

    let results = state
        .service
        .spawn_stream(tokio_stream::iter(requests), |request| {
            let index = request.index();
            request
                .resolve_all()
                .map(|parameters| (index, parameters))
        });

    let stream = results.map(|result| {
        let line = match result {
            Ok((index, parameters)) => json!({
                "index": index,
                "ok": true,
                "parameters": parameters,
            }),
            Err(err) => json!({
                "index": err.index(),
                "ok": false,
                "error": error_body_json(&err),
            }),
        };
        serde_json::to_vec(&line)
            .map(|mut bytes| {
                bytes.push(b'\n');
                Bytes::from(bytes)
            })
            .map_err(std::io::Error::other)
    });

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/jsonl"),
    );
    response
        .headers_mut()
        .insert("paramflow-version", HeaderValue::from_static("0"));
    response
}

/// Exposes the peer address and readable headers to handlers and logs.
fn request_metadata(remote: SocketAddr, headers: &HeaderMap) -> RequestMetadata {
    let mut metadata = RequestMetadata::default().with_remote_address(remote);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            metadata = metadata.with_information(name.as_str(), value);
        }
    }
    metadata
}

fn json_response(payload: Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert("paramflow-version", HeaderValue::from_static("0"));
    response
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage | ErrorKind::BadInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut response = (status, Json(json!({ "error": error_body_json(&err) }))).into_response();
    response
        .headers_mut()
        .insert("paramflow-version", HeaderValue::from_static("0"));
    response
}
