//! HTTP surface for the activity feed.
//!
//! Routes:
//! - `POST /webhook` receives GitHub deliveries
//! - `GET /events` serves rendered activity messages
//! - `GET /` serves the landing page
//! - `GET /health` reports liveness

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, instrument, warn};

use crate::{
    base::types::ActivityMessage,
    interaction::{ingest, poll},
    runtime::Runtime,
};

/// Header carrying the GitHub event type.
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// GitHub caps webhook payloads at 25 MB.
pub const WEBHOOK_BODY_LIMIT: usize = 25 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("../../static/index.html");

// Errors.

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(String),
    #[error("invalid `after` cursor: {0:?}")]
    InvalidCursor(String),
    #[error("event store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "No payload".to_string()),
            ApiError::InvalidCursor(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Store(err) => {
                error!("Event store failure: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// Router.

/// Builds the application router.
pub fn router(runtime: Runtime) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler).layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT)))
        .route("/events", get(events_handler))
        .with_state(runtime)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!("http_request", method = %request.method(), path = %request.uri().path())
        }))
}

// Handlers.

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Receives a webhook delivery.
///
/// Answers 200 whether zero, one, or two records were stored; 400 only when the body is not JSON.
#[instrument(skip_all)]
async fn webhook_handler(State(runtime): State<Runtime>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>, ApiError> {
    let event_type = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    let payload = parse_payload(&body).inspect_err(|err| warn!("Rejecting delivery: {}", err))?;

    let receipt = ingest::ingest(&runtime.store, event_type, payload.as_ref()).await?;

    Ok(Json(json!({ "status": receipt.status.as_str() })))
}

#[derive(Debug, Deserialize)]
struct EventsParams {
    after: Option<String>,
}

/// Serves the latest activity, or activity after the caller's cursor.
#[instrument(skip_all)]
async fn events_handler(State(runtime): State<Runtime>, Query(params): Query<EventsParams>) -> Result<Json<Vec<ActivityMessage>>, ApiError> {
    let messages = match params.after {
        Some(after) if after.trim().is_empty() => return Err(ApiError::InvalidCursor(after)),
        Some(after) => poll::messages_after(&runtime.store, &after).await?,
        None => poll::latest_messages(&runtime.store).await?,
    };

    Ok(Json(messages))
}

/// An empty (or whitespace-only) body is a missing payload, not a parse failure.
fn parse_payload(body: &[u8]) -> Result<Option<Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body).map(Some).map_err(|e| ApiError::InvalidBody(e.to_string()))
}
