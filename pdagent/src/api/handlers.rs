use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use fanout::{EVENT_VERSION_HEADER, EventContainer, EventVersion, StatusItem};

use crate::AppState;
use crate::errors::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetryResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status_items: Vec<StatusItem>,
}

#[derive(Debug, Deserialize)]
pub struct RoutingKeyParams {
    pub rk: Option<String>,
}

impl RoutingKeyParams {
    /// Treat an absent or empty `rk` as "all routing keys".
    fn routing_key(&self) -> Option<&str> {
        self.rk.as_deref().filter(|rk| !rk.is_empty())
    }
}

/// `POST /send`: persist and dispatch one event.
///
/// The body is the opaque event payload; the wire version comes from the
/// `Pd-Event-Version` header. Responds with the record's local key as soon
/// as the event is durable; delivery happens asynchronously.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SendResponse>> {
    let version: EventVersion = headers
        .get(EVENT_VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(Error::UnknownEventVersion)?
        .parse()
        .map_err(|_| Error::UnknownEventVersion)?;

    tracing::debug!(version = %version, bytes = body.len(), "received /send payload");

    let key = state
        .queue
        .enqueue(EventContainer::new(version, body.to_vec()))
        .await?;
    Ok(Json(SendResponse { key }))
}

/// `POST /queue/retry?rk=`: re-dispatch errored events.
pub async fn retry(
    State(state): State<AppState>,
    Query(params): Query<RoutingKeyParams>,
) -> Result<Json<RetryResponse>> {
    let count = state.queue.retry(params.routing_key()).await?;
    Ok(Json(RetryResponse {
        message: format!("Retrying {count} events."),
    }))
}

/// `GET /queue/status?rk=`: aggregate delivery counts per routing key.
pub async fn status(
    State(state): State<AppState>,
    Query(params): Query<RoutingKeyParams>,
) -> Result<Json<StatusResponse>> {
    let status_items = state.queue.status(params.routing_key()).await?;
    Ok(Json(StatusResponse { status_items }))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}
