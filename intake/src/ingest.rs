//! HTTP handlers for the write and read endpoints.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::api::{EventListResponse, EventResponse, EventSummary, IngestError, StoreResponse};
use crate::envelope::{EnvelopeParser, ItemBody};
use crate::event::{decompress, EventBody};
use crate::prometheus::{report_decode_failure, report_stored_events};
use crate::router;

/// Headers worth logging outside of dev mode.
const INTERESTING_HEADERS: [&str; 2] = ["user-agent", "x-sentry-auth"];

fn content_encoding(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("content-encoding")
        .and_then(|value| value.to_str().ok())
}

fn log_headers(dev_mode: bool, project_id: u64, headers: &HeaderMap) {
    if dev_mode {
        for (name, value) in headers {
            tracing::info!(project_id, "header: {}: {:?}", name, value);
        }
    } else {
        for name in INTERESTING_HEADERS {
            if let Some(value) = headers.get(name) {
                tracing::info!(project_id, "header: {}: {:?}", name, value);
            }
        }
    }
}

/// Logs the recognizable bits of a decoded payload, tolerating any missing
/// nested field.
fn log_event_details(body: &Value, project_id: u64) {
    if let Some(first) = body.pointer("/exception/values/0") {
        tracing::info!(
            project_id,
            "exception: {} {}",
            first.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            first.get("value").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
        );
    }
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        tracing::info!(project_id, "message: {}", message);
    }
    if let Some(sdk) = body.get("sdk") {
        tracing::info!(
            project_id,
            "sdk: {} {}",
            sdk.get("name").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            sdk.get("version").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
        );
    }
}

/// Parses decoded bytes as JSON and stores the result. A parse failure still
/// stores a placeholder record (so the submission stays visible), then
/// propagates the error to answer the request with a server error.
fn store_json_body(
    state: &router::State,
    project_id: u64,
    decoded: &Bytes,
    endpoint: &'static str,
) -> Result<Uuid, IngestError> {
    match serde_json::from_slice::<Value>(decoded) {
        Ok(value) => {
            log_event_details(&value, project_id);
            let event_id = state
                .store
                .add(project_id, None, None, EventBody::from_json(value));
            report_stored_events(endpoint, 1);
            tracing::info!(%event_id, project_id, "stored event; GET /api/event/{}", event_id);
            Ok(event_id)
        }
        Err(err) => {
            let event_id = state
                .store
                .add(project_id, None, None, EventBody::decode_failure());
            report_decode_failure(endpoint);
            tracing::error!(%event_id, project_id, "failed to JSON-decode body: {}", err);
            tracing::error!(%event_id, "raw body: {}", String::from_utf8_lossy(decoded));
            Err(IngestError::RequestParsingError(err))
        }
    }
}

#[instrument(skip_all)]
pub async fn store_event(
    state: State<router::State>,
    Path(project_id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StoreResponse>, IngestError> {
    tracing::info!("POST /api/{}/store/", project_id);
    log_headers(state.dev_mode, project_id, &headers);

    let decoded = decompress(&body, content_encoding(&headers)).map_err(|err| {
        tracing::error!(project_id, "raw body: {}", String::from_utf8_lossy(&body));
        err
    })?;
    store_json_body(&state, project_id, &decoded, "store")?;

    Ok(Json(StoreResponse { success: true }))
}

#[instrument(skip_all)]
pub async fn store_envelope(
    state: State<router::State>,
    Path(project_id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StoreResponse>, IngestError> {
    tracing::info!("POST /api/{}/envelope/", project_id);
    log_headers(state.dev_mode, project_id, &headers);

    let decoded = decompress(&body, content_encoding(&headers)).map_err(|err| {
        tracing::error!(project_id, "raw body: {}", String::from_utf8_lossy(&body));
        err
    })?;

    let mut stored = 0usize;
    for item in EnvelopeParser::new(decoded) {
        // A failure here keeps the items already stored from this envelope.
        let item = item.map_err(|err| {
            report_decode_failure("envelope");
            tracing::error!(
                project_id,
                "failed to parse envelope after {} items: {}",
                stored,
                err
            );
            err
        })?;

        if let ItemBody::Json(value) = &item.body {
            log_event_details(value, project_id);
        }

        let event_id = state.store.add(
            project_id,
            Some(item.envelope_header),
            Some(item.header),
            EventBody::from_item_body(item.body),
        );
        report_stored_events("envelope", 1);
        tracing::info!(%event_id, project_id, "stored envelope item; GET /api/event/{}", event_id);
        stored += 1;
    }

    Ok(Json(StoreResponse { success: true }))
}

#[instrument(skip_all)]
pub async fn store_security(
    state: State<router::State>,
    Path(project_id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StoreResponse>, IngestError> {
    tracing::info!("POST /api/{}/security/", project_id);
    log_headers(state.dev_mode, project_id, &headers);

    let decoded = decompress(&body, content_encoding(&headers)).map_err(|err| {
        tracing::error!(project_id, "raw body: {}", String::from_utf8_lossy(&body));
        err
    })?;
    store_json_body(&state, project_id, &decoded, "security")?;

    Ok(Json(StoreResponse { success: true }))
}

pub async fn get_event(
    state: State<router::State>,
    Path(event_id): Path<String>,
) -> Result<Json<EventResponse>, IngestError> {
    tracing::info!("GET /api/event/{}", event_id);

    // Anything that does not parse as an id cannot be stored, so it gets the
    // same not-found answer as an unknown id.
    let found = Uuid::parse_str(&event_id)
        .ok()
        .and_then(|id| state.store.get(id));
    match found {
        Some(event) => Ok(Json(EventResponse::from(event))),
        None => Err(IngestError::EventNotFound(event_id)),
    }
}

pub async fn list_events(state: State<router::State>) -> Json<EventListResponse> {
    tracing::info!("GET /api/eventlist/");
    let events = state.store.list().iter().map(EventSummary::from).collect();
    Json(EventListResponse { events })
}

pub async fn flush(state: State<router::State>) -> Json<StoreResponse> {
    tracing::info!("POST /api/flush/");
    state.store.flush();
    Json(StoreResponse { success: true })
}
