//! Response shapes and the request error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::EnvelopeError;
use crate::event::{Event, EventBody};

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct EventPayload {
    pub envelope_header: Option<Value>,
    pub header: Option<Value>,
    pub body: EventBody,
}

/// Full record shape returned by the lookup-by-id endpoint.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub project_id: u64,
    pub event_id: Uuid,
    pub payload: EventPayload,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> EventResponse {
        EventResponse {
            project_id: event.project_id,
            event_id: event.event_id,
            payload: EventPayload {
                envelope_header: event.envelope_header,
                header: event.header,
                body: event.body,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub project_id: u64,
    pub event_id: Uuid,
    pub summary: String,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> EventSummary {
        EventSummary {
            project_id: event.project_id,
            event_id: event.event_id,
            summary: event.summary(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventSummary>,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to decode request body: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request body: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("failed to parse envelope: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("Event {0} not found")]
    EventNotFound(String),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::EventNotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": self.to_string()})),
            )
                .into_response(),

            // Decode and parse failures are local to one request; they are
            // surfaced to the caller but never crash the process.
            IngestError::RequestDecodingError(_)
            | IngestError::RequestParsingError(_)
            | IngestError::Envelope(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}
