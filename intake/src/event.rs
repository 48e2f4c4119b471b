//! Transport decoding and the normalized event record.
//!
//! Request bodies arrive optionally compressed and in several shapes:
//! exception reports, plain messages, CSP violation reports (legacy object
//! or modern list form), or opaque attachment bytes. Everything is stored as
//! an [`EventBody`] and summarized on demand for the list endpoint.

use std::io::Read;

use base64::Engine as _;
use bytes::{Buf, Bytes};
use flate2::read::{GzDecoder, ZlibDecoder};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::IngestError;
use crate::envelope::ItemBody;

const NO_SUMMARY: &str = "no summary";
const NO_TIMESTAMP: &str = "none";

/// Stored in place of a body that declared JSON but failed to parse, so the
/// failed submission stays visible on the list endpoints.
pub const DECODE_FAILURE: &str = "could not decode body; see logs";

/// Reverses the transport encoding of a request body. Unrecognized or absent
/// encodings pass the bytes through unchanged.
pub fn decompress(body: &Bytes, content_encoding: Option<&str>) -> Result<Bytes, IngestError> {
    match content_encoding {
        Some("gzip") => {
            let mut decoded = Vec::new();
            GzDecoder::new(body.clone().reader())
                .read_to_end(&mut decoded)
                .map_err(|e| {
                    tracing::error!("failed to decode gzip body: {}", e);
                    IngestError::RequestDecodingError(String::from("invalid gzip data"))
                })?;
            Ok(Bytes::from(decoded))
        }
        Some("deflate") => {
            let mut decoded = Vec::new();
            ZlibDecoder::new(body.clone().reader())
                .read_to_end(&mut decoded)
                .map_err(|e| {
                    tracing::error!("failed to decode deflate body: {}", e);
                    IngestError::RequestDecodingError(String::from("invalid deflate data"))
                })?;
            Ok(Bytes::from(decoded))
        }
        _ => Ok(body.clone()),
    }
}

/// The decoded body of a stored event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// A JSON object: exception report, message event, legacy CSP report...
    Object(Map<String, Value>),
    /// A JSON list, e.g. a modern CSP report.
    List(Vec<Value>),
    /// A JSON scalar at the top level. Valid, but carries no known shape.
    Scalar(Value),
    /// Raw attachment bytes, never parsed.
    Bytes(Bytes),
    /// Placeholder recorded when JSON decoding failed.
    DecodeError(String),
}

impl EventBody {
    pub fn from_json(value: Value) -> EventBody {
        match value {
            Value::Object(fields) => EventBody::Object(fields),
            Value::Array(entries) => EventBody::List(entries),
            other => EventBody::Scalar(other),
        }
    }

    pub fn from_item_body(body: ItemBody) -> EventBody {
        match body {
            ItemBody::Json(value) => EventBody::from_json(value),
            ItemBody::Bytes(raw) => EventBody::Bytes(raw),
        }
    }

    pub fn decode_failure() -> EventBody {
        EventBody::DecodeError(String::from(DECODE_FAILURE))
    }

    /// One-line display string for the list endpoint, derived on demand.
    ///
    /// First match wins: empty body, decode-failure placeholder, exception
    /// report, plain message, legacy CSP report, modern CSP report list.
    /// Missing nested fields degrade to "unknown" rather than failing.
    pub fn summary(&self) -> String {
        match self {
            EventBody::DecodeError(reason) => reason.clone(),
            EventBody::Object(fields) => {
                if fields.is_empty() {
                    return String::from(NO_SUMMARY);
                }
                if let Some(reason) = fields.get("error").and_then(Value::as_str) {
                    return reason.to_string();
                }
                if let Some(first) = fields
                    .get("exception")
                    .and_then(|e| e.get("values"))
                    .and_then(Value::as_array)
                    .and_then(|values| values.first())
                {
                    return format!(
                        "{}: {}",
                        first.get("type").and_then(Value::as_str).unwrap_or("unknown"),
                        first.get("value").and_then(Value::as_str).unwrap_or("unknown"),
                    );
                }
                if let Some(message) = fields
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|message| !message.is_empty())
                {
                    return message.to_string();
                }
                if let Some(report) = fields.get("csp-report") {
                    let directive = report
                        .get("violated-directive")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    return format!("csp-report: {directive}");
                }
                String::from(NO_SUMMARY)
            }
            EventBody::List(reports) => match reports.first() {
                Some(first)
                    if first.get("type").and_then(Value::as_str) == Some("csp-violation") =>
                {
                    let directives: Vec<&str> = reports
                        .iter()
                        .map(|report| {
                            report
                                .get("body")
                                .and_then(|body| body.get("effectiveDirective"))
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                        })
                        .collect();
                    format!("csp-report: {}", directives.join(", "))
                }
                _ => String::from(NO_SUMMARY),
            },
            EventBody::Scalar(_) | EventBody::Bytes(_) => String::from(NO_SUMMARY),
        }
    }

    /// The payload's own `timestamp` field, passed through as an opaque
    /// string. Never parsed or validated here.
    pub fn timestamp(&self) -> String {
        match self {
            EventBody::Object(fields) => fields
                .get("timestamp")
                .and_then(Value::as_str)
                .unwrap_or(NO_TIMESTAMP)
                .to_string(),
            _ => String::from(NO_TIMESTAMP),
        }
    }
}

impl Serialize for EventBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EventBody::Object(fields) => fields.serialize(serializer),
            EventBody::List(entries) => entries.serialize(serializer),
            EventBody::Scalar(value) => value.serialize(serializer),
            // JSON cannot carry raw bytes; attachments are base64-encoded on
            // the way out and stay byte-exact in memory.
            EventBody::Bytes(raw) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(raw))
            }
            EventBody::DecodeError(reason) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", reason)?;
                map.end()
            }
        }
    }
}

/// A normalized, stored event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub project_id: u64,
    pub event_id: Uuid,
    /// Shared header of the envelope this event arrived in, if any.
    pub envelope_header: Option<Value>,
    /// Item header of the envelope item this event arrived in, if any.
    pub header: Option<Value>,
    pub body: EventBody,
}

impl Event {
    pub fn summary(&self) -> String {
        self.body.summary()
    }

    pub fn timestamp(&self) -> String {
        self.body.timestamp()
    }
}
