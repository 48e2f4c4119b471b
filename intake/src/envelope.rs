//! Parser for the newline-delimited envelope transport format.
//!
//! An envelope is a single JSON header line followed by zero or more items,
//! each an item-header line plus a body. Bodies either carry an explicit
//! `length` in bytes (binary-safe, may contain newlines) or run to the next
//! newline / end of input.
//!
//! See: https://develop.sentry.dev/sdk/envelopes/

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("malformed envelope header: {0}")]
    InvalidEnvelopeHeader(#[source] serde_json::Error),
    #[error("malformed item header: {0}")]
    InvalidItemHeader(#[source] serde_json::Error),
    #[error("item header is not a JSON object")]
    ItemHeaderNotAnObject,
    #[error("malformed item body: {0}")]
    InvalidItemBody(#[source] serde_json::Error),
    #[error("item length {length} overruns the envelope ({remaining} bytes left)")]
    TruncatedItem { length: usize, remaining: usize },
}

/// Body of a single envelope item. Attachments stay raw, everything else is
/// decoded JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemBody {
    Json(Value),
    Bytes(Bytes),
}

/// One parsed unit of an envelope. Every item of an envelope shares the same
/// envelope header.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub envelope_header: Value,
    pub header: Value,
    pub body: ItemBody,
}

/// Lazy, non-restartable iterator over the items of one envelope payload.
///
/// Yields `Result` per item: a malformed header line or item body is
/// terminal, but items yielded before the failure remain valid.
pub struct EnvelopeParser {
    buf: Bytes,
    cursor: usize,
    envelope_header: Option<Value>,
    done: bool,
}

impl EnvelopeParser {
    pub fn new(buf: Bytes) -> EnvelopeParser {
        EnvelopeParser {
            buf,
            cursor: 0,
            envelope_header: None,
            done: false,
        }
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.buf.len()
    }

    /// Bytes from the cursor up to the next `\n` (exclusive) or end of
    /// input. Advances the cursor past the newline when one exists.
    fn take_until_newline(&mut self) -> Bytes {
        let start = self.cursor;
        match self.buf[start..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                self.cursor = start + offset + 1;
                self.buf.slice(start..start + offset)
            }
            None => {
                self.cursor = self.buf.len();
                self.buf.slice(start..)
            }
        }
    }

    /// A header line. `\r\n` counts as a single terminator here, unlike in
    /// binary body spans where `\r` is data.
    fn take_header_line(&mut self) -> Bytes {
        let line = self.take_until_newline();
        match line.last() {
            Some(b'\r') => line.slice(..line.len() - 1),
            _ => line,
        }
    }

    /// Skips exactly one line terminator after an explicit-length body, if
    /// present.
    fn skip_separator(&mut self) {
        let rest = &self.buf[self.cursor..];
        if rest.starts_with(b"\r\n") {
            self.cursor += 2;
        } else if rest.starts_with(b"\n") {
            self.cursor += 1;
        }
    }

    fn next_item(&mut self) -> Result<Option<Item>, EnvelopeError> {
        if self.at_end() {
            return Ok(None);
        }

        let envelope_header = match self.envelope_header.clone() {
            Some(header) => header,
            None => {
                let line = self.take_header_line();
                let header: Value = serde_json::from_slice(&line)
                    .map_err(EnvelopeError::InvalidEnvelopeHeader)?;
                self.envelope_header = Some(header.clone());
                header
            }
        };

        if self.at_end() {
            return Ok(None);
        }

        let line = self.take_header_line();
        let header: Value =
            serde_json::from_slice(&line).map_err(EnvelopeError::InvalidItemHeader)?;
        if !header.is_object() {
            return Err(EnvelopeError::ItemHeaderNotAnObject);
        }

        let span = match header.get("length").and_then(Value::as_i64) {
            Some(length) if length >= 0 => {
                let length = length as usize;
                let remaining = self.buf.len() - self.cursor;
                if length > remaining {
                    return Err(EnvelopeError::TruncatedItem { length, remaining });
                }
                let span = self.buf.slice(self.cursor..self.cursor + length);
                self.cursor += length;
                self.skip_separator();
                span
            }
            // No usable length field: the body runs to the next newline or
            // end of input.
            _ => self.take_until_newline(),
        };

        let body = if header.get("type").and_then(Value::as_str) == Some("attachment") {
            ItemBody::Bytes(span)
        } else {
            ItemBody::Json(
                serde_json::from_slice(&span).map_err(EnvelopeError::InvalidItemBody)?,
            )
        };

        Ok(Some(Item {
            envelope_header,
            header,
            body,
        }))
    }
}

impl Iterator for EnvelopeParser {
    type Item = Result<Item, EnvelopeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
