//! Envelope - Dispatcher output
//!
//! A raw bus message wrapped with the moment it was received.

use std::borrow::Cow;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Unit of work flowing from the dispatcher to a sink worker
///
/// Immutable once created. The receipt time keeps the offset of the host
/// clock so that sinks rendering wall-clock strings match the host's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    received_at: DateTime<FixedOffset>,
    topic: String,
    payload: Bytes,
}

impl Envelope {
    /// Stamp a message with the current local time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::with_timestamp(Local::now().fixed_offset(), topic, payload)
    }

    /// Build an envelope with an explicit receipt time
    pub fn with_timestamp(
        received_at: DateTime<FixedOffset>,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            received_at,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn received_at(&self) -> DateTime<FixedOffset> {
        self.received_at
    }

    pub fn received_at_utc(&self) -> DateTime<Utc> {
        self.received_at.with_timezone(&Utc)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload decoded as UTF-8, invalid sequences replaced
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// RFC 3339 timestamp with nanoseconds, trailing zeros trimmed
    ///
    /// `2024-05-01T12:30:45.5+02:00`, `2024-05-01T12:30:45Z`
    pub fn rfc3339_nano(&self) -> String {
        rfc3339_nano(&self.received_at)
    }
}

/// Format a timestamp as RFC 3339 with up to nine fractional digits
pub fn rfc3339_nano(ts: &DateTime<FixedOffset>) -> String {
    let full = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);
    // "YYYY-MM-DDTHH:MM:SS" is 19 bytes, followed by '.' and 9 digits
    match full.get(..29).zip(full.get(29..)) {
        Some((head, offset)) => {
            let head = head.trim_end_matches('0').trim_end_matches('.');
            format!("{head}{offset}")
        }
        None => full,
    }
}
