//! LogAnalyticsSink - HTTP Data Collector API
//!
//! Each request is signed with HMAC-SHA256 over
//! `POST\n<len>\napplication/json\nx-ms-date:<date>\n/api/logs` using the
//! base64-decoded workspace key. The date is taken when the request is built,
//! so every retry carries a fresh signature.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use contracts::{ContractError, DataSink, DeliveryError, Envelope, LogAnalyticsConfig};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::ready;
use tracing::{debug, instrument};

use super::LogRecord;
use crate::error::DispatcherError;
use crate::retry::{DeliveryTarget, RetryPolicy};
use crate::transport::{HttpRequest, HttpTransport};

/// Collector accepts with 200
pub const LOG_ANALYTICS_SUCCESS_STATUS: u16 = 200;

/// Column the service reads the record time from
pub const TIME_GENERATED_FIELD: &str = "TimeGenerated";

const RESOURCE: &str = "/api/logs";

/// Wall clock used for the `x-ms-date` header
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// RFC 1123 date with a literal GMT zone
pub fn rfc1123_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// String covered by the SharedKey signature
pub fn string_to_sign(content_length: usize, date: &str) -> String {
    format!("POST\n{content_length}\napplication/json\nx-ms-date:{date}\n{RESOURCE}")
}

/// Base64 HMAC-SHA256 of `message`
pub fn sign(message: &str, key: &[u8]) -> Result<String, String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| e.to_string())?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Sink writing one record per envelope to a custom log table
pub struct LogAnalyticsSink<T> {
    name: String,
    url: String,
    workspace_id: String,
    custom_log_name: String,
    key: Vec<u8>,
    transport: T,
    policy: RetryPolicy,
    clock: Clock,
}

impl<T> LogAnalyticsSink<T> {
    /// Create a sink; fails when the shared key is not base64
    pub fn new(
        name: impl Into<String>,
        config: &LogAnalyticsConfig,
        transport: T,
    ) -> Result<Self, DispatcherError> {
        let name = name.into();
        let key = STANDARD
            .decode(config.shared_key.trim())
            .map_err(|e| DispatcherError::sink_creation(&name, format!("invalid shared_key: {e}")))?;

        Ok(Self {
            name,
            url: config.endpoint(),
            workspace_id: config.workspace_id.clone(),
            custom_log_name: config.custom_log_name.clone(),
            key,
            transport,
            policy: RetryPolicy::unavailable_bounded(LOG_ANALYTICS_SUCCESS_STATUS),
            clock: Box::new(Utc::now),
        })
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialized record; timestamp in UTC with millisecond precision
    pub fn payload(&self, envelope: &Envelope) -> Result<String, DeliveryError> {
        let record = LogRecord {
            time_generated: envelope
                .received_at_utc()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            topic: envelope.topic(),
            message: envelope.payload_str(),
        };
        serde_json::to_string(&record).map_err(|e| DeliveryError::build(&self.name, e.to_string()))
    }

    /// Signed request for `body`, dated now
    pub fn build_request(&self, body: &str) -> Result<HttpRequest, DeliveryError> {
        let date = rfc1123_date((self.clock)());
        let signature = sign(&string_to_sign(body.len(), &date), &self.key)
            .map_err(|e| DeliveryError::build(&self.name, e))?;

        Ok(HttpRequest::json(&self.url, body.to_string())
            .header("Log-Type", &self.custom_log_name)
            .header(
                "Authorization",
                format!("SharedKey {}:{}", self.workspace_id, signature),
            )
            .header("x-ms-date", date)
            .header("time-generated-field", TIME_GENERATED_FIELD))
    }
}

impl<T: HttpTransport + Sync> DataSink for LogAnalyticsSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_analytics_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, topic = envelope.topic())
    )]
    async fn write(&mut self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let body = self.payload(envelope)?;
        let target = DeliveryTarget {
            sink: &self.name,
            url: &self.url,
            payload: &body,
        };

        let state = self
            .policy
            .execute(&self.transport, &target, || ready(self.build_request(&body)))
            .await?;
        debug!(calls = state.calls, "Log record ingested");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
