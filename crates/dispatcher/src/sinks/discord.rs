//! DiscordSink - chat webhook delivery

use std::future::ready;

use contracts::{ContractError, DataSink, DeliveryError, DiscordConfig, Envelope};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::retry::{DeliveryTarget, RetryPolicy};
use crate::transport::{HttpRequest, HttpTransport};

/// Webhook accepts with 204 No Content
pub const DISCORD_SUCCESS_STATUS: u16 = 204;

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
}

/// Sink posting `HH:MM:SS topic: `payload`` to a chat webhook
pub struct DiscordSink<T> {
    name: String,
    webhook: String,
    transport: T,
    policy: RetryPolicy,
}

impl<T> DiscordSink<T> {
    pub fn new(name: impl Into<String>, config: &DiscordConfig, transport: T) -> Self {
        Self {
            name: name.into(),
            webhook: config.webhook.clone(),
            transport,
            policy: RetryPolicy::rate_limited(DISCORD_SUCCESS_STATUS),
        }
    }

    /// Message text, time of day in the receive offset
    pub fn format_content(envelope: &Envelope) -> String {
        format!(
            "{} {}: `{}`",
            envelope.received_at().format("%H:%M:%S"),
            envelope.topic(),
            envelope.payload_str()
        )
    }

    /// Serialized webhook body
    pub fn payload(&self, envelope: &Envelope) -> Result<String, DeliveryError> {
        let message = WebhookMessage {
            content: Self::format_content(envelope),
        };
        serde_json::to_string(&message).map_err(|e| DeliveryError::build(&self.name, e.to_string()))
    }
}

impl<T: HttpTransport + Sync> DataSink for DiscordSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "discord_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, topic = envelope.topic())
    )]
    async fn write(&mut self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let body = self.payload(envelope)?;
        let request = HttpRequest::json(&self.webhook, body.clone());
        let target = DeliveryTarget {
            sink: &self.name,
            url: &self.webhook,
            payload: &body,
        };

        let state = self
            .policy
            .execute(&self.transport, &target, || ready(Ok(request.clone())))
            .await?;
        debug!(calls = state.calls, "Discord message delivered");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RATE_LIMIT_RESET_HEADER;
    use crate::transport::{HttpResponse, MockTransport};
    use chrono::{FixedOffset, TimeZone};
    use std::time::Duration;
    use tokio::time::Instant;

    fn envelope(topic: &str, payload: &str) -> Envelope {
        let ts = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 14, 5, 9)
            .unwrap();
        Envelope::with_timestamp(ts, topic, payload.to_string())
    }

    fn config() -> DiscordConfig {
        DiscordConfig {
            topic: "alerts/#".into(),
            webhook: "https://discord.test/hook".into(),
        }
    }

    #[test]
    fn test_content_format() {
        let content = DiscordSink::<MockTransport>::format_content(&envelope("alerts/cpu", "high"));
        assert_eq!(content, "14:05:09 alerts/cpu: `high`");
    }

    #[tokio::test]
    async fn test_post_body_and_headers() {
        let mock = MockTransport::always_status(204);
        let mut sink = DiscordSink::new("discord[0]", &config(), mock.clone());

        sink.write(&envelope("alerts/cpu", "high")).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://discord.test/hook");
        assert_eq!(
            requests[0].header_value("Content-Type"),
            Some("application/json")
        );
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "content": "14:05:09 alerts/cpu: `high`" })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_reset_after_waits_floor() {
        let mock = MockTransport::new();
        mock.push_response(HttpResponse::new(429).with_header(RATE_LIMIT_RESET_HEADER, "0"))
            .push_status(204);
        let mut sink = DiscordSink::new("discord[0]", &config(), mock.clone());
        let start = Instant::now();

        sink.write(&envelope("a", "b")).await.unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_server_error_is_rejected_with_payload() {
        let mock = MockTransport::new();
        mock.push_response(HttpResponse::new(500).with_body("boom"));
        let mut sink = DiscordSink::new("discord[0]", &config(), mock.clone());

        let err = sink.write(&envelope("a", "b")).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(err.sink(), "discord[0]");
        assert!(err.to_string().contains("POST data was"));
        assert!(err.to_string().contains("`b`"));
        assert_eq!(mock.call_count(), 1);
    }
}
