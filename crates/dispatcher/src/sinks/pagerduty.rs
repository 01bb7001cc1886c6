//! PagerDutySink - Events API v2 trigger

use std::future::ready;

use contracts::{ContractError, DataSink, DeliveryError, Envelope, PagerDutyConfig};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::retry::{DeliveryTarget, RetryPolicy};
use crate::transport::{HttpRequest, HttpTransport};

/// Events API accepts with 202
pub const PAGERDUTY_SUCCESS_STATUS: u16 = 202;

const EVENT_ACTION_TRIGGER: &str = "trigger";

#[derive(Debug, Serialize)]
struct EventPayload<'a> {
    summary: String,
    source: &'a str,
    severity: &'a str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct Event<'a> {
    routing_key: &'a str,
    event_action: &'static str,
    payload: EventPayload<'a>,
}

/// Sink raising one trigger event per envelope
pub struct PagerDutySink<T> {
    name: String,
    url: String,
    routing_key: String,
    severity: String,
    transport: T,
    policy: RetryPolicy,
}

impl<T> PagerDutySink<T> {
    pub fn new(name: impl Into<String>, config: &PagerDutyConfig, transport: T) -> Self {
        Self {
            name: name.into(),
            url: config.endpoint().to_string(),
            routing_key: config.integration_key.clone(),
            severity: config.severity.clone(),
            transport,
            policy: RetryPolicy::rate_limited(PAGERDUTY_SUCCESS_STATUS),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialized event body
    pub fn payload(&self, envelope: &Envelope) -> Result<String, DeliveryError> {
        let event = Event {
            routing_key: &self.routing_key,
            event_action: EVENT_ACTION_TRIGGER,
            payload: EventPayload {
                summary: format!("{}: {}", envelope.topic(), envelope.payload_str()),
                source: envelope.topic(),
                severity: &self.severity,
                timestamp: envelope.rfc3339_nano(),
            },
        };
        serde_json::to_string(&event).map_err(|e| DeliveryError::build(&self.name, e.to_string()))
    }
}

impl<T: HttpTransport + Sync> DataSink for PagerDutySink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "pagerduty_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, topic = envelope.topic())
    )]
    async fn write(&mut self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let body = self.payload(envelope)?;
        let request = HttpRequest::json(&self.url, body.clone());
        let target = DeliveryTarget {
            sink: &self.name,
            url: &self.url,
            payload: &body,
        };

        let state = self
            .policy
            .execute(&self.transport, &target, || ready(Ok(request.clone())))
            .await?;
        debug!(calls = state.calls, "PagerDuty event accepted");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
