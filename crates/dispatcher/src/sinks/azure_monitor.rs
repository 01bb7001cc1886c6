//! AzureMonitorSink - Logs Ingestion API
//!
//! Records are posted as a single-element JSON array to the data collection
//! rule stream. Any failure (status or network) counts against a small
//! attempt budget and is retried immediately.

use contracts::{AzureMonitorConfig, ContractError, DataSink, DeliveryError, Envelope, TokenProvider};
use tracing::{debug, instrument};

use super::LogRecord;
use crate::retry::{DeliveryTarget, RetryPolicy, MAX_INGESTION_ATTEMPTS};
use crate::transport::{HttpRequest, HttpTransport};

/// Sink uploading one record per envelope to a DCR stream
pub struct AzureMonitorSink<T, P> {
    name: String,
    url: String,
    transport: T,
    tokens: P,
    policy: RetryPolicy,
}

impl<T, P> AzureMonitorSink<T, P> {
    pub fn new(name: impl Into<String>, config: &AzureMonitorConfig, transport: T, tokens: P) -> Self {
        Self {
            name: name.into(),
            url: config.ingestion_url(),
            transport,
            tokens,
            policy: RetryPolicy::any_failure_bounded(MAX_INGESTION_ATTEMPTS),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialized single-record array; timestamp keeps the receive offset
    pub fn payload(&self, envelope: &Envelope) -> Result<String, DeliveryError> {
        let records = [LogRecord {
            time_generated: envelope.rfc3339_nano(),
            topic: envelope.topic(),
            message: envelope.payload_str(),
        }];
        serde_json::to_string(&records).map_err(|e| DeliveryError::build(&self.name, e.to_string()))
    }
}

impl<T: HttpTransport + Sync, P: TokenProvider + Sync> AzureMonitorSink<T, P> {
    /// Bearer-authenticated request for `body`
    pub async fn build_request(&self, body: &str) -> Result<HttpRequest, DeliveryError> {
        let token = self
            .tokens
            .acquire_token()
            .await
            .map_err(|e| DeliveryError::build(&self.name, e.to_string()))?;
        Ok(HttpRequest::json(&self.url, body.to_string())
            .header("Authorization", format!("Bearer {}", token.secret())))
    }
}

impl<T: HttpTransport + Sync, P: TokenProvider + Sync> DataSink for AzureMonitorSink<T, P> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "azure_monitor_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, topic = envelope.topic())
    )]
    async fn write(&mut self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let body = self.payload(envelope)?;
        let this = &*self;
        let body_ref = body.as_str();
        let target = DeliveryTarget {
            sink: &this.name,
            url: &this.url,
            payload: body_ref,
        };

        let state = this
            .policy
            .execute(&this.transport, &target, move || this.build_request(body_ref))
            .await?;
        debug!(calls = state.calls, "Log record uploaded");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::StaticTokenProvider;
    use crate::transport::{MockTransport, TransportError};
    use chrono::{FixedOffset, TimeZone, Timelike};
    use contracts::AccessToken;

    fn config() -> AzureMonitorConfig {
        AzureMonitorConfig {
            topic: "#".into(),
            data_collection_endpoint: "https://dce.test/".into(),
            immutable_id: "dcr-abc".into(),
            stream_name: "Custom-MQTT_CL".into(),
            access_token: Some("tok".into()),
            token_command: None,
            token_cache_secs: 300,
        }
    }

    fn envelope() -> Envelope {
        let ts = FixedOffset::east_opt(10 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
            .unwrap()
            .with_nanosecond(120_000_000)
            .unwrap();
        Envelope::with_timestamp(ts, "plant/line1", "stopped".to_string())
    }

    fn sink(mock: &MockTransport) -> AzureMonitorSink<MockTransport, StaticTokenProvider> {
        AzureMonitorSink::new(
            "azure_monitor[0]",
            &config(),
            mock.clone(),
            StaticTokenProvider::new("tok"),
        )
    }

    struct FailingTokens;

    impl TokenProvider for FailingTokens {
        async fn acquire_token(&self) -> Result<AccessToken, ContractError> {
            Err(ContractError::credential("not logged in"))
        }
    }

    #[test]
    fn test_ingestion_url() {
        let sink = sink(&MockTransport::new());
        assert_eq!(
            sink.url(),
            "https://dce.test/dataCollectionRules/dcr-abc/streams/Custom-MQTT_CL?api-version=2023-01-01"
        );
    }

    #[test]
    fn test_body_is_single_element_array() {
        let sink = sink(&MockTransport::new());
        assert_eq!(
            sink.payload(&envelope()).unwrap(),
            r#"[{"TimeGenerated":"2024-06-01T08:00:00.12+10:00","Topic":"plant/line1","Message":"stopped"}]"#
        );
    }

    #[tokio::test]
    async fn test_bearer_token_and_any_2xx() {
        let mock = MockTransport::always_status(204);
        let mut sink = sink(&mock);

        sink.write(&envelope()).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header_value("Authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_any_failure_retried_immediately_then_exhausted() {
        let mock = MockTransport::new();
        mock.push_status(500)
            .push_error(TransportError::other("dns"))
            .push_status(401);
        let mut sink = sink(&mock);

        let err = sink.write(&envelope()).await.unwrap_err();

        assert_eq!(err.kind(), "exhausted");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let mock = MockTransport::new();
        mock.push_status(500).push_status(500).push_status(204);
        let mut sink = sink(&mock);

        sink.write(&envelope()).await.unwrap();
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_token_failure_is_terminal() {
        let mock = MockTransport::always_status(204);
        let mut sink = AzureMonitorSink::new("azure_monitor[0]", &config(), mock.clone(), FailingTokens);

        let err = sink.write(&envelope()).await.unwrap_err();

        assert_eq!(err.kind(), "build");
        assert!(err.to_string().contains("not logged in"));
        assert_eq!(mock.call_count(), 0);
    }
}
