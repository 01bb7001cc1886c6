//! Dispatcher - routes bus envelopes to the sinks whose topic filter matches

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{BridgeConfig, Envelope, SinkConfig, SinkKind};
use observability::{DeliveryAggregator, DeliverySummary};

use crate::error::DispatcherError;
use crate::handle::{SharedStats, SinkHandle};
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{
    AzureMonitorSink, ConsoleSink, DiscordSink, LogAnalyticsSink, PagerDutySink, TokenSource,
};
use crate::supervisor::FailureReporter;
use crate::topic;
use crate::transport::ReqwestTransport;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations, in routing order
    pub sinks: Vec<SinkConfig>,
    /// Total timeout of one HTTP call
    pub http_timeout: Duration,
    /// Log every routed envelope at info level
    pub debug: bool,
}

impl DispatcherConfig {
    pub fn from_bridge(config: &BridgeConfig) -> Self {
        Self {
            sinks: config.sink_configs(),
            http_timeout: Duration::from_secs(config.http_timeout_secs),
            debug: config.debug,
        }
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::UnboundedReceiver<Envelope>,
    reporter: FailureReporter,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self {
            config,
            input_rx,
            reporter: FailureReporter::detached(),
        }
    }

    /// Where terminal sink failures are sent
    pub fn reporter(mut self, reporter: FailureReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the sinks and start their workers
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.config.sinks.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let transport = ReqwestTransport::new(self.config.http_timeout)?;
        let stats: SharedStats = Arc::new(Mutex::new(DeliveryAggregator::new()));

        let mut routes = Vec::with_capacity(self.config.sinks.len());
        for sink_config in &self.config.sinks {
            let handle =
                create_sink_handle(sink_config, &transport, &self.reporter, Arc::clone(&stats))?;
            routes.push(Route {
                filter: sink_config.topic.clone(),
                handle,
            });
        }

        Ok(Dispatcher {
            routes,
            input_rx: self.input_rx,
            stats,
            debug: self.config.debug,
        })
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config, transport, reporter, stats),
    fields(sink = %config.name, sink_type = config.kind.label())
)]
fn create_sink_handle(
    config: &SinkConfig,
    transport: &ReqwestTransport,
    reporter: &FailureReporter,
    stats: SharedStats,
) -> Result<SinkHandle, DispatcherError> {
    let reporter = reporter.clone();
    let transport = transport.clone();
    let handle = match &config.kind {
        SinkKind::Discord(discord) => SinkHandle::spawn(
            DiscordSink::new(&config.name, discord, transport),
            reporter,
            stats,
        ),
        SinkKind::PagerDuty(pagerduty) => SinkHandle::spawn(
            PagerDutySink::new(&config.name, pagerduty, transport),
            reporter,
            stats,
        ),
        SinkKind::LogAnalytics(log_analytics) => SinkHandle::spawn(
            LogAnalyticsSink::new(&config.name, log_analytics, transport)?,
            reporter,
            stats,
        ),
        SinkKind::AzureMonitor(azure_monitor) => SinkHandle::spawn(
            AzureMonitorSink::new(
                &config.name,
                azure_monitor,
                transport,
                TokenSource::from_config(azure_monitor),
            ),
            reporter,
            stats,
        ),
        SinkKind::Stdout(_) => SinkHandle::spawn(ConsoleSink::new(&config.name), reporter, stats),
    };
    debug!(filter = %config.topic, "Sink started");
    Ok(handle)
}

struct Route {
    filter: String,
    handle: SinkHandle,
}

/// The main Dispatcher that routes envelopes to sinks
pub struct Dispatcher {
    routes: Vec<Route>,
    input_rx: mpsc::UnboundedReceiver<Envelope>,
    stats: SharedStats,
    debug: bool,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    ///
    /// Each handle is paired with its topic filter.
    pub fn with_handles(
        handles: Vec<(String, SinkHandle)>,
        input_rx: mpsc::UnboundedReceiver<Envelope>,
        stats: SharedStats,
    ) -> Self {
        let routes = handles
            .into_iter()
            .map(|(filter, handle)| Route { filter, handle })
            .collect();
        Self {
            routes,
            input_rx,
            stats,
            debug: false,
        }
    }

    pub fn sink_count(&self) -> usize {
        self.routes.len()
    }

    /// Live metrics of every sink, usable after the dispatcher is spawned
    pub fn sink_metrics(&self) -> Vec<(String, Arc<SinkMetrics>)> {
        self.routes
            .iter()
            .map(|r| (r.handle.name().to_string(), Arc::clone(r.handle.metrics())))
            .collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.routes
            .iter()
            .map(|r| (r.handle.name().to_string(), r.handle.metrics().snapshot()))
            .collect()
    }

    /// Shared delivery totals
    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    pub fn summary(&self) -> DeliverySummary {
        summarize(&self.stats)
    }

    /// Run the dispatcher main loop
    ///
    /// Routes envelopes until the input channel is closed, then lets every
    /// sink drain its queue.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) {
        info!(sinks = self.routes.len(), "Dispatcher started");

        let mut envelope_count: u64 = 0;

        while let Some(envelope) = self.input_rx.recv().await {
            envelope_count += 1;
            self.route(envelope);

            if envelope_count.is_multiple_of(100) {
                debug!(envelopes = envelope_count, "Dispatcher progress");
            }
        }

        info!(
            envelopes = envelope_count,
            "Dispatcher input closed, shutting down"
        );

        Self::shutdown_routes(self.routes).await;

        info!("Dispatcher shutdown complete");
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Enqueue `envelope` on every matching sink; returns how many took it
    pub fn route(&self, envelope: Envelope) -> usize {
        let mut routed = 0;
        for route in &self.routes {
            if !topic::matches(&route.filter, envelope.topic()) {
                continue;
            }
            if route.handle.enqueue(envelope.clone()) {
                routed += 1;
            } else {
                debug!(
                    sink = route.handle.name(),
                    topic = envelope.topic(),
                    "Sink stopped, envelope not routed"
                );
            }
        }

        if self.debug {
            info!(
                topic = envelope.topic(),
                payload = %envelope.payload_str(),
                routed,
                "Message received"
            );
        } else {
            debug!(topic = envelope.topic(), routed, "Message received");
        }
        routed
    }

    async fn shutdown_routes(routes: Vec<Route>) {
        for route in routes {
            route.handle.shutdown().await;
        }
    }
}

/// Summary of a shared stats handle
pub fn summarize(stats: &SharedStats) -> DeliverySummary {
    match stats.lock() {
        Ok(stats) => stats.summary(),
        Err(poisoned) => poisoned.into_inner().summary(),
    }
}

/// Convenience function to create a dispatcher from the bridge config
#[instrument(name = "dispatcher_create", skip_all)]
pub fn create_dispatcher(
    config: &BridgeConfig,
    input_rx: mpsc::UnboundedReceiver<Envelope>,
    reporter: FailureReporter,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(DispatcherConfig::from_bridge(config), input_rx)
        .reporter(reporter)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::DiscordSink;
    use crate::supervisor::Supervisor;
    use crate::transport::MockTransport;
    use contracts::{DiscordConfig, StdoutConfig};

    fn shared_stats() -> SharedStats {
        Arc::new(Mutex::new(DeliveryAggregator::new()))
    }

    fn discord(mock: &MockTransport, name: &str, stats: &SharedStats) -> SinkHandle {
        let config = DiscordConfig {
            topic: String::new(),
            webhook: format!("http://hook/{name}"),
        };
        SinkHandle::spawn(
            DiscordSink::new(name, &config, mock.clone()),
            FailureReporter::detached(),
            Arc::clone(stats),
        )
    }

    #[tokio::test]
    async fn test_routes_by_filter() {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let mock = MockTransport::always_status(204);
        let stats = shared_stats();

        let handles = vec![
            ("alerts/#".to_string(), discord(&mock, "alerts", &stats)),
            ("metrics/+".to_string(), discord(&mock, "metrics", &stats)),
        ];
        let dispatcher = Dispatcher::with_handles(handles, input_rx, Arc::clone(&stats));
        let task = dispatcher.spawn();

        input_tx.send(Envelope::new("alerts/cpu", "high")).unwrap();
        input_tx.send(Envelope::new("metrics/cpu", "42")).unwrap();
        input_tx.send(Envelope::new("metrics/cpu/core0", "7")).unwrap();
        input_tx.send(Envelope::new("other", "x")).unwrap();
        drop(input_tx);
        task.await.unwrap();

        let urls: Vec<String> = mock.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"http://hook/alerts".to_string()));
        assert!(urls.contains(&"http://hook/metrics".to_string()));
        assert_eq!(summarize(&stats).total_delivered, 2);
    }

    #[tokio::test]
    async fn test_overlapping_filters_each_get_a_copy() {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let mock = MockTransport::always_status(204);
        let stats = shared_stats();

        let handles = vec![
            ("#".to_string(), discord(&mock, "all", &stats)),
            ("a/b".to_string(), discord(&mock, "exact", &stats)),
        ];
        let dispatcher = Dispatcher::with_handles(handles, input_rx, stats);
        assert_eq!(dispatcher.route(Envelope::new("a/b", "x")), 2);
        assert_eq!(dispatcher.route(Envelope::new("a/c", "x")), 1);

        drop(input_tx);
        dispatcher.run().await;
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_sink_is_skipped_others_continue() {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let broken = MockTransport::always_status(500);
        let healthy = MockTransport::always_status(204);
        let stats = shared_stats();
        let mut supervisor = Supervisor::new();

        let config = DiscordConfig {
            topic: "#".into(),
            webhook: "http://hook".into(),
        };
        let handles = vec![
            (
                "#".to_string(),
                SinkHandle::spawn(
                    DiscordSink::new("broken", &config, broken.clone()),
                    supervisor.reporter(),
                    Arc::clone(&stats),
                ),
            ),
            (
                "#".to_string(),
                SinkHandle::spawn(
                    DiscordSink::new("healthy", &config, healthy.clone()),
                    supervisor.reporter(),
                    Arc::clone(&stats),
                ),
            ),
        ];
        let dispatcher = Dispatcher::with_handles(handles, input_rx, stats);
        let metrics = dispatcher.sink_metrics();
        let task = dispatcher.spawn();

        input_tx.send(Envelope::new("t", "1")).unwrap();
        let _ = tokio::time::timeout(Duration::from_millis(200), supervisor.watch(2)).await;
        assert!(supervisor.failures().contains_key("broken"));

        input_tx.send(Envelope::new("t", "2")).unwrap();
        drop(input_tx);
        task.await.unwrap();

        assert_eq!(broken.call_count(), 1);
        assert_eq!(healthy.call_count(), 2);
        let broken_metrics = &metrics[0].1;
        assert_eq!(broken_metrics.failure_count(), 1);
        assert_eq!(broken_metrics.not_routed_count(), 1);
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let config = BridgeConfig {
            stdout: vec![StdoutConfig {
                topic: "#".to_string(),
            }],
            ..serde_json::from_str(r#"{ "mqtt_server": { "address": "localhost" } }"#).unwrap()
        };

        let dispatcher = create_dispatcher(&config, input_rx, FailureReporter::detached()).unwrap();
        assert_eq!(dispatcher.sink_count(), 1);
        assert_eq!(dispatcher.metrics()[0].0, "stdout[0]");

        let stats = dispatcher.stats();
        let task = dispatcher.spawn();
        input_tx.send(Envelope::new("a", "b")).unwrap();
        drop(input_tx);
        task.await.unwrap();

        assert_eq!(summarize(&stats).total_delivered, 1);
    }

    #[tokio::test]
    async fn test_invalid_shared_key_fails_build() {
        let (_tx, input_rx) = mpsc::unbounded_channel();
        let config: BridgeConfig = serde_json::from_str(
            r##"{
                "mqtt_server": { "address": "localhost" },
                "log_analytics": [{
                    "topic": "#", "workspace_id": "ws", "shared_key": "%%%", "custom_log_name": "L"
                }]
            }"##,
        )
        .unwrap();

        let err = match create_dispatcher(&config, input_rx, FailureReporter::detached()) {
            Err(e) => e,
            Ok(_) => panic!("expected sink creation failure"),
        };
        assert!(err.to_string().contains("log_analytics[0]"));
    }
}
