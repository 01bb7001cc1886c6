//! Bridge orchestrator - coordinates the bus session, dispatcher and supervisor.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bus::{announce_offline, announce_online, subscribe_all, BusClient, MqttBusClient};
use contracts::{BridgeConfig, Envelope};
use dispatcher::{summarize, DispatcherError, SharedStats, SinkMetrics, Supervisor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::BridgeStats;
use crate::error::{CliError, Result};

/// Time allowed for the disconnect to flush
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Time allowed for sink queues to drain after the bus closed
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// The loaded configuration document
    pub config: BridgeConfig,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Why the bridge stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown signal received
    Shutdown,
    /// Broker connection ended without a disconnect request
    BusLost(String),
    /// Every sink stopped after a terminal failure
    AllSinksFailed(usize),
}

/// Main bridge orchestrator
pub struct Bridge {
    options: BridgeOptions,
}

/// Dispatcher task plus the handles needed for the final report
struct RunningDispatcher {
    task: JoinHandle<()>,
    stats: SharedStats,
    sink_metrics: Vec<(String, Arc<SinkMetrics>)>,
}

impl Bridge {
    /// Create a new bridge with the given options
    pub fn new(options: BridgeOptions) -> Self {
        Self { options }
    }

    /// Run against the configured MQTT broker until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<BridgeStats> {
        let bus_config = self.options.config.mqtt_server.clone();
        self.run_with(
            move |inbound| async move {
                MqttBusClient::connect(&bus_config, inbound)
                    .await
                    .map_err(|e| CliError::bus_connection(&bus_config.address, e.to_string()))
            },
            shutdown,
        )
        .await
    }

    /// Run with a caller-provided bus connection
    ///
    /// `connect` receives the channel the bus pushes inbound envelopes into.
    pub async fn run_with<C, F, Fut>(
        self,
        connect: F,
        shutdown: impl Future<Output = ()>,
    ) -> Result<BridgeStats>
    where
        C: BusClient,
        F: FnOnce(mpsc::UnboundedSender<Envelope>) -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let start_time = Instant::now();
        let config = &self.options.config;

        // Initialize Metrics (optional)
        if let Some(port) = self.options.metrics_port {
            observability::install_metrics_exporter(port)?;
            info!(port, "Metrics endpoint available");
        }

        // Sinks are built before the bus connection so a bad sink never goes online
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let mut supervisor = Supervisor::new();
        let dispatcher = dispatcher::create_dispatcher(config, inbound_rx, supervisor.reporter())
            .map_err(|e| anyhow::Error::new(e).context("Failed to create dispatcher"))?;

        if dispatcher.sink_count() == 0 {
            warn!("No sinks configured - messages will only be logged");
        }

        let sink_count = dispatcher.sink_count();
        let running = RunningDispatcher {
            stats: dispatcher.stats(),
            sink_metrics: dispatcher.sink_metrics(),
            task: dispatcher.spawn(),
        };
        info!(sinks = sink_count, "Dispatcher started");

        info!(address = %config.mqtt_server.address, "Connecting to MQTT broker...");
        let bus = connect(inbound_tx).await?;

        let reason = serve(config, bus, &mut supervisor, sink_count, shutdown).await;

        // Wait for dispatcher to flush
        info!("Draining sink queues...");
        if tokio::time::timeout(DRAIN_TIMEOUT, running.task).await.is_err() {
            warn!(
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "Sink queues not drained in time"
            );
        }
        supervisor.drain();

        let stats = BridgeStats {
            duration: start_time.elapsed(),
            sinks: running
                .sink_metrics
                .iter()
                .map(|(name, m)| (name.clone(), m.snapshot()))
                .collect(),
            failed_sinks: supervisor.failures().keys().cloned().collect(),
            delivery: summarize(&running.stats),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            delivered = stats.delivered(),
            failed_sinks = stats.failed_sinks.len(),
            "Bridge shutdown complete"
        );

        match reason? {
            StopReason::Shutdown => Ok(stats),
            StopReason::BusLost(message) => {
                stats.print_summary();
                Err(CliError::bus_lost(message))
            }
            StopReason::AllSinksFailed(count) => {
                stats.print_summary();
                Err(CliError::AllSinksFailed { count })
            }
        }
    }
}

/// Subscribe, announce, and wait for the first stop condition
async fn serve<C: BusClient>(
    config: &BridgeConfig,
    mut bus: C,
    supervisor: &mut Supervisor,
    sink_count: usize,
    shutdown: impl Future<Output = ()>,
) -> Result<StopReason> {
    let filters = config.sink_configs().into_iter().map(|s| s.topic);
    let subscribed = match subscribe_all(&bus, filters).await {
        Ok(subscribed) => subscribed,
        Err(e) => {
            // The session is unusable without its subscriptions
            let _ = bus.disconnect(DISCONNECT_GRACE).await;
            return Err(CliError::bus_connection(
                &config.mqtt_server.address,
                e.to_string(),
            ));
        }
    };
    info!(filters = subscribed.len(), "Subscriptions established");

    let failed = announce_online(&bus, &config.mqtt_server, &config.on_start).await;
    if failed > 0 {
        warn!(failed, "Some startup announcements were not published");
    }

    info!("Bridge running, press Ctrl+C to stop");

    let reason = tokio::select! {
        _ = shutdown => {
            warn!("Received shutdown signal, stopping bridge...");
            StopReason::Shutdown
        }
        closed = bus.closed() => match closed {
            Ok(()) => StopReason::BusLost("broker closed the session".to_string()),
            Err(e) => {
                error!(error = %e, "MQTT connection lost");
                StopReason::BusLost(e.to_string())
            }
        },
        failed = supervisor.watch(sink_count) => {
            match failed {
                DispatcherError::AllSinksFailed { count } => {
                    error!(sinks = count, "All sinks failed, stopping bridge");
                    StopReason::AllSinksFailed(count)
                }
                other => {
                    error!(error = %other, "Supervisor stopped");
                    StopReason::AllSinksFailed(sink_count)
                }
            }
        }
    };

    if !matches!(reason, StopReason::BusLost(_)) {
        if let Err(e) = announce_offline(&bus, &config.mqtt_server).await {
            warn!(error = %e, "Failed to publish offline status");
        }
    }

    if let Err(e) = bus.disconnect(DISCONNECT_GRACE).await {
        warn!(error = %e, "Error during disconnect");
    }

    Ok(reason)
}
