//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use contracts::{DataSink, Envelope};
use observability::DeliveryAggregator;

use crate::metrics::SinkMetrics;
use crate::supervisor::{FailureReporter, SinkFailure};

/// Delivery totals shared by all workers of a dispatcher
pub type SharedStats = Arc<Mutex<DeliveryAggregator>>;

struct Queued {
    envelope: Envelope,
    enqueued_at: Instant,
}

/// Handle to a running sink worker
///
/// The queue is unbounded: enqueueing never blocks the router and never
/// drops. Envelopes are delivered one at a time in enqueue order.
pub struct SinkHandle {
    name: String,
    tx: mpsc::UnboundedSender<Queued>,
    metrics: Arc<SinkMetrics>,
    alive: Arc<AtomicBool>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + Send + 'static>(
        sink: S,
        reporter: FailureReporter,
        stats: SharedStats,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(SinkMetrics::new());
        let alive = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            name: name.clone(),
            metrics: Arc::clone(&metrics),
            alive: Arc::clone(&alive),
            reporter,
            stats,
        };
        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker).await;
        });

        Self {
            name,
            tx,
            metrics,
            alive,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// False once the sink stopped after a terminal failure
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queue an envelope for delivery (non-blocking)
    ///
    /// Returns false when the sink has stopped; the envelope is not routed.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        if !self.is_alive() {
            self.metrics.inc_not_routed_count();
            return false;
        }

        let queued = Queued {
            envelope,
            enqueued_at: Instant::now(),
        };
        // Counted before the send so the worker's decrement can never run first
        self.metrics.inc_queue_len();
        match self.tx.send(queued) {
            Ok(()) => {
                observability::record_envelope_received(&self.name);
                observability::record_queue_depth(&self.name, self.metrics.queue_len());
                true
            }
            Err(_) => {
                self.metrics.dec_queue_len();
                self.metrics.inc_not_routed_count();
                debug!(sink = %self.name, "Sink worker gone, envelope not routed");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued envelopes are delivered before the worker exits.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

struct Worker {
    name: String,
    metrics: Arc<SinkMetrics>,
    alive: Arc<AtomicBool>,
    reporter: FailureReporter,
    stats: SharedStats,
}

impl Worker {
    fn record_delivered(&self, latency_ms: f64) {
        self.metrics.inc_delivered_count();
        observability::record_delivery(&self.name, observability::STATUS_DELIVERED);
        observability::record_delivery_latency_ms(&self.name, latency_ms);
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_delivered(&self.name, latency_ms);
        }
    }

    fn record_failed(&self, kind: &str) {
        self.metrics.inc_failure_count();
        observability::record_delivery(&self.name, kind);
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_failed(&self.name);
        }
    }
}

/// Worker task that consumes envelopes and writes to the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, worker),
    fields(sink = %worker.name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    worker: Worker,
) {
    debug!("Sink worker started");

    while let Some(queued) = rx.recv().await {
        worker.metrics.dec_queue_len();
        observability::record_queue_depth(&worker.name, worker.metrics.queue_len());

        match sink.write(&queued.envelope).await {
            Ok(()) => {
                let latency_ms = queued.enqueued_at.elapsed().as_secs_f64() * 1000.0;
                worker.record_delivered(latency_ms);
            }
            Err(e) => {
                worker.alive.store(false, Ordering::Release);
                worker.record_failed(e.kind());

                // Nothing behind the failed envelope will be delivered
                rx.close();
                let mut discarded = 0;
                while rx.try_recv().is_ok() {
                    discarded += 1;
                    worker.metrics.dec_queue_len();
                }
                warn!(discarded, "Sink stopped");

                worker.reporter.report(SinkFailure {
                    sink: worker.name.clone(),
                    envelope: queued.envelope,
                    error: e,
                    discarded,
                });
                break;
            }
        }
    }

    if let Err(e) = sink.close().await {
        error!(error = %e, "Close failed on shutdown");
    }

    debug!("Sink worker stopped");
}
