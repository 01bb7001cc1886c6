//! Supervisor - collects terminal sink failures
//!
//! A sink worker that hits a terminal delivery error reports it here and
//! stops. The supervisor logs the failure with full context and resolves once
//! every configured sink has stopped.

use std::collections::BTreeMap;

use contracts::{DeliveryError, Envelope};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::DispatcherError;

/// Terminal failure of one sink instance
#[derive(Debug, Clone)]
pub struct SinkFailure {
    pub sink: String,
    /// Envelope whose delivery failed
    pub envelope: Envelope,
    pub error: DeliveryError,
    /// Envelopes still queued behind it, discarded
    pub discarded: usize,
}

/// Sending side handed to sink workers
#[derive(Debug, Clone)]
pub struct FailureReporter {
    tx: mpsc::UnboundedSender<SinkFailure>,
}

impl FailureReporter {
    /// Reporter whose failures go nowhere (tests, dry runs)
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn report(&self, failure: SinkFailure) {
        if let Err(mpsc::error::SendError(failure)) = self.tx.send(failure) {
            error!(
                sink = %failure.sink,
                topic = failure.envelope.topic(),
                error = %failure.error,
                "Sink failed with no supervisor attached"
            );
        }
    }
}

/// Receives sink failures
pub struct Supervisor {
    tx: mpsc::UnboundedSender<SinkFailure>,
    rx: mpsc::UnboundedReceiver<SinkFailure>,
    failed: BTreeMap<String, SinkFailure>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            failed: BTreeMap::new(),
        }
    }

    pub fn reporter(&self) -> FailureReporter {
        FailureReporter {
            tx: self.tx.clone(),
        }
    }

    /// Failures received so far, by sink name
    pub fn failures(&self) -> &BTreeMap<String, SinkFailure> {
        &self.failed
    }

    /// Wait until all `total_sinks` have failed
    ///
    /// Never resolves when `total_sinks` is zero. Cancel-safe: failures
    /// received before cancellation are kept.
    pub async fn watch(&mut self, total_sinks: usize) -> DispatcherError {
        while let Some(failure) = self.rx.recv().await {
            self.record(failure);
            if total_sinks > 0 && self.failed.len() >= total_sinks {
                return DispatcherError::AllSinksFailed { count: total_sinks };
            }
        }
        // The supervisor keeps a sender, so the channel cannot close
        std::future::pending().await
    }

    /// Drain failures already queued without waiting
    pub fn drain(&mut self) {
        while let Ok(failure) = self.rx.try_recv() {
            self.record(failure);
        }
    }

    fn record(&mut self, failure: SinkFailure) {
        error!(
            sink = %failure.sink,
            kind = failure.error.kind(),
            status = ?failure.error.status(),
            topic = failure.envelope.topic(),
            received_at = %failure.envelope.rfc3339_nano(),
            discarded = failure.discarded,
            error = %failure.error,
            "Sink stopped after terminal delivery failure"
        );
        observability::record_sink_failed(&failure.sink);

        if self.failed.contains_key(&failure.sink) {
            warn!(sink = %failure.sink, "Duplicate failure report ignored");
            return;
        }
        self.failed.insert(failure.sink.clone(), failure);
    }
}
