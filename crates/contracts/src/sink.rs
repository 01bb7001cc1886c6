//! DataSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for Sinks.

use crate::{ContractError, DeliveryError, Envelope};

/// Envelope delivery trait
///
/// All sink implementations must implement this trait. A sink is driven by
/// exactly one worker, so `write` is never called concurrently and calls are
/// made in queue order.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink instance name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one envelope, retrying recoverable failures internally
    ///
    /// # Errors
    /// Returns a terminal delivery error; the sink instance is stopped after it.
    async fn write(&mut self, envelope: &Envelope) -> Result<(), DeliveryError>;

    /// Release resources once the queue is closed
    async fn close(&mut self) -> Result<(), ContractError>;
}
