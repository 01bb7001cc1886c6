//! Bus client abstraction
//!
//! Defines the operations the bridge needs from the message bus, supporting
//! the MQTT implementation and mock testing.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// Message bus client trait
///
/// Inbound messages are not pulled through this trait: a client is created
/// with a channel and pushes every received message into it as an
/// `Envelope` stamped at receipt.
pub trait BusClient: Send + Sync {
    /// Subscribe to a topic filter with exactly-once delivery
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<()>> + Send;

    /// Publish a non-retained, at-most-once message
    fn publish(&self, topic: &str, payload: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Resolves when the connection ends
    ///
    /// `Ok` after a requested disconnect, `Err` when the connection was lost.
    fn closed(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Disconnect, waiting at most `grace` for pending work to flush
    fn disconnect(&mut self, grace: Duration) -> impl Future<Output = Result<()>> + Send;
}
