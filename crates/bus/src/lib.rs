//! # Bus
//!
//! MQTT message bus module.
//!
//! Responsibilities:
//! - Connect to the broker and stamp every inbound message as an `Envelope`
//! - Subscribe to the topic filters of the configured sinks
//! - Publish start, online and offline announcements
//! - Provide a mock client for tests

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod mock_client;
pub mod mqtt_client;

pub use client::BusClient;
pub use contracts::{Announcement, BusConfig, Envelope};
pub use error::{BusError, Result};
pub use lifecycle::{announce_offline, announce_online, subscribe_all};
pub use mock_client::{MockBusClient, PublishedMessage};
pub use mqtt_client::{parse_broker_address, MqttBusClient};
