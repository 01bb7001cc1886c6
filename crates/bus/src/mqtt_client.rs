//! MQTT bus client (rumqttc)

use std::time::Duration;

use bytes::Bytes;
use contracts::{BusConfig, Envelope, DEFAULT_MQTT_PORT};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::client::BusClient;
use crate::error::{BusError, Result};

/// Keep-alive interval towards the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Time allowed for the broker to acknowledge the connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Parse broker address in format tcp://host:port, mqtt://host:port or host[:port]
pub fn parse_broker_address(address: &str) -> Result<(String, u16)> {
    let trimmed = address.trim();
    let rest = trimmed
        .strip_prefix("tcp://")
        .or_else(|| trimmed.strip_prefix("mqtt://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let parts: Vec<&str> = rest.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((host.to_string(), DEFAULT_MQTT_PORT)),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| BusError::invalid_address(address, format!("invalid port '{port}'")))?;
            Ok((host.to_string(), port))
        }
        _ => Err(BusError::invalid_address(address, "expected host[:port]")),
    }
}

/// Connected MQTT client
pub struct MqttBusClient {
    client: AsyncClient,
    event_loop: Option<JoinHandle<Result<()>>>,
}

impl MqttBusClient {
    /// Connect to the broker and start forwarding messages into `inbound`
    ///
    /// Returns once the broker acknowledged the connection.
    #[instrument(name = "mqtt_connect", skip_all, fields(address = %config.address, client_id = config.client_id()))]
    pub async fn connect(
        config: &BusConfig,
        inbound: mpsc::UnboundedSender<Envelope>,
    ) -> Result<Self> {
        let (host, port) = parse_broker_address(&config.address)?;

        let mut options = MqttOptions::new(config.client_id(), host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        if let Some((username, password)) = config.credentials() {
            options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut event_loop))
            .await
            .map_err(|_| BusError::connect_failed("timed out waiting for CONNACK"))??;
        info!("Connected to MQTT broker");

        let event_loop = tokio::spawn(run_event_loop(event_loop, inbound));

        Ok(Self {
            client,
            event_loop: Some(event_loop),
        })
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<()> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(BusError::connect_failed(e.to_string())),
        }
    }
}

/// Drive the connection, forwarding publishes until disconnect or failure
#[instrument(name = "mqtt_event_loop", skip_all)]
async fn run_event_loop(
    mut event_loop: EventLoop,
    inbound: mpsc::UnboundedSender<Envelope>,
) -> Result<()> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let envelope = Envelope::new(publish.topic, publish.payload);
                if inbound.send(envelope).is_err() {
                    warn!("Dispatcher gone, inbound message dropped");
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!(pkid = ack.pkid, "Subscription acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent");
                return Ok(());
            }
            Ok(_) => {
                // Pings, acks and other outgoing packets
            }
            Err(e) => return Err(BusError::connection_lost(e.to_string())),
        }
    }
}

impl BusClient for MqttBusClient {
    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.client
            .subscribe(filter, QoS::ExactlyOnce)
            .await
            .map_err(|e| BusError::request_failed(format!("subscribe '{filter}': {e}")))?;
        info!(topic = filter, "Subscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish_bytes(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BusError::request_failed(format!("publish '{topic}': {e}")))
    }

    async fn closed(&mut self) -> Result<()> {
        let Some(task) = self.event_loop.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.event_loop = None;
        match result {
            Ok(result) => result,
            Err(e) => Err(BusError::connection_lost(format!("event loop task failed: {e}"))),
        }
    }

    #[instrument(name = "mqtt_disconnect", skip(self))]
    async fn disconnect(&mut self, grace: Duration) -> Result<()> {
        if let Err(e) = self.client.disconnect().await {
            // The event loop already stopped
            debug!(error = %e, "Disconnect request not delivered");
        }

        let Some(mut task) = self.event_loop.take() else {
            return Ok(());
        };
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(BusError::connection_lost(format!("event loop task failed: {e}"))),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Disconnect timed out");
                task.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_address_with_port() {
        let (host, port) = parse_broker_address("tcp://localhost:1884").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1884);
    }

    #[test]
    fn test_parse_broker_address_default_port() {
        let (host, port) = parse_broker_address("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);

        let (host, port) = parse_broker_address("broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_address_invalid() {
        assert!(parse_broker_address("tcp://host:notaport").is_err());
        assert!(parse_broker_address("tcp://").is_err());
        assert!(parse_broker_address("a:b:c").is_err());
        assert!(parse_broker_address("tcp://:1883").is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let config = BusConfig {
            address: "tcp://127.0.0.1:9".into(),
            username: String::new(),
            password: String::new(),
            client_id: "test".into(),
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = match MqttBusClient::connect(&config, tx).await {
            Err(e) => e,
            Ok(_) => panic!("connect to closed port succeeded"),
        };
        assert!(matches!(err, BusError::ConnectFailed { .. }));
    }
}
