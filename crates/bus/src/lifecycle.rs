//! Subscription and presence announcements

use bytes::Bytes;
use chrono::Utc;
use contracts::{rfc3339_nano, Announcement, BusConfig};
use tracing::{debug, info, warn};

use crate::client::BusClient;
use crate::error::Result;

/// Payload published on the online topic while connected
pub const ONLINE: &str = "true";

/// Payload published on the online topic at shutdown
pub const OFFLINE: &str = "false";

/// Subscribe once per distinct topic filter, preserving first-seen order
pub async fn subscribe_all<C, I, S>(client: &C, filters: I) -> Result<Vec<String>>
where
    C: BusClient,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut subscribed: Vec<String> = Vec::new();
    for filter in filters {
        let filter = filter.as_ref();
        if subscribed.iter().any(|f| f == filter) {
            continue;
        }
        client.subscribe(filter).await?;
        subscribed.push(filter.to_string());
    }
    Ok(subscribed)
}

/// Startup announcements
///
/// The configured on-start messages go out first, followed by the online
/// flag and a timestamped log line. Each publish stands alone: a refused
/// message is logged and the rest still go out. Returns how many failed.
pub async fn announce_online<C: BusClient>(
    client: &C,
    config: &BusConfig,
    on_start: &[Announcement],
) -> usize {
    let mut failed = 0;
    for announcement in on_start {
        debug!(topic = %announcement.topic, "Publishing start message");
        let payload = Bytes::from(announcement.message.clone());
        if !publish_logged(client, &announcement.topic, payload).await {
            failed += 1;
        }
    }

    let online = Bytes::from_static(ONLINE.as_bytes());
    if !publish_logged(client, &config.online_topic(), online).await {
        failed += 1;
    }

    let line = format!("online, time is: {}", rfc3339_nano(&Utc::now().fixed_offset()));
    if !publish_logged(client, &config.log_topic(), Bytes::from(line)).await {
        failed += 1;
    }

    info!(client_id = config.client_id(), failed, "Announced online");
    failed
}

async fn publish_logged<C: BusClient>(client: &C, topic: &str, payload: Bytes) -> bool {
    match client.publish(topic, payload).await {
        Ok(()) => true,
        Err(e) => {
            warn!(topic, error = %e, "Publish failed");
            false
        }
    }
}

/// Shutdown announcement
pub async fn announce_offline<C: BusClient>(client: &C, config: &BusConfig) -> Result<()> {
    client
        .publish(&config.online_topic(), Bytes::from_static(OFFLINE.as_bytes()))
        .await?;
    info!(client_id = config.client_id(), "Announced offline");
    Ok(())
}
