//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{BridgeConfig, SinkKind};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    mqtt: MqttInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    on_start: Vec<AnnouncementInfo>,
    sinks: Vec<SinkInfo>,
    debug: bool,
    http_timeout_secs: u64,
}

#[derive(Serialize)]
struct MqttInfo {
    address: String,
    client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

#[derive(Serialize)]
struct AnnouncementInfo {
    topic: String,
    message: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    kind: String,
    topic: String,
    destination: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Keep a short prefix of a secret, hide the rest
fn mask(secret: &str) -> String {
    const VISIBLE: usize = 4;
    if secret.chars().count() <= VISIBLE * 2 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    format!("{prefix}****")
}

/// Describe where a sink delivers, with credentials masked
fn destination(kind: &SinkKind) -> String {
    match kind {
        SinkKind::Discord(c) => match c.webhook.rsplit_once('/') {
            Some((base, token)) => format!("{base}/{}", mask(token)),
            None => mask(&c.webhook),
        },
        SinkKind::PagerDuty(c) => format!(
            "{} (severity {}, key {})",
            c.endpoint(),
            c.severity,
            mask(&c.integration_key)
        ),
        SinkKind::LogAnalytics(c) => format!(
            "{} (log type {}, key {})",
            c.endpoint(),
            c.custom_log_name,
            mask(&c.shared_key)
        ),
        SinkKind::AzureMonitor(c) => {
            let credential = if c.access_token.is_some() {
                "static token".to_string()
            } else {
                match &c.token_command {
                    Some(cmd) => format!("token command '{}'", cmd.join(" ")),
                    None => "Azure CLI token".to_string(),
                }
            };
            format!("{} ({credential})", c.ingestion_url())
        }
        SinkKind::Stdout(_) => "console".to_string(),
    }
}

fn build_config_info(config: &BridgeConfig) -> ConfigInfo {
    let mqtt = &config.mqtt_server;
    let sinks = config
        .sink_configs()
        .into_iter()
        .map(|s| SinkInfo {
            destination: destination(&s.kind),
            kind: s.kind.label().to_string(),
            name: s.name,
            topic: s.topic,
        })
        .collect();

    ConfigInfo {
        mqtt: MqttInfo {
            address: mqtt.address.clone(),
            client_id: mqtt.client_id().to_string(),
            username: mqtt.credentials().map(|(user, _)| user.to_string()),
            password: mqtt.credentials().map(|(_, password)| mask(password)),
        },
        on_start: config
            .on_start
            .iter()
            .map(|a| AnnouncementInfo {
                topic: a.topic.clone(),
                message: a.message.clone(),
            })
            .collect(),
        sinks,
        debug: config.debug,
        http_timeout_secs: config.http_timeout_secs,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 MQTT Bridge Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 MQTT");
    println!("   ├─ Broker: {}", info.mqtt.address);
    if let Some(ref username) = info.mqtt.username {
        println!("   ├─ Username: {}", username);
    }
    println!("   ├─ Client ID: {}", info.mqtt.client_id);
    println!("   └─ Debug: {}", info.debug);

    if !info.on_start.is_empty() {
        println!("\n📣 Start Messages ({})", info.on_start.len());
        for (i, a) in info.on_start.iter().enumerate() {
            let prefix = if i == info.on_start.len() - 1 { "└─" } else { "├─" };
            println!("   {} {} = {}", prefix, a.topic, a.message);
        }
    }

    println!("\n📤 Sinks ({})", info.sinks.len());
    for (i, sink) in info.sinks.iter().enumerate() {
        let is_last = i == info.sinks.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        println!("   {} {} <- {}", prefix, sink.name, sink.topic);
        println!("   {}  └─ {}", child_prefix, sink.destination);
    }

    println!("\n⏱  HTTP timeout: {}s", info.http_timeout_secs);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("short"), "****");
        assert_eq!(mask("0123456789abcdef"), "0123****");
    }

    #[test]
    fn test_secrets_are_masked() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{
                "mqtt_server": {
                    "address": "tcp://localhost:1883",
                    "username": "bridge",
                    "password": "supersecretpassword"
                },
                "discord": [ {
                    "topic": "alerts/#",
                    "webhook": "https://discord.com/api/webhooks/123/tokentokentoken"
                } ],
                "pagerduty": [ {
                    "topic": "pages/#",
                    "severity": "critical",
                    "integration_key": "abcdefghijklmnop"
                } ]
            }"#,
        )
        .unwrap();

        let info = build_config_info(&config);
        let json = serde_json::to_string(&info).unwrap();

        assert!(!json.contains("supersecretpassword"));
        assert!(!json.contains("tokentokentoken"));
        assert!(!json.contains("abcdefghijklmnop"));
        assert_eq!(info.sinks[0].name, "discord[0]");
        assert_eq!(
            info.sinks[0].destination,
            "https://discord.com/api/webhooks/123/toke****"
        );
        assert!(info.sinks[1]
            .destination
            .starts_with("https://events.pagerduty.com/v2/enqueue"));
    }
}
