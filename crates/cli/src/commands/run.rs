//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::BridgeConfig;
use tracing::info;

use crate::bridge::{Bridge, BridgeOptions};
use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_bridge(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    // Load and parse configuration
    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args);

    info!(
        broker = %config.mqtt_server.address,
        client_id = config.mqtt_server.client_id(),
        sinks = config.sink_count(),
        on_start = config.on_start.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let bridge = Bridge::new(BridgeOptions {
        config,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    info!("Starting bridge...");
    let stats = bridge
        .run(shutdown_signal())
        .await
        .context("Bridge execution failed")?;

    info!(
        delivered = stats.delivered(),
        duration_secs = stats.duration.as_secs_f64(),
        "Bridge stopped"
    );
    stats.print_summary();

    info!("MQTT Bridge finished");
    Ok(())
}

/// Apply CLI overrides on top of the loaded configuration
fn apply_overrides(config: &mut BridgeConfig, args: &RunArgs) {
    if let Some(ref broker) = args.broker {
        info!(broker = %broker, "Overriding broker address from CLI");
        config.mqtt_server.address = broker.clone();
    }
    if let Some(ref client_id) = args.client_id {
        info!(client_id = %client_id, "Overriding client id from CLI");
        config.mqtt_server.client_id = client_id.clone();
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &BridgeConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("MQTT:");
    println!("  Broker: {}", config.mqtt_server.address);
    println!("  Client ID: {}", config.mqtt_server.client_id());
    println!(
        "  Status topics: {}, {}",
        config.mqtt_server.online_topic(),
        config.mqtt_server.log_topic()
    );

    if !config.on_start.is_empty() {
        println!("\nStart messages ({}):", config.on_start.len());
        for announcement in &config.on_start {
            println!("  - {}", announcement.topic);
        }
    }

    let sinks = config.sink_configs();
    println!("\nSinks ({}):", sinks.len());
    for sink in &sinks {
        println!("  - {} <- {}", sink.name, sink.topic);
    }

    println!();
}
