//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::BridgeConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    broker: String,
    client_id: String,
    on_start_count: usize,
    sink_count: usize,
    topic_filters: Vec<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let mut topic_filters: Vec<String> = Vec::new();
            for sink in config.sink_configs() {
                if !topic_filters.contains(&sink.topic) {
                    topic_filters.push(sink.topic);
                }
            }

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    broker: config.mqtt_server.address.clone(),
                    client_id: config.mqtt_server.client_id().to_string(),
                    on_start_count: config.on_start.len(),
                    sink_count: config.sink_count(),
                    topic_filters,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sink_count() == 0 {
        warnings.push("No sinks configured - messages will not be forwarded".to_string());
    }

    if config.mqtt_server.client_id.is_empty() {
        warnings.push(format!(
            "mqtt_server.client_id is empty - using '{}'",
            config.mqtt_server.client_id()
        ));
    }

    if !config.mqtt_server.username.is_empty() && config.mqtt_server.password.is_empty() {
        warnings.push("mqtt_server.username set without a password".to_string());
    }

    for (idx, monitor) in config.azure_monitor.iter().enumerate() {
        if monitor.access_token.is_none() && monitor.token_command.is_none() {
            warnings.push(format!(
                "azure_monitor[{idx}] has no credential configured - using the Azure CLI"
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Broker: {}", summary.broker);
            println!("  Client ID: {}", summary.client_id);
            println!("  Start messages: {}", summary.on_start_count);
            println!("  Sinks: {}", summary.sink_count);
            println!("  Topic filters: {}", summary.topic_filters.join(", "));
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
