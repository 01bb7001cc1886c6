//! 配置校验模块
//!
//! 校验规则：
//! - broker 地址非空
//! - 每个 sink 的 topic filter 合法 (`#` 只能在末尾，通配符独占一级)
//! - 目标地址 / 密钥非空
//! - Log Analytics 共享密钥为合法 base64
//! - PagerDuty severity 取值合法
//! - 公告 topic 不含通配符

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use contracts::{
    AzureMonitorConfig, BridgeConfig, ContractError, LogAnalyticsConfig, PagerDutyConfig,
    PAGERDUTY_SEVERITIES,
};

/// 校验 BridgeConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BridgeConfig) -> Result<(), ContractError> {
    validate_bus(config)?;
    validate_announcements(config)?;
    validate_topics(config)?;
    validate_discord(config)?;
    validate_pagerduty(config)?;
    validate_log_analytics(config)?;
    validate_azure_monitor(config)?;
    validate_http(config)?;
    Ok(())
}

/// 校验 MQTT topic filter 语法
pub fn validate_topic_filter(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("topic filter cannot be empty".to_string());
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (idx, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || idx != levels.len() - 1) {
            return Err(format!(
                "'#' must occupy the last level on its own in '{filter}'"
            ));
        }
        if level.contains('+') && *level != "+" {
            return Err(format!("'+' must occupy a whole level in '{filter}'"));
        }
    }
    Ok(())
}

fn require(field: String, value: &str, what: &str) -> Result<(), ContractError> {
    if value.trim().is_empty() {
        return Err(ContractError::config_validation(
            field,
            format!("{what} cannot be empty"),
        ));
    }
    Ok(())
}

/// 校验 broker 配置
fn validate_bus(config: &BridgeConfig) -> Result<(), ContractError> {
    require(
        "mqtt_server.address".to_string(),
        &config.mqtt_server.address,
        "broker address",
    )?;
    let client_id = config.mqtt_server.client_id();
    if client_id.contains(['#', '+', '/']) {
        return Err(ContractError::config_validation(
            "mqtt_server.client_id",
            format!("client_id '{client_id}' cannot contain '#', '+' or '/'"),
        ));
    }
    Ok(())
}

/// 公告是发布，不允许通配符
fn validate_announcements(config: &BridgeConfig) -> Result<(), ContractError> {
    for (idx, announcement) in config.on_start.iter().enumerate() {
        let field = format!("on_start[{idx}].topic");
        require(field.clone(), &announcement.topic, "topic")?;
        if announcement.topic.contains(['#', '+']) {
            return Err(ContractError::config_validation(
                field,
                "publish topics cannot contain wildcards",
            ));
        }
    }
    Ok(())
}

/// 校验所有 sink 的 topic filter
fn validate_topics(config: &BridgeConfig) -> Result<(), ContractError> {
    for sink in config.sink_configs() {
        validate_topic_filter(&sink.topic)
            .map_err(|msg| ContractError::config_validation(format!("{}.topic", sink.name), msg))?;
    }
    Ok(())
}

fn validate_discord(config: &BridgeConfig) -> Result<(), ContractError> {
    for (idx, discord) in config.discord.iter().enumerate() {
        require(format!("discord[{idx}].webhook"), &discord.webhook, "webhook")?;
    }
    Ok(())
}

fn validate_pagerduty(config: &BridgeConfig) -> Result<(), ContractError> {
    for (idx, pd) in config.pagerduty.iter().enumerate() {
        validate_pagerduty_entry(idx, pd)?;
    }
    Ok(())
}

fn validate_pagerduty_entry(idx: usize, pd: &PagerDutyConfig) -> Result<(), ContractError> {
    require(
        format!("pagerduty[{idx}].integration_key"),
        &pd.integration_key,
        "integration_key",
    )?;
    if !PAGERDUTY_SEVERITIES.contains(&pd.severity.as_str()) {
        return Err(ContractError::config_validation(
            format!("pagerduty[{idx}].severity"),
            format!(
                "severity must be one of {:?}, got '{}'",
                PAGERDUTY_SEVERITIES, pd.severity
            ),
        ));
    }
    Ok(())
}

fn validate_log_analytics(config: &BridgeConfig) -> Result<(), ContractError> {
    for (idx, la) in config.log_analytics.iter().enumerate() {
        validate_log_analytics_entry(idx, la)?;
    }
    Ok(())
}

fn validate_log_analytics_entry(idx: usize, la: &LogAnalyticsConfig) -> Result<(), ContractError> {
    require(
        format!("log_analytics[{idx}].workspace_id"),
        &la.workspace_id,
        "workspace_id",
    )?;
    require(
        format!("log_analytics[{idx}].custom_log_name"),
        &la.custom_log_name,
        "custom_log_name",
    )?;
    require(
        format!("log_analytics[{idx}].shared_key"),
        &la.shared_key,
        "shared_key",
    )?;
    if let Err(e) = STANDARD.decode(&la.shared_key) {
        return Err(ContractError::config_validation(
            format!("log_analytics[{idx}].shared_key"),
            format!("shared_key is not valid base64: {e}"),
        ));
    }
    Ok(())
}

fn validate_azure_monitor(config: &BridgeConfig) -> Result<(), ContractError> {
    for (idx, am) in config.azure_monitor.iter().enumerate() {
        validate_azure_monitor_entry(idx, am)?;
    }
    Ok(())
}

fn validate_azure_monitor_entry(idx: usize, am: &AzureMonitorConfig) -> Result<(), ContractError> {
    require(
        format!("azure_monitor[{idx}].data_collection_endpoint"),
        &am.data_collection_endpoint,
        "data_collection_endpoint",
    )?;
    require(
        format!("azure_monitor[{idx}].immutable_id"),
        &am.immutable_id,
        "immutable_id",
    )?;
    require(
        format!("azure_monitor[{idx}].stream_name"),
        &am.stream_name,
        "stream_name",
    )?;
    if let Some(command) = &am.token_command {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(ContractError::config_validation(
                format!("azure_monitor[{idx}].token_command"),
                "token_command must name a program",
            ));
        }
    }
    Ok(())
}

fn validate_http(config: &BridgeConfig) -> Result<(), ContractError> {
    if config.http_timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "http_timeout_secs",
            "http_timeout_secs must be > 0",
        ));
    }
    Ok(())
}
