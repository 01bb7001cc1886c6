//! # Observability
//!
//! 可观测性模块：日志订阅器 + Prometheus 指标。
//!
//! - 日志：`tracing-subscriber`，JSON / Pretty / Compact 三种输出，`RUST_LOG` 优先
//! - 指标：`metrics` 记录，`--metrics-port` 开启时由 Prometheus exporter 暴露
//! - 投递结果聚合，供进程退出时打印摘要
//!
//! ```ignore
//! observability::init_logging(&LogConfig::from_verbosity(false, 1, LogFormat::Compact))?;
//! observability::install_metrics_exporter(9000)?;
//! observability::record_delivery("discord[0]", observability::STATUS_DELIVERED);
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    record_backoff, record_delivery, record_delivery_latency_ms, record_delivery_retry,
    record_envelope_received, record_queue_depth, record_sink_failed, DeliveryAggregator,
    DeliverySummary, RunningStats, SinkTally, StatsSummary, STATUS_DELIVERED,
};

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 多行、人类可读
    Pretty,
    /// 单行
    Compact,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `RUST_LOG` 未设置时使用的过滤指令
    pub default_directive: String,
}

impl LogConfig {
    /// 由 `-q` / `-v` 计数推导默认级别
    pub fn from_verbosity(quiet: bool, verbose: u8, format: LogFormat) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            format,
            default_directive: level.to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_verbosity(false, 0, LogFormat::default())
    }
}

/// 安装全局 tracing subscriber，只能调用一次
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(format = ?config.format, "Logging initialized");
    Ok(())
}

/// Prometheus 监听地址，绑定所有网卡
pub fn metrics_listen_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// 安装 Prometheus recorder 与 HTTP 抓取端点
///
/// 需要在 tokio runtime 内调用；进程内只能安装一次。
pub fn install_metrics_exporter(port: u16) -> Result<()> {
    let addr = metrics_listen_addr(port);
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on {addr}"))?;

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let level = |quiet, verbose| {
            LogConfig::from_verbosity(quiet, verbose, LogFormat::Compact).default_directive
        };
        assert_eq!(level(false, 0), "info");
        assert_eq!(level(false, 1), "debug");
        assert_eq!(level(false, 5), "trace");
        assert_eq!(level(true, 2), "warn");
    }

    #[test]
    fn test_default_config_is_json_info() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_directive, "info");
    }

    #[test]
    fn test_metrics_listen_addr() {
        assert_eq!(metrics_listen_addr(9100).to_string(), "0.0.0.0:9100");
    }
}
