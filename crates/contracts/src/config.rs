//! BridgeConfig - Config Loader 输出
//!
//! 描述完整的桥接配置：MQTT 连接、启动公告、各类 sink 路由。

use serde::{Deserialize, Serialize};

/// 未配置 client_id 时使用的默认值
pub const DEFAULT_CLIENT_ID: &str = "qtbot";

/// 默认 MQTT 端口
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// PagerDuty Events v2 默认入口
pub const DEFAULT_PAGERDUTY_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// PagerDuty 接受的 severity 取值
pub const PAGERDUTY_SEVERITIES: [&str; 4] = ["critical", "error", "warning", "info"];

/// Logs Ingestion API 版本
pub const LOGS_INGESTION_API_VERSION: &str = "2023-01-01";

/// 完整的桥接配置
///
/// 启动时加载一次，进程生命周期内不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 调试模式：以 info 级别记录每条路由消息
    #[serde(default)]
    pub debug: bool,

    /// MQTT 连接设置
    pub mqtt_server: BusConfig,

    /// 启动后发布的公告
    #[serde(default)]
    pub on_start: Vec<Announcement>,

    /// Discord webhook sinks
    #[serde(default)]
    pub discord: Vec<DiscordConfig>,

    /// PagerDuty sinks
    #[serde(default)]
    pub pagerduty: Vec<PagerDutyConfig>,

    /// Log Analytics (HTTP Data Collector) sinks
    #[serde(default)]
    pub log_analytics: Vec<LogAnalyticsConfig>,

    /// Azure Monitor (Logs Ingestion) sinks
    #[serde(default)]
    pub azure_monitor: Vec<AzureMonitorConfig>,

    /// 本地控制台 sinks
    #[serde(default)]
    pub stdout: Vec<StdoutConfig>,

    /// 出站 HTTP 请求总超时 (秒)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    60
}

/// MQTT 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker 地址 (e.g., "tcp://localhost:1883")
    pub address: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// 客户端标识，同时作为状态 topic 的命名空间
    #[serde(default)]
    pub client_id: String,
}

impl BusConfig {
    /// Effective client identifier
    pub fn client_id(&self) -> &str {
        if self.client_id.is_empty() {
            DEFAULT_CLIENT_ID
        } else {
            &self.client_id
        }
    }

    /// Credentials, if a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }

    /// `<client_id>/online`
    pub fn online_topic(&self) -> String {
        format!("{}/online", self.client_id())
    }

    /// `<client_id>/log`
    pub fn log_topic(&self) -> String {
        format!("{}/log", self.client_id())
    }
}

/// 启动公告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub topic: String,
    pub message: String,
}

/// Discord webhook 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub topic: String,
    /// Webhook URL (URL 本身即密钥)
    pub webhook: String,
}

/// PagerDuty 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyConfig {
    pub topic: String,
    pub severity: String,
    pub integration_key: String,
    /// 为空时使用 Events v2 默认入口
    #[serde(default)]
    pub url: String,
}

impl PagerDutyConfig {
    pub fn endpoint(&self) -> &str {
        if self.url.is_empty() {
            DEFAULT_PAGERDUTY_URL
        } else {
            &self.url
        }
    }
}

/// Log Analytics 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAnalyticsConfig {
    pub topic: String,
    pub workspace_id: String,
    /// Base64 编码的共享密钥
    pub shared_key: String,
    pub custom_log_name: String,
    /// 自定义入口 (测试用)
    #[serde(default, alias = "URL")]
    pub url: Option<String>,
}

impl LogAnalyticsConfig {
    pub fn endpoint(&self) -> String {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!(
                "https://{}.ods.opinsights.azure.com/api/logs?api-version=2016-04-01",
                self.workspace_id
            ),
        }
    }
}

/// Azure Monitor Logs Ingestion 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureMonitorConfig {
    pub topic: String,

    /// Data collection endpoint (兼容旧拼写 `data_collecton_endpoint`)
    #[serde(alias = "data_collecton_endpoint")]
    pub data_collection_endpoint: String,

    /// DCR immutable id
    pub immutable_id: String,

    pub stream_name: String,

    /// 固定 token (优先于 token_command)
    #[serde(default)]
    pub access_token: Option<String>,

    /// 获取 token 的外部命令 (argv)
    #[serde(default)]
    pub token_command: Option<Vec<String>>,

    /// 命令获取的 token 缓存时长 (秒)
    #[serde(default = "default_token_cache_secs")]
    pub token_cache_secs: u64,
}

fn default_token_cache_secs() -> u64 {
    300
}

impl AzureMonitorConfig {
    pub fn ingestion_url(&self) -> String {
        format!(
            "{}/dataCollectionRules/{}/streams/{}?api-version={}",
            self.data_collection_endpoint.trim_end_matches('/'),
            self.immutable_id,
            self.stream_name,
            LOGS_INGESTION_API_VERSION
        )
    }
}

/// 控制台输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdoutConfig {
    pub topic: String,
}

/// 单个 sink 实例的路由配置
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// 实例名称 (e.g., "discord[0]")
    pub name: String,
    /// 订阅的 topic filter
    pub topic: String,
    /// 类型及其参数
    pub kind: SinkKind,
}

/// Sink 类型
#[derive(Debug, Clone)]
pub enum SinkKind {
    Discord(DiscordConfig),
    PagerDuty(PagerDutyConfig),
    LogAnalytics(LogAnalyticsConfig),
    AzureMonitor(AzureMonitorConfig),
    Stdout(StdoutConfig),
}

impl SinkKind {
    /// Config key of the kind
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discord(_) => "discord",
            Self::PagerDuty(_) => "pagerduty",
            Self::LogAnalytics(_) => "log_analytics",
            Self::AzureMonitor(_) => "azure_monitor",
            Self::Stdout(_) => "stdout",
        }
    }
}

impl BridgeConfig {
    /// Flatten every configured sink into routing entries
    ///
    /// Order follows the document: discord, pagerduty, log_analytics,
    /// azure_monitor, stdout; instances keep their index within the kind.
    pub fn sink_configs(&self) -> Vec<SinkConfig> {
        fn entries<C: Clone>(
            items: &[C],
            topic: impl Fn(&C) -> &str,
            wrap: impl Fn(C) -> SinkKind,
        ) -> Vec<SinkConfig> {
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    let kind = wrap(item.clone());
                    SinkConfig {
                        name: format!("{}[{}]", kind.label(), idx),
                        topic: topic(item).to_string(),
                        kind,
                    }
                })
                .collect()
        }

        let mut sinks = Vec::with_capacity(self.sink_count());
        sinks.extend(entries(&self.discord, |c| c.topic.as_str(), SinkKind::Discord));
        sinks.extend(entries(&self.pagerduty, |c| c.topic.as_str(), SinkKind::PagerDuty));
        sinks.extend(entries(
            &self.log_analytics,
            |c| c.topic.as_str(),
            SinkKind::LogAnalytics,
        ));
        sinks.extend(entries(
            &self.azure_monitor,
            |c| c.topic.as_str(),
            SinkKind::AzureMonitor,
        ));
        sinks.extend(entries(&self.stdout, |c| c.topic.as_str(), SinkKind::Stdout));
        sinks
    }

    /// Total number of sink instances
    pub fn sink_count(&self) -> usize {
        self.discord.len()
            + self.pagerduty.len()
            + self.log_analytics.len()
            + self.azure_monitor.len()
            + self.stdout.len()
    }
}
