//! 投递指标收集模块
//!
//! 记录 envelope 路由、投递结果、重试与退避的运行指标。

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// 投递成功的 status 标签
pub const STATUS_DELIVERED: &str = "delivered";

/// 记录某个 sink 收到一条路由过来的 envelope
pub fn record_envelope_received(sink: &str) {
    counter!(
        "mqtt_bridge_envelopes_received_total",
        "sink" => sink.to_string()
    )
    .increment(1);
}

/// 记录一次投递结果
///
/// `status` 为 `delivered` 或错误类别 (`rejected` / `exhausted` / `transport` / `build`)。
pub fn record_delivery(sink: &str, status: &str) {
    counter!(
        "mqtt_bridge_deliveries_total",
        "sink" => sink.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次重试
pub fn record_delivery_retry(sink: &str, reason: &str) {
    counter!(
        "mqtt_bridge_delivery_retries_total",
        "sink" => sink.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录退避等待时长 (秒)
pub fn record_backoff(sink: &str, seconds: f64) {
    histogram!(
        "mqtt_bridge_backoff_seconds",
        "sink" => sink.to_string()
    )
    .record(seconds);
}

/// 记录投递耗时 (从入队到完成，毫秒)
pub fn record_delivery_latency_ms(sink: &str, latency_ms: f64) {
    histogram!(
        "mqtt_bridge_delivery_latency_ms",
        "sink" => sink.to_string()
    )
    .record(latency_ms);
}

/// 记录队列深度
pub fn record_queue_depth(sink: &str, depth: usize) {
    gauge!(
        "mqtt_bridge_queue_depth",
        "sink" => sink.to_string()
    )
    .set(depth as f64);
}

/// 记录一个 sink 实例因终止性错误停止
pub fn record_sink_failed(sink: &str) {
    counter!(
        "mqtt_bridge_sinks_failed_total",
        "sink" => sink.to_string()
    )
    .increment(1);
}

/// 单个 sink 的累计结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkTally {
    pub delivered: u64,
    pub failed: u64,
}

/// 投递指标聚合器
///
/// 在内存中聚合结果，便于在退出时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// 已投递总数
    pub total_delivered: u64,

    /// 终止性失败总数
    pub total_failed: u64,

    /// 投递耗时统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 各 sink 结果
    pub per_sink: BTreeMap<String, SinkTally>,
}

impl DeliveryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成功投递
    pub fn record_delivered(&mut self, sink: &str, latency_ms: f64) {
        self.total_delivered += 1;
        self.latency_stats.push(latency_ms);
        self.per_sink.entry(sink.to_string()).or_default().delivered += 1;
    }

    /// 记录一次终止性失败
    pub fn record_failed(&mut self, sink: &str) {
        self.total_failed += 1;
        self.per_sink.entry(sink.to_string()).or_default().failed += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DeliverySummary {
        let total = self.total_delivered + self.total_failed;
        DeliverySummary {
            total_delivered: self.total_delivered,
            total_failed: self.total_failed,
            failure_rate: if total > 0 {
                self.total_failed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            per_sink: self.per_sink.clone(),
        }
    }
}

/// 投递摘要
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub total_delivered: u64,
    pub total_failed: u64,
    pub failure_rate: f64,
    pub latency_ms: StatsSummary,
    pub per_sink: BTreeMap<String, SinkTally>,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Delivered: {}", self.total_delivered)?;
        writeln!(
            f,
            "Failed: {} ({:.2}%)",
            self.total_failed, self.failure_rate
        )?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        if !self.per_sink.is_empty() {
            writeln!(f, "Per sink:")?;
            for (sink, tally) in &self.per_sink {
                writeln!(
                    f,
                    "  {sink}: delivered={}, failed={}",
                    tally.delivered, tally.failed
                )?;
            }
        }
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
