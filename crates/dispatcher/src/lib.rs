//! # Dispatcher
//!
//! 消息分发与投递模块。
//!
//! 负责：
//! - 按 topic filter 将 `Envelope` 路由到匹配的 sinks
//! - 每个 sink 独立队列与 worker，保证顺序、互不阻塞
//! - 重试 / 退避策略与各目标 API 的投递客户端
//! - 终止性失败上报给 Supervisor

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod retry;
pub mod sinks;
pub mod supervisor;
pub mod topic;
pub mod transport;

pub use contracts::{DataSink, Envelope};
pub use dispatcher::{create_dispatcher, summarize, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::{SharedStats, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use retry::{AttemptState, RetryPolicy};
pub use sinks::{
    AzureMonitorSink, CommandTokenProvider, ConsoleSink, DiscordSink, LogAnalyticsSink,
    PagerDutySink, StaticTokenProvider, TokenSource,
};
pub use supervisor::{FailureReporter, SinkFailure, Supervisor};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, MockTransport, ReqwestTransport};
