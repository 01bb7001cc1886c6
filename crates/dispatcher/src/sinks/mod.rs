//! Sink implementations
//!
//! One delivery client per destination kind plus the console sink.

mod azure_monitor;
mod console;
mod discord;
mod log_analytics;
mod pagerduty;
mod token;

use std::borrow::Cow;

use serde::Serialize;

pub use self::azure_monitor::AzureMonitorSink;
pub use self::console::ConsoleSink;
pub use self::discord::{DiscordSink, DISCORD_SUCCESS_STATUS};
pub use self::log_analytics::{
    rfc1123_date, sign, string_to_sign, Clock, LogAnalyticsSink, LOG_ANALYTICS_SUCCESS_STATUS,
    TIME_GENERATED_FIELD,
};
pub use self::pagerduty::{PagerDutySink, PAGERDUTY_SUCCESS_STATUS};
pub use self::token::{CommandTokenProvider, StaticTokenProvider, TokenSource, DEFAULT_TOKEN_COMMAND};

/// Record shape shared by both log ingestion services
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LogRecord<'a> {
    pub time_generated: String,
    pub topic: &'a str,
    pub message: Cow<'a, str>,
}
