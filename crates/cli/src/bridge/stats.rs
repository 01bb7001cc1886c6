//! Bridge run statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::DeliverySummary;

/// Statistics from a bridge run
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Final counters of every sink, in configuration order
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Sinks stopped by a terminal delivery failure
    pub failed_sinks: Vec<String>,

    /// Aggregated delivery results
    pub delivery: DeliverySummary,
}

impl BridgeStats {
    /// Envelopes accepted by any destination
    pub fn delivered(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.delivered_count).sum()
    }

    /// Envelopes skipped because their sink had stopped
    pub fn not_routed(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.not_routed_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Bridge Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Delivered: {}", self.delivered());
        println!("   ├─ Not routed: {}", self.not_routed());
        println!("   └─ Failed sinks: {}", self.failed_sinks.len());

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks ({})", self.sinks.len());
            for (i, (name, m)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                let state = if self.failed_sinks.contains(name) {
                    "stopped"
                } else {
                    "ok"
                };
                println!(
                    "   {} {} [{}] delivered={} failed={} not_routed={} queued={}",
                    prefix,
                    name,
                    state,
                    m.delivered_count,
                    m.failure_count,
                    m.not_routed_count,
                    m.queue_len
                );
            }
        }

        println!("\n{}", self.delivery);
    }
}
