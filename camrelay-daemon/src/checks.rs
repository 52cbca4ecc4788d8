//! Periodic self-checks: status log and memory watch

use std::time::Duration;

use camrelay_health::{HealthFeed, HealthState, MemoryMonitor, MemoryThresholds};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::RelayError;

/// One-line summary for the periodic status log.
pub fn status_line(health: &HealthState, now: DateTime<Utc>, subscribers: usize) -> String {
    format!(
        "Server uptime: {}s, relaying: {}, camera: {}, subscribers: {}",
        health.server_uptime_seconds(now),
        health.output_connected,
        if health.input_connected { "connected" } else { "disconnected" },
        subscribers
    )
}

/// Log a status line every `period`.
pub fn spawn_status_log<F>(feed: HealthFeed, subscribers: F, period: Duration) -> JoinHandle<()>
where
    F: Fn() -> usize + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("📈 {}", status_line(&feed.snapshot(), Utc::now(), subscribers()));
        }
    })
}

/// `ResourceExhaustion` if the process is over its memory budget.
pub fn check_memory(monitor: &mut MemoryMonitor) -> Option<RelayError> {
    let limit_mb = monitor.thresholds().process_warning_mb;
    monitor
        .check_process()
        .map(|process_mb| RelayError::ResourceExhaustion { process_mb, limit_mb })
}

/// Check process memory every `period`; over-budget is logged, never fatal.
pub fn spawn_memory_check(limit_mb: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = MemoryMonitor::with_thresholds(MemoryThresholds {
            process_warning_mb: limit_mb,
            ..Default::default()
        });
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Some(err) = check_memory(&mut monitor) {
                warn!("⚠️  {}", err);
            }
        }
    })
}
