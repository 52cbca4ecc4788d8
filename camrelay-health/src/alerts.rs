//! Alert evaluation over sampled health state
//!
//! The evaluator polls a [`HealthFeed`] on its own schedule, checks each
//! sample against [`AlertThresholds`], hands alerts to every registered
//! [`AlertSink`] and keeps them for the run report.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::feed::HealthFeed;
use crate::models::HealthState;
use crate::report::RunReport;

/// Alert thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    pub max_dropped_frames: u64,
    pub min_bitrate_kbps: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_dropped_frames: 100,
            min_bitrate_kbps: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    /// `High` once more than two issues co-occur.
    pub fn for_issue_count(count: usize) -> Self {
        if count > 2 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// A single condition found in a health sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    HighDroppedFrames { dropped_frames: u64 },
    LowBitrate { bitrate_kbps: f64 },
    InputDisconnected,
    /// Output down while the camera is still connected.
    OutputDisconnected,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::HighDroppedFrames { dropped_frames } => {
                write!(f, "High dropped frames: {}", dropped_frames)
            }
            Issue::LowBitrate { bitrate_kbps } => write!(f, "Low bitrate: {:.0} Kbps", bitrate_kbps),
            Issue::InputDisconnected => write!(f, "Camera input disconnected"),
            Issue::OutputDisconnected => write!(f, "Output disconnected but input active"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub issues: Vec<Issue>,
}

impl Alert {
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Check one sample against the thresholds.
pub fn evaluate(health: &HealthState, thresholds: &AlertThresholds) -> Vec<Issue> {
    let mut issues = Vec::new();

    if health.dropped_frames > thresholds.max_dropped_frames {
        issues.push(Issue::HighDroppedFrames {
            dropped_frames: health.dropped_frames,
        });
    }

    if health.bitrate_kbps > 0.0 && health.bitrate_kbps < thresholds.min_bitrate_kbps {
        issues.push(Issue::LowBitrate {
            bitrate_kbps: health.bitrate_kbps,
        });
    }

    if !health.input_connected {
        issues.push(Issue::InputDisconnected);
    }

    if !health.output_connected && health.input_connected {
        issues.push(Issue::OutputDisconnected);
    }

    issues
}

/// Destination for raised alerts (logs, telemetry subscribers, push services).
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert);
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: &Alert) {
        warn!("🚨 ALERT [{}]: {}", alert.severity, alert.summary());
    }
}

/// Samples health, raises alerts and accumulates run statistics.
pub struct AlertEvaluator {
    thresholds: AlertThresholds,
    sinks: Vec<Arc<dyn AlertSink>>,
    started_at: DateTime<Utc>,
    alerts: Vec<Alert>,
    last_dropped_frames: u64,
    bitrate_sum: f64,
    bitrate_samples: u64,
    max_reconnects: u32,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertThresholds, started_at: DateTime<Utc>) -> Self {
        Self {
            thresholds,
            sinks: Vec::new(),
            started_at,
            alerts: Vec::new(),
            last_dropped_frames: 0,
            bitrate_sum: 0.0,
            bitrate_samples: 0,
            max_reconnects: 0,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Evaluate one sample taken at `now`; returns the alert if one was raised.
    pub fn sample(&mut self, health: &HealthState, now: DateTime<Utc>) -> Option<Alert> {
        self.last_dropped_frames = health.dropped_frames;
        self.max_reconnects = self.max_reconnects.max(health.reconnect_count);
        if health.bitrate_kbps > 0.0 {
            self.bitrate_sum += health.bitrate_kbps;
            self.bitrate_samples += 1;
        }

        let issues = evaluate(health, &self.thresholds);
        if issues.is_empty() {
            if health.input_connected && health.output_connected {
                debug!(
                    "✅ Stream healthy - uptime: {}s, bitrate: {:.0}kbps",
                    health.relay_uptime_seconds, health.bitrate_kbps
                );
            }
            return None;
        }

        let alert = Alert {
            timestamp: now,
            severity: Severity::for_issue_count(issues.len()),
            issues,
        };

        for sink in &self.sinks {
            sink.deliver(&alert);
        }
        self.alerts.push(alert.clone());

        Some(alert)
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_dropped_frames(&self) -> u64 {
        self.last_dropped_frames
    }

    pub fn max_reconnects(&self) -> u32 {
        self.max_reconnects
    }

    /// Mean of the nonzero bitrate samples seen so far.
    pub fn average_bitrate_kbps(&self) -> f64 {
        if self.bitrate_samples == 0 {
            0.0
        } else {
            self.bitrate_sum / self.bitrate_samples as f64
        }
    }

    pub fn report(&self, now: DateTime<Utc>) -> RunReport {
        RunReport::from_evaluator(self, now)
    }

    /// Sample `feed` every `period` until `shutdown` fires, then hand the
    /// evaluator back for reporting.
    pub async fn run(
        mut self,
        feed: HealthFeed,
        period: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Self {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; skip it so the first sample
        // lands one full period after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = feed.snapshot();
                    self.sample(&snapshot, Utc::now());
                }
                _ = &mut shutdown => break,
            }
        }

        self
    }
}
