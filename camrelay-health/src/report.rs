//! End-of-run stream report

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alerts::{Alert, AlertEvaluator};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Overall stream stability, graded by alerts per hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stability {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Stability {
    /// Grade `alert_count` over a run of `runtime_minutes` (floored at one minute).
    pub fn grade(alert_count: usize, runtime_minutes: i64) -> Self {
        let minutes = runtime_minutes.max(1) as f64;
        let alerts_per_hour = alert_count as f64 / minutes * 60.0;

        if alerts_per_hour < 1.0 {
            Stability::Excellent
        } else if alerts_per_hour < 3.0 {
            Stability::Good
        } else if alerts_per_hour < 6.0 {
            Stability::Fair
        } else {
            Stability::Poor
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stability::Excellent => "EXCELLENT",
            Stability::Good => "GOOD",
            Stability::Fair => "FAIR",
            Stability::Poor => "POOR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_duration: String,
    pub total_dropped_frames: u64,
    pub average_bitrate_kbps: u64,
    pub reconnect_count: u32,
    pub total_alerts: usize,
    pub stream_stability: Stability,
    pub recommendations: Vec<String>,
    pub detailed_alerts: Vec<Alert>,
}

impl RunReport {
    pub(crate) fn from_evaluator(evaluator: &AlertEvaluator, now: DateTime<Utc>) -> Self {
        let runtime = now - evaluator.started_at();
        let runtime_secs = runtime.num_seconds().max(0);
        let hours = runtime_secs / 3600;
        let minutes = (runtime_secs % 3600) / 60;

        let alerts = evaluator.alerts().to_vec();
        let average_bitrate = evaluator.average_bitrate_kbps();

        let recommendations = recommendations(
            evaluator.last_dropped_frames(),
            average_bitrate,
            evaluator.max_reconnects(),
            alerts.len(),
        );

        Self {
            run_duration: format!("{}h {}m", hours, minutes),
            total_dropped_frames: evaluator.last_dropped_frames(),
            average_bitrate_kbps: average_bitrate.round() as u64,
            reconnect_count: evaluator.max_reconnects(),
            total_alerts: alerts.len(),
            stream_stability: Stability::grade(alerts.len(), runtime.num_minutes()),
            recommendations,
            detailed_alerts: alerts,
        }
    }

    /// Write as pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn recommendations(
    dropped_frames: u64,
    average_bitrate_kbps: f64,
    reconnects: u32,
    alert_count: usize,
) -> Vec<String> {
    let mut out = Vec::new();

    if dropped_frames > 500 {
        out.push("Consider reducing video quality due to high frame drops".to_string());
    }
    if average_bitrate_kbps < 2000.0 {
        out.push("Network bandwidth may be insufficient for current quality".to_string());
    }
    if reconnects > 3 {
        out.push("Check uplink signal strength and encoder position".to_string());
    }
    if alert_count > 10 {
        out.push("Consider a backup streaming path for future events".to_string());
    }

    if out.is_empty() {
        out.push("Stream performed well - no major issues detected".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertThresholds;
    use crate::models::HealthState;
    use chrono::Duration;
    use tempfile::tempdir;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn streaming(bitrate: f64, dropped: u64) -> HealthState {
        let mut state = HealthState::new(start());
        state.set_input_connected(true);
        state.begin_session(start());
        state.record_progress(bitrate, Some(dropped), 10);
        state
    }

    #[test]
    fn test_stability_grades() {
        assert_eq!(Stability::grade(0, 60), Stability::Excellent);
        assert_eq!(Stability::grade(2, 60), Stability::Good);
        assert_eq!(Stability::grade(5, 60), Stability::Fair);
        assert_eq!(Stability::grade(6, 60), Stability::Poor);
    }

    #[test]
    fn test_short_run_is_floored_at_one_minute() {
        // A zero-length run must not divide by zero.
        assert_eq!(Stability::grade(0, 0), Stability::Excellent);
        assert_eq!(Stability::grade(1, 0), Stability::Poor);
    }

    #[test]
    fn test_clean_run_report() {
        let mut evaluator = AlertEvaluator::new(AlertThresholds::default(), start());
        evaluator.sample(&streaming(3000.0, 2), start() + Duration::seconds(10));
        evaluator.sample(&streaming(3400.0, 4), start() + Duration::seconds(20));

        let report = evaluator.report(start() + Duration::minutes(125));
        assert_eq!(report.run_duration, "2h 5m");
        assert_eq!(report.total_dropped_frames, 4);
        assert_eq!(report.average_bitrate_kbps, 3200);
        assert_eq!(report.total_alerts, 0);
        assert_eq!(report.stream_stability, Stability::Excellent);
        assert_eq!(
            report.recommendations,
            vec!["Stream performed well - no major issues detected"]
        );
    }

    #[test]
    fn test_troubled_run_recommendations() {
        let mut evaluator = AlertEvaluator::new(AlertThresholds::default(), start());
        for i in 0..12 {
            let mut state = streaming(900.0, 600);
            state.reconnect_count = 4;
            evaluator.sample(&state, start() + Duration::seconds(10 * i));
        }

        let report = evaluator.report(start() + Duration::minutes(30));
        assert_eq!(report.total_alerts, 12);
        assert_eq!(report.reconnect_count, 4);
        assert_eq!(report.stream_stability, Stability::Poor);
        assert_eq!(report.recommendations.len(), 4);
        assert_eq!(report.detailed_alerts.len(), 12);
    }

    #[test]
    fn test_write_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-report.json");

        let evaluator = AlertEvaluator::new(AlertThresholds::default(), start());
        evaluator.report(start() + Duration::minutes(1)).write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["run_duration"], "0h 1m");
        assert_eq!(json["stream_stability"], "EXCELLENT");
        assert!(json["detailed_alerts"].as_array().unwrap().is_empty());
    }
}
