use camrelay_health::{Alert, HealthState, Severity};
use serde::{Deserialize, Serialize};

/// Event types pushed to telemetry subscribers
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    /// Full health snapshot (heartbeat, on change, and on subscribe)
    #[serde(rename = "health")]
    Health { data: HealthState, timestamp: f64 },

    /// Static relay description, sent once on subscribe
    #[serde(rename = "config")]
    Config { data: RelayInfo },

    /// Alert raised by the evaluator
    #[serde(rename = "alert")]
    Alert {
        severity: Severity,
        issues: Vec<String>,
        timestamp: f64,
    },
}

/// What subscribers need to know about the relay's endpoints.
///
/// Never carries the stream key itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayInfo {
    pub srt_endpoint: String,
    pub stream_id: String,
    pub has_stream_key: bool,
}

impl BroadcastEvent {
    pub fn health(state: HealthState) -> Self {
        BroadcastEvent::Health {
            data: state,
            timestamp: now_secs(),
        }
    }

    pub fn alert(alert: &Alert) -> Self {
        BroadcastEvent::Alert {
            severity: alert.severity,
            issues: alert.issues.iter().map(ToString::to_string).collect(),
            timestamp: alert.timestamp.timestamp_millis() as f64 / 1000.0,
        }
    }

    /// Convert event to JSON string with newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
