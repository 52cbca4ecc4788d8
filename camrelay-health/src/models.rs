//! Health data model
//!
//! Field names serialize in camelCase so dashboards consuming the JSON see
//! `inputConnected`, `bitrateKbps`, and so on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current link and relay state for one relay instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
    /// Camera peer is connected (between post-connect and disconnect).
    pub input_connected: bool,

    /// Transcode task is running and pushing to the ingest endpoint.
    pub output_connected: bool,

    /// Last reported encode bitrate, 0 when not relaying.
    pub bitrate_kbps: f64,

    /// Dropped frames in the current (or last) session.
    pub dropped_frames: u64,

    /// Seconds since the current session started, 0 when not relaying.
    pub relay_uptime_seconds: u64,

    /// Wall-clock start of the current session.
    pub session_started_at: Option<DateTime<Utc>>,

    /// Reconnects scheduled since the server started.
    pub reconnect_count: u32,

    server_start_time: DateTime<Utc>,
}

impl HealthState {
    pub fn new(server_start_time: DateTime<Utc>) -> Self {
        Self {
            input_connected: false,
            output_connected: false,
            bitrate_kbps: 0.0,
            dropped_frames: 0,
            relay_uptime_seconds: 0,
            session_started_at: None,
            reconnect_count: 0,
            server_start_time,
        }
    }

    pub fn server_start_time(&self) -> DateTime<Utc> {
        self.server_start_time
    }

    /// Whole seconds the server has been up at `now`.
    pub fn server_uptime_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.server_start_time).num_seconds().max(0) as u64
    }

    pub fn set_input_connected(&mut self, connected: bool) {
        self.input_connected = connected;
    }

    /// A new relay session is live. Per-session counters restart.
    pub fn begin_session(&mut self, started_at: DateTime<Utc>) {
        self.output_connected = true;
        self.session_started_at = Some(started_at);
        self.bitrate_kbps = 0.0;
        self.dropped_frames = 0;
        self.relay_uptime_seconds = 0;
    }

    /// Apply one progress sample. Dropped frames never decrease within a session.
    pub fn record_progress(&mut self, bitrate_kbps: f64, dropped_frames: Option<u64>, uptime_seconds: u64) {
        self.bitrate_kbps = bitrate_kbps;
        self.relay_uptime_seconds = uptime_seconds;
        if let Some(dropped) = dropped_frames {
            self.dropped_frames = self.dropped_frames.max(dropped);
        }
    }

    /// The session is gone. Dropped frames stay visible until the next session.
    pub fn end_session(&mut self) {
        self.output_connected = false;
        self.session_started_at = None;
        self.bitrate_kbps = 0.0;
        self.relay_uptime_seconds = 0;
    }

    pub fn note_reconnect(&mut self) {
        self.reconnect_count = self.reconnect_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = HealthState::new(start());
        assert!(!state.input_connected);
        assert!(!state.output_connected);
        assert_eq!(state.bitrate_kbps, 0.0);
        assert_eq!(state.session_started_at, None);
        assert_eq!(state.server_start_time(), start());
    }

    #[test]
    fn test_camel_case_serialization() {
        let state = HealthState::new(start());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["inputConnected"], false);
        assert_eq!(json["outputConnected"], false);
        assert_eq!(json["bitrateKbps"], 0.0);
        assert_eq!(json["droppedFrames"], 0);
        assert_eq!(json["relayUptimeSeconds"], 0);
        assert!(json["serverStartTime"].is_string());
    }

    #[test]
    fn test_dropped_frames_never_decrease_within_session() {
        let mut state = HealthState::new(start());
        state.begin_session(start());

        state.record_progress(3000.0, Some(12), 5);
        state.record_progress(3000.0, Some(7), 6);
        assert_eq!(state.dropped_frames, 12);

        state.record_progress(2900.0, None, 7);
        assert_eq!(state.dropped_frames, 12);
        assert_eq!(state.relay_uptime_seconds, 7);
    }

    #[test]
    fn test_new_session_resets_counters() {
        let mut state = HealthState::new(start());
        state.begin_session(start());
        state.record_progress(3200.0, Some(40), 90);
        state.end_session();

        assert!(!state.output_connected);
        assert_eq!(state.bitrate_kbps, 0.0);
        assert_eq!(state.relay_uptime_seconds, 0);
        assert_eq!(state.dropped_frames, 40, "last session's drops remain visible");

        state.begin_session(start() + Duration::minutes(3));
        assert!(state.output_connected);
        assert!(state.session_started_at.is_some());
        assert_eq!(state.dropped_frames, 0);
    }

    #[test]
    fn test_server_uptime() {
        let state = HealthState::new(start());
        assert_eq!(state.server_uptime_seconds(start() + Duration::seconds(125)), 125);
        assert_eq!(state.server_uptime_seconds(start() - Duration::seconds(5)), 0);
    }
}
