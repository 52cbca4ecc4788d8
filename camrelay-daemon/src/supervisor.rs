//! Relay process supervisor
//!
//! Owns at most one relay session (one transcode task), the reconnect
//! attempt counter and the pending reconnect deadline, and is the only
//! writer of the health state.

use std::time::Duration;

use camrelay_health::{HealthState, HealthWriter};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::policy::ReconnectPolicy;
use crate::quality::{QualityStrategy, StaticQuality};
use crate::transcoder::{EncoderSettings, TaskEvent, TaskHandle, TaskSpec, TranscodeRunner};

/// Static inputs for building task specs.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub input_url: String,
    pub ingest_url: String,
    pub stream_key: Option<String>,
    pub encoder: EncoderSettings,
    pub progress_log_interval: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        let encode = &config.encode;
        Self {
            input_url: config.ingest.input_url(),
            ingest_url: config.egress.ingest_url.clone(),
            stream_key: config.egress.stream_key().map(str::to_string),
            encoder: EncoderSettings {
                preset: encode.preset.clone(),
                profile: encode.profile.clone(),
                level: encode.level.clone(),
                threads: encode.threads,
                audio_bitrate_kbps: encode.audio_bitrate_kbps,
                audio_sample_rate: encode.audio_sample_rate,
                audio_channels: encode.audio_channels,
            },
            progress_log_interval: Duration::from_secs(config.telemetry.progress_log_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
}

struct RelaySession {
    id: Uuid,
    peer: String,
    handle: TaskHandle,
    started_at: Option<Instant>,
    last_progress_log: Option<Instant>,
}

struct PendingRetry {
    peer: String,
    due: Instant,
}

pub struct Supervisor<R> {
    runner: R,
    health: HealthWriter,
    settings: RelaySettings,
    quality: Box<dyn QualityStrategy>,
    policy: ReconnectPolicy,
    session: Option<RelaySession>,
    attempts: u32,
    retry: Option<PendingRetry>,
}

impl<R: TranscodeRunner> Supervisor<R> {
    pub fn new(
        runner: R,
        health: HealthWriter,
        settings: RelaySettings,
        quality: Box<dyn QualityStrategy>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            runner,
            health,
            settings,
            quality,
            policy,
            session: None,
            attempts: 0,
            retry: None,
        }
    }

    /// Supervisor wired from the loaded configuration.
    pub fn from_config(runner: R, health: HealthWriter, config: &RelayConfig) -> Self {
        let quality = StaticQuality::from_table(&config.encode.quality, &config.encode.profiles);
        Self::new(
            runner,
            health,
            RelaySettings::from_config(config),
            Box::new(quality),
            config.reconnect.clone(),
        )
    }

    /// Start a relay session for `peer` unless one is already running.
    pub fn start_relay(&mut self, peer: String) -> Result<StartOutcome, RelayError> {
        if let Some(session) = &self.session {
            info!(
                "Relay {} already active for {}, ignoring start for {}",
                session.id, session.peer, peer
            );
            return Ok(StartOutcome::AlreadyActive);
        }

        let stream_key = self
            .settings
            .stream_key
            .clone()
            .ok_or(RelayError::MissingCredential)?;

        self.retry = None;

        let spec = TaskSpec::new(
            self.settings.input_url.clone(),
            self.settings.ingest_url.clone(),
            stream_key,
            self.quality.select(),
            self.settings.encoder.clone(),
        );

        let id = Uuid::new_v4();
        info!("🎬 Starting relay {} for {}: {}", id, peer, spec);
        let handle = self.runner.start(&spec)?;

        self.session = Some(RelaySession {
            id,
            peer,
            handle,
            started_at: None,
            last_progress_log: None,
        });
        Ok(StartOutcome::Started)
    }

    /// Stop the current session, if any, cancel any pending reconnect and
    /// reset the retry budget for the next camera session.
    ///
    /// Returns whether a session was stopped.
    pub async fn stop_relay(&mut self) -> bool {
        if self.retry.take().is_some() {
            info!("Pending reconnect cancelled");
        }
        self.attempts = 0;

        let Some(session) = self.session.take() else {
            return false;
        };

        info!("⏹️  Stopping relay {}", session.id);
        session.handle.terminate().await;
        self.health.update(|h| h.end_session());
        info!("Relay {} stopped", session.id);
        true
    }

    pub fn set_input_connected(&mut self, connected: bool) {
        self.health.update(|h| h.set_input_connected(connected));
        if !connected && self.retry.take().is_some() {
            info!("Camera gone, pending reconnect cancelled");
        }
    }

    /// Next event from the current session's task. Never resolves while idle.
    ///
    /// A task whose event stream closes without a terminal event reports `End`.
    pub async fn next_task_event(&mut self) -> TaskEvent {
        match self.session.as_mut() {
            Some(session) => session.handle.next_event().await.unwrap_or_else(|| {
                debug!("Task event stream closed without terminal event");
                TaskEvent::End
            }),
            None => std::future::pending().await,
        }
    }

    pub async fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Started => self.on_started(),
            TaskEvent::Progress {
                bitrate_kbps,
                dropped_frames,
            } => self.on_progress(bitrate_kbps, dropped_frames),
            TaskEvent::Error(message) => self.on_error(message),
            TaskEvent::End => {
                if let Some(session) = self.end_session() {
                    info!("Relay {} ended", session.id);
                }
            }
        }
    }

    fn on_started(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.started_at.is_some() {
            return;
        }

        session.started_at = Some(Instant::now());
        self.attempts = 0;
        self.health.update(|h| h.begin_session(Utc::now()));
        info!("🔴 Relay {} live for {}", session.id, session.peer);
    }

    fn on_progress(&mut self, bitrate_kbps: f64, dropped_frames: Option<u64>) {
        if self.session.as_ref().is_some_and(|s| s.started_at.is_none()) {
            self.on_started();
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let now = Instant::now();
        let uptime = session
            .started_at
            .map(|t| now.duration_since(t).as_secs())
            .unwrap_or(0);

        self.health
            .update(|h| h.record_progress(bitrate_kbps, dropped_frames, uptime));

        let due = session
            .last_progress_log
            .map_or(true, |last| now.duration_since(last) >= self.settings.progress_log_interval);
        if due {
            session.last_progress_log = Some(now);
            let health = self.health.snapshot();
            info!(
                "📊 Relay uptime: {}s, bitrate: {:.0}kbps, dropped: {}",
                health.relay_uptime_seconds, health.bitrate_kbps, health.dropped_frames
            );
        }
    }

    fn on_error(&mut self, message: String) {
        let Some(session) = self.end_session() else {
            return;
        };

        let err = RelayError::from_task_message(message);
        let input_connected = self.health.snapshot().input_connected;

        if input_connected && self.policy.should_retry(err.class(), self.attempts) {
            let delay = self.policy.compute_delay(self.attempts);
            self.attempts += 1;
            self.health.update(|h| h.note_reconnect());
            warn!(
                "⚠️  Relay {} failed ({}), reconnecting in {:?} (attempt {})",
                session.id, err, delay, self.attempts
            );
            self.retry = Some(PendingRetry {
                peer: session.peer,
                due: Instant::now() + delay,
            });
        } else {
            error!("❌ Relay {} failed: {}", session.id, err);
        }
    }

    /// Tear down after a terminal task event.
    fn end_session(&mut self) -> Option<RelaySession> {
        let session = self.session.take()?;
        self.health.update(|h| h.end_session());
        Some(session)
    }

    /// When the pending reconnect is due, if any.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry.as_ref().map(|r| r.due)
    }

    /// Fire the pending reconnect if it is still wanted.
    pub fn on_retry_due(&mut self) {
        let Some(retry) = self.retry.take() else {
            return;
        };

        if !self.health.snapshot().input_connected || self.session.is_some() {
            debug!("Dropping stale reconnect for {}", retry.peer);
            return;
        }

        info!("🔄 Reconnecting relay for {} (attempt {})", retry.peer, self.attempts);
        if let Err(e) = self.start_relay(retry.peer) {
            error!("Reconnect failed: {}", e);
        }
    }

    pub fn is_relaying(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn health(&self) -> HealthState {
        self.health.snapshot()
    }
}
