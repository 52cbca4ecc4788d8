//! Transcode task abstraction
//!
//! A [`TranscodeRunner`] turns a [`TaskSpec`] into a running task and hands
//! back a [`TaskHandle`]. The handle yields [`TaskEvent`]s and ends with at
//! most one terminal event (`Error` or `End`).

pub mod ffmpeg;
pub mod progress;

use std::fmt;

use tokio::sync::{mpsc, oneshot};

use crate::error::RelayError;
use crate::quality::VideoProfile;

pub use ffmpeg::FfmpegRunner;
pub use progress::{ProgressBlock, ProgressParser};

/// Encoder settings that do not depend on the quality level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub preset: String,
    pub profile: String,
    pub level: String,
    pub threads: u32,
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            profile: "main".to_string(),
            level: "3.1".to_string(),
            threads: 2,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
            audio_channels: 2,
        }
    }
}

/// Everything needed to start one transcode-and-forward task.
///
/// The stream key is only reachable through [`TaskSpec::output_url`];
/// `Debug` and `Display` redact it.
#[derive(Clone)]
pub struct TaskSpec {
    pub input_url: String,
    pub ingest_url: String,
    stream_key: String,
    pub video: VideoProfile,
    pub encoder: EncoderSettings,
}

impl TaskSpec {
    pub fn new(
        input_url: String,
        ingest_url: String,
        stream_key: String,
        video: VideoProfile,
        encoder: EncoderSettings,
    ) -> Self {
        Self {
            input_url,
            ingest_url,
            stream_key,
            video,
            encoder,
        }
    }

    /// Ingest URL with the stream key appended. Never log this.
    pub fn output_url(&self) -> String {
        format!("{}{}", self.ingest_url, self.stream_key)
    }

    pub fn redacted_output_url(&self) -> String {
        format!("{}****", self.ingest_url)
    }

    /// `text` with the output URL and stream key masked, for task output
    /// that echoes its arguments.
    pub fn redact(&self, text: &str) -> String {
        let masked = text.replace(&self.output_url(), &self.redacted_output_url());
        if self.stream_key.is_empty() {
            masked
        } else {
            masked.replace(&self.stream_key, "****")
        }
    }

    /// Input URL without the passphrase.
    pub fn redacted_input_url(&self) -> String {
        match self.input_url.find("&passphrase=") {
            Some(idx) => format!("{}&passphrase=****", &self.input_url[..idx]),
            None => self.input_url.clone(),
        }
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}x{}@{}fps, {}k)",
            self.redacted_input_url(),
            self.redacted_output_url(),
            self.video.width,
            self.video.height,
            self.video.framerate,
            self.video.bitrate_kbps
        )
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("input_url", &self.redacted_input_url())
            .field("output_url", &self.redacted_output_url())
            .field("video", &self.video)
            .field("encoder", &self.encoder)
            .finish()
    }
}

/// Lifecycle event reported by a running task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// Output is flowing to the ingest endpoint
    Started,
    Progress {
        bitrate_kbps: f64,
        dropped_frames: Option<u64>,
    },
    /// Terminal failure
    Error(String),
    /// Terminal clean finish
    End,
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Error(_) | TaskEvent::End)
    }
}

/// Supervisor-side view of a running task.
#[derive(Debug)]
pub struct TaskHandle {
    events: mpsc::UnboundedReceiver<TaskEvent>,
    stop: Option<oneshot::Sender<()>>,
    exited: Option<oneshot::Receiver<()>>,
}

/// Runner-side counterpart of a [`TaskHandle`].
#[derive(Debug)]
pub struct TaskControl {
    pub events: mpsc::UnboundedSender<TaskEvent>,
    /// Fires (or closes) when the supervisor wants the task gone.
    pub stop: oneshot::Receiver<()>,
    /// Send once the task has fully exited.
    pub exited: oneshot::Sender<()>,
}

/// Connected handle/control pair for a new task.
pub fn task_channel() -> (TaskHandle, TaskControl) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let (exited_tx, exited_rx) = oneshot::channel();

    (
        TaskHandle {
            events: events_rx,
            stop: Some(stop_tx),
            exited: Some(exited_rx),
        },
        TaskControl {
            events: events_tx,
            stop: stop_rx,
            exited: exited_tx,
        },
    )
}

impl TaskHandle {
    /// Next event; `None` once the task side has gone away.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.recv().await
    }

    /// Ask the task to stop gracefully and wait until it has exited.
    pub async fn terminate(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(exited) = self.exited.take() {
            let _ = exited.await;
        }
    }
}

/// Starts transcode tasks.
pub trait TranscodeRunner: Send + Sync {
    /// Spawn failures are reported as [`RelayError::Task`].
    fn start(&self, spec: &TaskSpec) -> Result<TaskHandle, RelayError>;
}
