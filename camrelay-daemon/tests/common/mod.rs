//! Shared fixtures for relay integration tests
//!
//! `FakeRunner` stands in for ffmpeg: every started task is reported on a
//! channel together with the sender the test uses to script task events.

#![allow(dead_code)]

use camrelay_daemon::transcoder::task_channel;
use camrelay_daemon::{
    IngestEvent, Relay, RelayConfig, RelayError, RelayHandle, Supervisor, TaskEvent, TaskHandle, TaskSpec,
    TranscodeRunner,
};
use camrelay_health::{health_channel, HealthFeed};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A task started by the fake runner.
pub struct StartedTask {
    pub at: Instant,
    pub spec: TaskSpec,
    /// Scripted events for the supervisor.
    pub events: mpsc::UnboundedSender<TaskEvent>,
    /// Fires if the supervisor asked the task to stop.
    pub stop_requested: oneshot::Receiver<()>,
}

impl StartedTask {
    pub fn send(&self, event: TaskEvent) {
        self.events.send(event).expect("supervisor dropped the task");
    }
}

#[derive(Clone)]
pub struct FakeRunner {
    started: mpsc::UnboundedSender<StartedTask>,
}

impl FakeRunner {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StartedTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { started: tx }, rx)
    }
}

impl TranscodeRunner for FakeRunner {
    fn start(&self, spec: &TaskSpec) -> Result<TaskHandle, RelayError> {
        let (handle, control) = task_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        // Exit promptly whenever asked to.
        let stop = control.stop;
        let exited = control.exited;
        tokio::spawn(async move {
            if stop.await.is_ok() {
                let _ = stop_tx.send(());
            }
            let _ = exited.send(());
        });

        let _ = self.started.send(StartedTask {
            at: Instant::now(),
            spec: spec.clone(),
            events: control.events,
            stop_requested: stop_rx,
        });
        Ok(handle)
    }
}

pub fn test_config(stream_key: Option<&str>) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.egress.stream_key = stream_key.map(str::to_string);
    config
}

/// A running relay loop wired to a fake runner.
pub struct Harness {
    pub handle: RelayHandle,
    pub feed: HealthFeed,
    pub started: mpsc::UnboundedReceiver<StartedTask>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn spawn(config: &RelayConfig) -> Self {
        let (runner, started) = FakeRunner::new();
        let (writer, feed) = health_channel(Utc::now());
        let supervisor = Supervisor::from_config(runner, writer, config);
        let (relay, handle) = Relay::new(supervisor);
        let task = tokio::spawn(relay.run());

        Self {
            handle,
            feed,
            started,
            task,
        }
    }

    /// Full camera handshake: pre_connect then post_connect.
    pub async fn connect(&self, peer: &str) {
        self.handle
            .ingest(IngestEvent::PreConnect(peer.to_string()))
            .await
            .unwrap();
        self.handle
            .ingest(IngestEvent::PostConnect(peer.to_string()))
            .await
            .unwrap();
    }

    /// Next started task; fails if none arrives.
    pub async fn next_start(&mut self) -> StartedTask {
        self.started.recv().await.expect("runner channel closed")
    }
}
