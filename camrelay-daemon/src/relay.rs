//! Relay event loop
//!
//! One task owns the connection state machine and the supervisor and
//! serializes ingest events, task events and the reconnect timer.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{error, info};

use crate::connection::{Action, ConnectionMachine, ConnectionState, IngestEvent};
use crate::error::RelayError;
use crate::supervisor::Supervisor;
use crate::transcoder::TranscodeRunner;

const COMMAND_QUEUE: usize = 64;

/// Request to the relay task.
#[derive(Debug)]
pub enum RelayCommand {
    Ingest(IngestEvent),
    Status(oneshot::Sender<RelayStatus>),
    /// Stop any session and exit the loop; replies once stopped.
    Shutdown(oneshot::Sender<()>),
}

/// Snapshot of relay control state for the `status` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub connection: ConnectionState,
    pub relaying: bool,
    pub session_id: Option<String>,
    pub attempts: u32,
    pub reconnect_pending: bool,
    pub input_connected: bool,
    pub output_connected: bool,
}

/// Cloneable sender side of the relay task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub async fn ingest(&self, event: IngestEvent) -> Result<(), RelayError> {
        self.send(RelayCommand::Ingest(event)).await
    }

    pub async fn status(&self) -> Result<RelayStatus, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayCommand::Status(tx)).await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn shutdown(&self) -> Result<(), RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayCommand::Shutdown(tx)).await?;
        rx.await.map_err(|_| stopped())
    }

    async fn send(&self, command: RelayCommand) -> Result<(), RelayError> {
        self.tx.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> RelayError {
    RelayError::Ipc("relay task is not running".to_string())
}

pub struct Relay<R> {
    machine: ConnectionMachine,
    supervisor: Supervisor<R>,
    commands: mpsc::Receiver<RelayCommand>,
}

impl<R: TranscodeRunner> Relay<R> {
    pub fn new(supervisor: Supervisor<R>) -> (Self, RelayHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let relay = Self {
            machine: ConnectionMachine::new(),
            supervisor,
            commands: rx,
        };
        (relay, RelayHandle { tx })
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!("Relay loop started");

        loop {
            let retry_at = self.supervisor.retry_deadline();

            tokio::select! {
                biased;

                event = self.supervisor.next_task_event() => {
                    self.supervisor.handle_task_event(event).await;
                }

                command = self.commands.recv() => match command {
                    Some(RelayCommand::Ingest(event)) => self.on_ingest(event).await,
                    Some(RelayCommand::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(RelayCommand::Shutdown(done)) => {
                        self.supervisor.stop_relay().await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.supervisor.stop_relay().await;
                        break;
                    }
                },

                _ = sleep_until(retry_at) => self.supervisor.on_retry_due(),
            }
        }

        info!("Relay loop stopped");
    }

    async fn on_ingest(&mut self, event: IngestEvent) {
        for action in self.machine.apply(event) {
            match action {
                Action::SetInputConnected(connected) => {
                    self.supervisor.set_input_connected(connected)
                }
                Action::StartRelay(peer) => {
                    if let Err(e) = self.supervisor.start_relay(peer) {
                        error!("Failed to start relay: {}", e);
                    }
                }
                Action::StopRelay => {
                    self.supervisor.stop_relay().await;
                }
            }
        }
    }

    fn status(&self) -> RelayStatus {
        let health = self.supervisor.health();
        RelayStatus {
            connection: self.machine.state().clone(),
            relaying: self.supervisor.is_relaying(),
            session_id: self.supervisor.session_id().map(|id| id.to_string()),
            attempts: self.supervisor.attempts(),
            reconnect_pending: self.supervisor.retry_deadline().is_some(),
            input_connected: health.input_connected,
            output_connected: health.output_connected,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
