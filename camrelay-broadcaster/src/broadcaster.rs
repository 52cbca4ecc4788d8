use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camrelay_health::{Alert, AlertSink, HealthFeed};
use parking_lot::Mutex;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use crate::client::ClientManager;
use crate::error::{BroadcasterError, Result};
use crate::events::{BroadcastEvent, RelayInfo};

/// Pushes relay health to telemetry subscribers over a Unix socket
pub struct TelemetryBroadcaster {
    socket_path: PathBuf,
    feed: HealthFeed,
    info: RelayInfo,
    heartbeat: Duration,
    client_manager: ClientManager,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl TelemetryBroadcaster {
    /// Create new broadcaster
    pub fn new(
        socket_path: impl AsRef<Path>,
        feed: HealthFeed,
        info: RelayInfo,
        heartbeat: Duration,
    ) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            feed,
            info,
            heartbeat,
            client_manager: ClientManager::new(),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Start listening for subscribers and pushing health
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BroadcasterError::AlreadyRunning);
        }

        match self.bind() {
            Ok(listener) => {
                let accept = self.spawn_accept(listener);
                let push = self.spawn_push();
                self.tasks.lock().extend([accept, push]);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn bind(&self) -> Result<UnixListener> {
        // Remove stale socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Set secure permissions (0600 = owner-only access)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, permissions)?;
        }

        tracing::info!(
            "Telemetry broadcaster started on {:?} (permissions: 0600)",
            self.socket_path
        );
        Ok(listener)
    }

    fn spawn_accept(&self, listener: UnixListener) -> JoinHandle<()> {
        let clients = self.client_manager.clone();
        let feed = self.feed.clone();
        let info = self.info.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let catch_up = || {
                            vec![
                                BroadcastEvent::health(feed.snapshot()),
                                BroadcastEvent::Config { data: info.clone() },
                            ]
                        };
                        if let Err(e) = clients.add_client(stream, catch_up) {
                            tracing::warn!("Failed to send catch-up data: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept client: {}", e);
                    }
                }
            }
        })
    }

    fn spawn_push(&self) -> JoinHandle<()> {
        let clients = self.client_manager.clone();
        let mut feed = self.feed.clone();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::spawn(async move {
            // Subscribers get their first snapshot on connect.
            heartbeat.tick().await;

            loop {
                let state = tokio::select! {
                    _ = heartbeat.tick() => feed.snapshot(),
                    changed = feed.changed() => match changed {
                        Ok(state) => state,
                        Err(_) => {
                            tracing::info!("Health feed closed, telemetry push stopped");
                            break;
                        }
                    },
                };

                if let Err(e) = clients.broadcast(&BroadcastEvent::health(state)) {
                    tracing::error!("Failed to broadcast health: {}", e);
                }
            }
        })
    }

    /// Stop the broadcaster
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(BroadcasterError::NotStarted);
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.client_manager.clear();

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        tracing::info!("Telemetry broadcaster stopped");
        Ok(())
    }

    /// Push an alert to every subscriber
    pub fn publish_alert(&self, alert: &Alert) {
        if let Err(e) = self.client_manager.broadcast(&BroadcastEvent::alert(alert)) {
            tracing::error!("Failed to broadcast alert: {}", e);
        }
    }

    /// Get current client count
    pub fn client_count(&self) -> usize {
        self.client_manager.client_count()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl AlertSink for TelemetryBroadcaster {
    fn deliver(&self, alert: &Alert) {
        self.publish_alert(alert);
    }
}

impl Drop for TelemetryBroadcaster {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        if self.running.load(Ordering::SeqCst) && self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
