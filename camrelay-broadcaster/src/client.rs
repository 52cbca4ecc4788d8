use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::Result;
use crate::events::BroadcastEvent;

/// Outbound lines buffered per subscriber before pushes are skipped.
pub const CLIENT_QUEUE_CAPACITY: usize = 32;

/// Client connection handle; the socket itself lives in a writer task.
pub struct Client {
    id: u64,
    tx: mpsc::Sender<Arc<str>>,
}

impl Client {
    /// Spawn the writer task for `stream`.
    fn spawn(id: u64, mut stream: UnixStream) -> Self {
        let (tx, mut rx) = mpsc::channel::<Arc<str>>(CLIENT_QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = stream.write_all(line.as_bytes()).await {
                    tracing::debug!("Client {} write failed: {}", id, e);
                    break;
                }
            }
        });

        Self { id, tx }
    }

    /// Queue a line without waiting.
    fn offer(&self, line: &Arc<str>) -> Delivery {
        match self.tx.try_send(Arc::clone(line)) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Skipped,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}

enum Delivery {
    Queued,
    Skipped,
    Gone,
}

/// Thread-safe client list manager
#[derive(Clone, Default)]
pub struct ClientManager {
    clients: Arc<Mutex<Vec<Client>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber, queueing `catch_up` ahead of any broadcast.
    ///
    /// `catch_up` runs under the client-list lock so no broadcast can slip in
    /// between the snapshot and registration.
    pub fn add_client<F>(&self, stream: UnixStream, catch_up: F) -> Result<()>
    where
        F: FnOnce() -> Vec<BroadcastEvent>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Client::spawn(id, stream);

        let mut clients = self.clients.lock();
        for event in catch_up() {
            let line: Arc<str> = event.to_json_line()?.into();
            // Fresh queue, so only a dead writer can refuse here.
            if let Delivery::Gone = client.offer(&line) {
                return Ok(());
            }
        }
        clients.push(client);
        tracing::info!("New client connected. Total clients: {}", clients.len());
        Ok(())
    }

    /// Broadcast event to all clients, removing dead ones.
    ///
    /// Never blocks: a subscriber whose queue is full misses this event.
    pub fn broadcast(&self, event: &BroadcastEvent) -> Result<()> {
        let line: Arc<str> = event.to_json_line()?.into();

        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|client| match client.offer(&line) {
            Delivery::Queued => true,
            Delivery::Skipped => {
                tracing::debug!("Client {} queue full, skipping event", client.id);
                true
            }
            Delivery::Gone => false,
        });

        let removed = before - clients.len();
        if removed > 0 {
            tracing::info!(
                "Removed {} dead client(s). Remaining: {}",
                removed,
                clients.len()
            );
        }

        Ok(())
    }

    /// Get current client count
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Drop every client; their writer tasks finish once queues drain.
    pub fn clear(&self) {
        self.clients.lock().clear();
    }
}
