//! Unix socket IPC server for ingest hooks and status queries

use std::path::Path;

use anyhow::{Context, Result};
use camrelay_health::HealthFeed;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::connection::IngestEvent;
use crate::relay::RelayHandle;

/// IPC command
#[derive(Debug, PartialEq, Eq)]
enum IpcCommand {
    Ingest(IngestEvent),
    Health,
    Status,
    Quit,
}

impl IpcCommand {
    fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_lowercase();
        let peer = parts.next().map(str::to_string);

        let ingest = |make: fn(String) -> IngestEvent| -> Result<Self> {
            let peer = peer
                .clone()
                .with_context(|| format!("{} requires a peer id", verb))?;
            Ok(Self::Ingest(make(peer)))
        };

        match verb.as_str() {
            "pre_connect" | "preconnect" => ingest(IngestEvent::PreConnect),
            "post_connect" | "postconnect" => ingest(IngestEvent::PostConnect),
            "done_connect" | "doneconnect" => ingest(IngestEvent::DoneConnect),
            "health" => Ok(Self::Health),
            "status" => Ok(Self::Status),
            "quit" | "exit" | "shutdown" => Ok(Self::Quit),
            _ => anyhow::bail!("Unknown command: {}", s.trim()),
        }
    }
}

/// Unix socket IPC server
pub struct IpcServer {
    listener: UnixListener,
    relay: RelayHandle,
    feed: HealthFeed,
}

impl IpcServer {
    /// Create new IPC server
    pub fn new(socket_path: &Path, relay: RelayHandle, feed: HealthFeed) -> Result<Self> {
        // Remove existing socket if it exists
        let _ = std::fs::remove_file(socket_path);

        let listener = UnixListener::bind(socket_path).context("Failed to bind Unix socket")?;
        camrelay_paths::secure_socket_permissions(socket_path)?;

        info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            listener,
            relay,
            feed,
        })
    }

    /// Accept connections forever, one task per connection.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .context("Failed to accept connection")?;

            let relay = self.relay.clone();
            let feed = self.feed.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, relay, feed).await {
                    error!("IPC connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single IPC connection
pub async fn handle_connection(
    mut stream: UnixStream,
    relay: RelayHandle,
    feed: HealthFeed,
) -> Result<()> {
    let mut request = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        if reader.read_line(&mut request).await? == 0 {
            return Ok(());
        }
    }

    debug!("Received IPC command: {}", request.trim());

    let response = match IpcCommand::parse(&request) {
        Ok(IpcCommand::Ingest(event)) => match relay.ingest(event).await {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error: {}", e),
        },
        Ok(IpcCommand::Health) => serde_json::to_string(&feed.snapshot())?,
        Ok(IpcCommand::Status) => match relay.status().await {
            Ok(status) => serde_json::to_string(&status)?,
            Err(e) => format!("error: {}", e),
        },
        Ok(IpcCommand::Quit) => {
            info!("Received quit command");
            match relay.shutdown().await {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("error: {}", e),
            }
        }
        Err(e) => format!("error: {}", e),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    Ok(())
}

/// Send one command to a running daemon and return its reply.
pub async fn send_command(socket_path: &Path, command: &str) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {} (is the daemon running?)", socket_path.display()))?;

    stream.write_all(command.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_commands() {
        assert_eq!(
            IpcCommand::parse("pre_connect cam-1\n").unwrap(),
            IpcCommand::Ingest(IngestEvent::PreConnect("cam-1".into()))
        );
        assert_eq!(
            IpcCommand::parse("POST_CONNECT cam-1").unwrap(),
            IpcCommand::Ingest(IngestEvent::PostConnect("cam-1".into()))
        );
        assert_eq!(
            IpcCommand::parse("doneConnect cam-1").unwrap(),
            IpcCommand::Ingest(IngestEvent::DoneConnect("cam-1".into()))
        );
    }

    #[test]
    fn test_parse_queries() {
        assert_eq!(IpcCommand::parse("health").unwrap(), IpcCommand::Health);
        assert_eq!(IpcCommand::parse(" status \n").unwrap(), IpcCommand::Status);
        assert_eq!(IpcCommand::parse("quit").unwrap(), IpcCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(IpcCommand::parse("pre_connect").is_err());
        let err = IpcCommand::parse("toggle").unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: toggle");
        assert!(IpcCommand::parse("").is_err());
    }
}
