//! camrelay daemon - SRT camera to RTMPS relay
//!
//! `run` keeps a single ffmpeg relay alive for whichever camera connects to
//! the SRT ingest, reconnecting on transport failures. SRT server hooks call
//! `camrelay-daemon notify <event> <peer>` to report camera connections over
//! the IPC socket; `health` and `status` query a running daemon.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camrelay_broadcaster::{RelayInfo, TelemetryBroadcaster};
use camrelay_daemon::checks::{spawn_memory_check, spawn_status_log};
use camrelay_daemon::ipc::{send_command, IpcServer};
use camrelay_daemon::version::{version_long, version_short};
use camrelay_daemon::{FfmpegRunner, Relay, RelayConfig, Supervisor};
use camrelay_health::{health_channel, AlertEvaluator, AlertThresholds, LogSink};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "camrelay-daemon")]
#[command(version)]
#[command(about = "Relay an SRT camera feed to an RTMPS ingest endpoint")]
struct Cli {
    /// Path to config.toml (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay daemon (default)
    Run,

    /// Report a camera connection event to a running daemon
    Notify {
        #[arg(value_enum)]
        event: NotifyEvent,

        /// Peer identifier reported by the SRT server
        peer: String,
    },

    /// Print the current health snapshot as JSON
    Health,

    /// Print relay control state as JSON
    Status,

    /// Print version and build information
    Version {
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
#[value(rename_all = "snake_case")]
enum NotifyEvent {
    #[value(alias = "preConnect")]
    PreConnect,
    #[value(alias = "postConnect")]
    PostConnect,
    #[value(alias = "doneConnect")]
    DoneConnect,
}

impl NotifyEvent {
    fn command(self, peer: &str) -> String {
        let verb = match self {
            NotifyEvent::PreConnect => "pre_connect",
            NotifyEvent::PostConnect => "post_connect",
            NotifyEvent::DoneConnect => "done_connect",
        };
        format!("{} {}", verb, peer)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Version { verbose } => {
            if verbose {
                print!("{}", version_long());
            } else {
                println!("{}", version_short());
            }
            Ok(())
        }
        Command::Run => {
            let config = RelayConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            run(config).await
        }
        Command::Notify { event, peer } => query(cli.config, &event.command(&peer)).await,
        Command::Health => query(cli.config, "health").await,
        Command::Status => query(cli.config, "status").await,
    }
}

/// Send one command to the running daemon and print the reply.
async fn query(config_path: Option<PathBuf>, command: &str) -> Result<()> {
    let config =
        RelayConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let socket_path = config.ipc_socket_path()?;

    let response = send_command(&socket_path, command).await?;
    if let Some(message) = response.strip_prefix("error: ") {
        anyhow::bail!("{}", message);
    }
    println!("{}", response);
    Ok(())
}

async fn run(config: RelayConfig) -> Result<()> {
    info!("🎥 Starting camrelay daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration loaded from {}", config.config_path.display());

    if config.egress.stream_key().is_none() {
        warn!("⚠️  No stream key configured (egress.stream_key or RELAY_STREAM_KEY); relays will not start");
    }

    let (health, feed) = health_channel(Utc::now());

    let runner = FfmpegRunner::new(
        config.encode.ffmpeg_path.clone(),
        Duration::from_secs(config.encode.stop_grace_secs),
    );
    let supervisor = Supervisor::from_config(runner, health, &config);
    let (relay, handle) = Relay::new(supervisor);
    let mut relay_task = tokio::spawn(relay.run());

    let ipc_path = config.ipc_socket_path()?;
    let ipc_server = IpcServer::new(&ipc_path, handle.clone(), feed.clone())
        .context("Failed to start IPC server")?;
    let ipc_task = tokio::spawn(async move {
        if let Err(e) = ipc_server.run().await {
            error!("IPC server error: {}", e);
        }
    });

    let broadcaster = if config.telemetry.enabled {
        let broadcaster = Arc::new(TelemetryBroadcaster::new(
            config.telemetry_socket_path()?,
            feed.clone(),
            RelayInfo {
                srt_endpoint: config.ingest.endpoint(),
                stream_id: config.ingest.stream_id.clone(),
                has_stream_key: config.egress.stream_key().is_some(),
            },
            config.heartbeat(),
        ));
        broadcaster
            .start()
            .await
            .context("Failed to start telemetry broadcaster")?;
        Some(broadcaster)
    } else {
        None
    };

    let monitor = if config.monitor.enabled {
        let thresholds = AlertThresholds {
            max_dropped_frames: config.monitor.max_dropped_frames,
            min_bitrate_kbps: config.monitor.min_bitrate_kbps,
        };
        let mut evaluator =
            AlertEvaluator::new(thresholds, Utc::now()).with_sink(Arc::new(LogSink));
        if let Some(broadcaster) = &broadcaster {
            evaluator = evaluator.with_sink(broadcaster.clone());
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(evaluator.run(feed.clone(), config.sample_interval(), stop_rx));
        Some((stop_tx, task))
    } else {
        None
    };

    let subscribers = broadcaster.clone();
    let status_task = spawn_status_log(
        feed.clone(),
        move || subscribers.as_ref().map_or(0, |b| b.client_count()),
        config.status_log_interval(),
    );
    let memory_task = spawn_memory_check(
        config.monitor.memory_warn_mb,
        config.memory_check_interval(),
    );

    info!("🚀 camrelay ready");
    info!("   SRT input:  {}", config.ingest.endpoint());
    info!("   IPC socket: {}", ipc_path.display());

    let relay_exited = tokio::select! {
        _ = shutdown_signal() => {
            info!("🛑 Received shutdown signal");
            false
        }
        result = &mut relay_task => {
            if let Err(e) = result {
                error!("Relay task failed: {}", e);
            }
            true
        }
    };

    // Cleanup
    info!("🧹 Shutting down...");
    ipc_task.abort();
    status_task.abort();
    memory_task.abort();

    if !relay_exited {
        if let Err(e) = handle.shutdown().await {
            warn!("Relay shutdown: {}", e);
        }
        if let Err(e) = relay_task.await {
            error!("Relay task failed: {}", e);
        }
    }

    if let Some((stop_tx, task)) = monitor {
        let _ = stop_tx.send(());
        match task.await {
            Ok(evaluator) => {
                let report = evaluator.report(Utc::now());
                info!(
                    "📊 Run summary: {} alerts, stability {}",
                    report.total_alerts, report.stream_stability
                );
                if config.monitor.write_report {
                    let path = config.report_path()?;
                    match report.write_json(&path) {
                        Ok(()) => info!("📄 Run report written to {}", path.display()),
                        Err(e) => warn!("Failed to write run report: {}", e),
                    }
                }
            }
            Err(e) => error!("Alert evaluator failed: {}", e),
        }
    }

    if let Some(broadcaster) = &broadcaster {
        if let Err(e) = broadcaster.stop().await {
            warn!("Telemetry broadcaster stop: {}", e);
        }
    }

    let _ = std::fs::remove_file(&ipc_path);

    info!("👋 camrelay daemon stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
