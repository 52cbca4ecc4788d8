//! IPC socket round trips against a live relay loop

#![cfg(unix)]

mod common;

use camrelay_daemon::ipc::{send_command, IpcServer};
use camrelay_daemon::TaskEvent;
use common::{test_config, Harness};
use tempfile::TempDir;
use tokio_test::assert_ok;

async fn serve(relay: &Harness) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("camrelay.sock");
    let server = IpcServer::new(&socket, relay.handle.clone(), relay.feed.clone()).unwrap();
    tokio::spawn(server.run());
    (dir, socket)
}

#[tokio::test]
async fn test_ingest_hooks_drive_relay() {
    let mut relay = Harness::spawn(&test_config(Some("KEY")));
    let (_dir, socket) = serve(&relay).await;

    assert_eq!(assert_ok!(send_command(&socket, "pre_connect cam-1").await), "ok");
    assert_eq!(assert_ok!(send_command(&socket, "post_connect cam-1").await), "ok");

    let task = relay.next_start().await;
    task.send(TaskEvent::Started);
    task.send(TaskEvent::Progress {
        bitrate_kbps: 2500.0,
        dropped_frames: Some(3),
    });

    let status: serde_json::Value =
        serde_json::from_str(&send_command(&socket, "status").await.unwrap()).unwrap();
    assert_eq!(status["relaying"], true);
    assert_eq!(status["connection"]["state"], "peer_connected");
    assert_eq!(status["connection"]["peer"], "cam-1");

    let health: serde_json::Value =
        serde_json::from_str(&send_command(&socket, "health").await.unwrap()).unwrap();
    assert_eq!(health["inputConnected"], true);
    assert_eq!(health["outputConnected"], true);
    assert_eq!(health["bitrateKbps"], 2500.0);
    assert_eq!(health["droppedFrames"], 3);

    assert_eq!(send_command(&socket, "done_connect cam-1").await.unwrap(), "ok");
    let health: serde_json::Value =
        serde_json::from_str(&send_command(&socket, "health").await.unwrap()).unwrap();
    assert_eq!(health["inputConnected"], false);
    assert_eq!(health["outputConnected"], false);
}

#[tokio::test]
async fn test_unknown_command_reports_error() {
    let relay = Harness::spawn(&test_config(Some("KEY")));
    let (_dir, socket) = serve(&relay).await;

    let reply = send_command(&socket, "toggle").await.unwrap();
    assert!(reply.starts_with("error: "), "got {}", reply);

    let reply = send_command(&socket, "post_connect").await.unwrap();
    assert!(reply.starts_with("error: "), "got {}", reply);
}

#[tokio::test]
async fn test_quit_stops_relay_loop() {
    let relay = Harness::spawn(&test_config(Some("KEY")));
    let (_dir, socket) = serve(&relay).await;

    assert_eq!(send_command(&socket, "quit").await.unwrap(), "ok");
    assert_ok!(relay.task.await);
}

#[tokio::test]
async fn test_socket_is_owner_only() {
    let relay = Harness::spawn(&test_config(Some("KEY")));
    let (_dir, socket) = serve(&relay).await;

    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_send_command_without_daemon() {
    let dir = TempDir::new().unwrap();
    let err = send_command(&dir.path().join("missing.sock"), "health")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is the daemon running?"));
}
