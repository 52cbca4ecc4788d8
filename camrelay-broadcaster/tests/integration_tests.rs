use camrelay_broadcaster::{RelayInfo, TelemetryBroadcaster};
use camrelay_health::{health_channel, Alert, AlertSink, HealthWriter, Issue, Severity};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio_test::assert_ok;

fn info() -> RelayInfo {
    RelayInfo {
        srt_endpoint: "srt://0.0.0.0:9999".to_string(),
        stream_id: "camera".to_string(),
        has_stream_key: true,
    }
}

async fn start(path: &Path, heartbeat: Duration) -> (TelemetryBroadcaster, HealthWriter) {
    let (writer, feed) = health_channel(Utc::now());
    let broadcaster = TelemetryBroadcaster::new(path, feed, info(), heartbeat);
    assert_ok!(broadcaster.start().await);
    (broadcaster, writer)
}

async fn subscribe(path: &Path) -> Lines<BufReader<UnixStream>> {
    let stream = UnixStream::connect(path).await.unwrap();
    BufReader::new(stream).lines()
}

async fn next_event(lines: &mut Lines<BufReader<UnixStream>>) -> serde_json::Value {
    let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .expect("timed out waiting for event")
        .unwrap()
        .expect("stream closed");
    serde_json::from_str(&line).unwrap()
}

async fn wait_for_clients(broadcaster: &TelemetryBroadcaster, count: usize) {
    for _ in 0..100 {
        if broadcaster.client_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {} clients, have {}",
        count,
        broadcaster.client_count()
    );
}

#[tokio::test]
async fn test_broadcaster_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test.sock");

    let (broadcaster, _writer) = start(&socket_path, Duration::from_secs(10)).await;
    assert!(socket_path.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    assert_ok!(broadcaster.stop().await);
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn test_new_subscriber_gets_snapshot_before_heartbeat() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("catchup.sock");

    // Heartbeat far in the future: anything received now is catch-up.
    let (broadcaster, writer) = start(&socket_path, Duration::from_secs(3600)).await;
    writer.update(|h| h.set_input_connected(true));

    let mut lines = subscribe(&socket_path).await;

    let first = next_event(&mut lines).await;
    assert_eq!(first["type"], "health");
    assert_eq!(first["data"]["inputConnected"], true);

    let second = next_event(&mut lines).await;
    assert_eq!(second["type"], "config");
    assert_eq!(second["data"]["streamId"], "camera");
    assert_eq!(second["data"]["hasStreamKey"], true);

    assert_ok!(broadcaster.stop().await);
}

#[tokio::test]
async fn test_change_is_pushed_immediately() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("change.sock");

    let (broadcaster, writer) = start(&socket_path, Duration::from_secs(3600)).await;
    let mut lines = subscribe(&socket_path).await;
    next_event(&mut lines).await;
    next_event(&mut lines).await;
    wait_for_clients(&broadcaster, 1).await;

    writer.update(|h| {
        h.set_input_connected(true);
        h.begin_session(Utc::now());
        h.record_progress(3200.0, Some(0), 1);
    });

    let pushed = next_event(&mut lines).await;
    assert_eq!(pushed["type"], "health");
    assert_eq!(pushed["data"]["outputConnected"], true);
    assert_eq!(pushed["data"]["bitrateKbps"], 3200.0);

    assert_ok!(broadcaster.stop().await);
}

#[tokio::test]
async fn test_heartbeat_pushes_without_change() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("heartbeat.sock");

    let (broadcaster, _writer) = start(&socket_path, Duration::from_millis(100)).await;
    let mut lines = subscribe(&socket_path).await;
    next_event(&mut lines).await;
    next_event(&mut lines).await;

    let beat = next_event(&mut lines).await;
    assert_eq!(beat["type"], "health");
    assert_eq!(beat["data"]["inputConnected"], false);

    assert_ok!(broadcaster.stop().await);
}

#[tokio::test]
async fn test_alert_forwarded_to_subscribers() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("alert.sock");

    let (broadcaster, _writer) = start(&socket_path, Duration::from_secs(3600)).await;
    let mut lines = subscribe(&socket_path).await;
    next_event(&mut lines).await;
    next_event(&mut lines).await;
    wait_for_clients(&broadcaster, 1).await;

    let alert = Alert {
        timestamp: Utc::now(),
        severity: Severity::Medium,
        issues: vec![Issue::OutputDisconnected],
    };
    broadcaster.deliver(&alert);

    let event = next_event(&mut lines).await;
    assert_eq!(event["type"], "alert");
    assert_eq!(event["severity"], "MEDIUM");
    assert_eq!(event["issues"][0], "Output disconnected but input active");

    assert_ok!(broadcaster.stop().await);
}

#[tokio::test]
async fn test_multiple_subscribers() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("multi.sock");

    let (broadcaster, writer) = start(&socket_path, Duration::from_secs(3600)).await;
    let mut first = subscribe(&socket_path).await;
    let mut second = subscribe(&socket_path).await;
    wait_for_clients(&broadcaster, 2).await;

    writer.update(|h| h.set_input_connected(true));

    for lines in [&mut first, &mut second] {
        next_event(lines).await;
        next_event(lines).await;
        let pushed = next_event(lines).await;
        assert_eq!(pushed["data"]["inputConnected"], true);
    }

    assert_ok!(broadcaster.stop().await);
}

#[tokio::test]
async fn test_disconnected_subscriber_removed() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("dead.sock");

    let (broadcaster, writer) = start(&socket_path, Duration::from_secs(3600)).await;
    let lines = subscribe(&socket_path).await;
    wait_for_clients(&broadcaster, 1).await;
    drop(lines);

    // Writes to the closed socket fail after the peer's buffer is gone.
    for i in 0..100u64 {
        writer.update(|h| h.record_progress(1000.0 + i as f64, None, i));
        tokio::time::sleep(Duration::from_millis(20)).await;
        if broadcaster.client_count() == 0 {
            break;
        }
    }
    assert_eq!(broadcaster.client_count(), 0);

    assert_ok!(broadcaster.stop().await);
}
