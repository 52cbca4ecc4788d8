//! Single-writer, multi-reader distribution of [`HealthState`]

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;

use crate::models::HealthState;

/// The writer side was dropped; no further updates will arrive.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("health feed closed")]
pub struct FeedClosed;

/// Create the writer and a first reader for a relay starting at `server_start_time`.
pub fn health_channel(server_start_time: DateTime<Utc>) -> (HealthWriter, HealthFeed) {
    let (tx, rx) = watch::channel(HealthState::new(server_start_time));
    (HealthWriter { tx }, HealthFeed { rx })
}

/// Sole mutation path for the health state.
#[derive(Debug)]
pub struct HealthWriter {
    tx: watch::Sender<HealthState>,
}

impl HealthWriter {
    /// Apply `f` and notify readers if anything changed.
    ///
    /// Returns whether the state changed.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut HealthState),
    {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        })
    }

    pub fn snapshot(&self) -> HealthState {
        self.tx.borrow().clone()
    }

    /// A new reader positioned at the current value.
    pub fn feed(&self) -> HealthFeed {
        HealthFeed {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only handle onto the health state.
#[derive(Debug, Clone)]
pub struct HealthFeed {
    rx: watch::Receiver<HealthState>,
}

impl HealthFeed {
    pub fn snapshot(&self) -> HealthState {
        self.rx.borrow().clone()
    }

    /// Wait for the next change and return the new state.
    ///
    /// Rapid successive writes may be observed as a single change carrying
    /// the latest value.
    pub async fn changed(&mut self) -> Result<HealthState, FeedClosed> {
        self.rx.changed().await.map_err(|_| FeedClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_update_reports_change() {
        let (writer, feed) = health_channel(Utc::now());

        assert!(writer.update(|h| h.set_input_connected(true)));
        assert!(!writer.update(|h| h.set_input_connected(true)), "no-op writes are not changes");
        assert!(feed.snapshot().input_connected);
    }

    #[tokio::test]
    async fn test_readers_observe_changes() {
        let (writer, mut feed) = health_channel(Utc::now());
        let mut second = writer.feed();

        writer.update(|h| h.begin_session(Utc::now()));

        let seen = tokio::time::timeout(Duration::from_secs(1), feed.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(seen.output_connected);

        let seen = tokio::time::timeout(Duration::from_secs(1), second.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(seen.output_connected);
    }

    #[tokio::test]
    async fn test_feed_closes_with_writer() {
        let (writer, mut feed) = health_channel(Utc::now());
        drop(writer);
        assert_eq!(feed.changed().await, Err(FeedClosed));
    }
}
