//! Telemetry broadcaster for camrelay
//!
//! A Unix socket server that pushes the relay's health state to any number
//! of subscribers (dashboards, status bars, monitoring agents).
//!
//! # Protocol
//!
//! Newline-delimited JSON, one event per line, tagged by `type`:
//!
//! - `health` - full health snapshot: on subscribe, on every change, and on
//!   each heartbeat
//! - `config` - relay endpoint description, sent once on subscribe
//! - `alert` - alert raised by the evaluator
//!
//! Delivery is best-effort. Each subscriber has a bounded queue; a slow
//! subscriber misses events rather than stalling the relay, and a
//! disconnected one is dropped on the next push.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use camrelay_broadcaster::{RelayInfo, TelemetryBroadcaster};
//! use camrelay_health::health_channel;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (writer, feed) = health_channel(chrono::Utc::now());
//!     let info = RelayInfo {
//!         srt_endpoint: "srt://0.0.0.0:9999".to_string(),
//!         stream_id: "camera".to_string(),
//!         has_stream_key: true,
//!     };
//!
//!     let broadcaster = TelemetryBroadcaster::new(
//!         "/tmp/camrelay_telemetry.sock",
//!         feed,
//!         info,
//!         Duration::from_secs(10),
//!     );
//!     broadcaster.start().await?;
//!
//!     // Every change is pushed immediately
//!     writer.update(|h| h.set_input_connected(true));
//!
//!     broadcaster.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod events;

// Re-exports
pub use broadcaster::TelemetryBroadcaster;
pub use error::{BroadcasterError, Result};
pub use events::{BroadcastEvent, RelayInfo};
