//! camrelay relay daemon library
//!
//! Relays one SRT camera feed through ffmpeg to an RTMP(S) ingest endpoint,
//! reconnecting on transient failures. The binary wires these modules
//! together; integration tests drive them directly.

pub mod checks;
pub mod config;
pub mod connection;
pub mod error;
pub mod ipc;
pub mod policy;
pub mod quality;
pub mod relay;
pub mod supervisor;
pub mod transcoder;
pub mod version;

pub use config::RelayConfig;
pub use connection::{Action, ConnectionMachine, ConnectionState, IngestEvent};
pub use error::{ErrorClass, RelayError};
pub use policy::{Backoff, ReconnectPolicy};
pub use relay::{Relay, RelayCommand, RelayHandle, RelayStatus};
pub use supervisor::{RelaySettings, StartOutcome, Supervisor};
pub use transcoder::{FfmpegRunner, TaskEvent, TaskHandle, TaskSpec, TranscodeRunner};
