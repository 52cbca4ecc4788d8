//! camrelay health tracking
//!
//! The relay's live health state, the single-writer feed that distributes
//! it, alert evaluation against thresholds, the post-run report, and a
//! process memory monitor.
//!
//! ## Ownership
//!
//! - [`HealthWriter`] is not `Clone`: exactly one owner (the relay
//!   supervisor) mutates [`HealthState`].
//! - [`HealthFeed`] is cheap to clone and read-only; the telemetry
//!   broadcaster and the alert evaluator each hold one.

pub mod alerts;
pub mod feed;
pub mod memory;
pub mod models;
pub mod report;

// Re-export main types
pub use alerts::{evaluate, Alert, AlertEvaluator, AlertSink, AlertThresholds, Issue, LogSink, Severity};
pub use feed::{health_channel, FeedClosed, HealthFeed, HealthWriter};
pub use memory::{MemoryMonitor, MemoryPressure, MemoryThresholds, RamStats};
pub use models::HealthState;
pub use report::{ReportError, RunReport, Stability};
