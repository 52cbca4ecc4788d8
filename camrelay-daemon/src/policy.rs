//! Reconnect policy
//!
//! Stateless: the attempt counter lives with the supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay every attempt
    Fixed,
    /// Delay doubles per attempt up to the cap
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub backoff: Backoff,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Attempt ceiling; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::Exponential,
            base_delay_ms: 5000,
            max_delay_ms: 30000,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            backoff: Backoff::Fixed,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-indexed).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential => {
                let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                self.base_delay_ms
                    .saturating_mul(factor)
                    .min(self.max_delay_ms)
            }
        };
        Duration::from_millis(ms)
    }

    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        class == ErrorClass::Connectivity && (self.max_attempts == 0 || attempt < self.max_attempts)
    }
}
