//! Process and system RAM monitoring
//!
//! The relay watches its own resident memory and flags it once it climbs past a
//! fixed budget. System-wide RAM pressure is reported alongside for context.

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

const BYTES_PER_MB: u64 = 1_048_576;

/// Memory pressure levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryPressure {
    Normal,
    Warning,
    Critical,
}

/// Memory thresholds configuration
#[derive(Debug, Clone)]
pub struct MemoryThresholds {
    /// Resident size of this process above which a warning is raised.
    pub process_warning_mb: u64,
    pub ram_warning_percent: f32,
    pub ram_critical_percent: f32,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            process_warning_mb: 400,
            ram_warning_percent: 80.0,
            ram_critical_percent: 90.0,
        }
    }
}

impl MemoryThresholds {
    /// Classify a system RAM usage percentage.
    pub fn pressure_for(&self, percent_used: f32) -> MemoryPressure {
        if percent_used >= self.ram_critical_percent {
            MemoryPressure::Critical
        } else if percent_used >= self.ram_warning_percent {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        }
    }
}

/// System RAM statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamStats {
    pub total_mb: u64,
    pub used_mb: u64,
    pub available_mb: u64,
    pub process_mb: u64,
    pub percent_used: f32,
    pub pressure: MemoryPressure,
}

/// RAM monitor for the current process
pub struct MemoryMonitor {
    system: System,
    thresholds: MemoryThresholds,
    current_pid: Pid,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::with_thresholds(MemoryThresholds::default())
    }

    /// Create with custom thresholds
    pub fn with_thresholds(thresholds: MemoryThresholds) -> Self {
        Self {
            system: System::new(),
            thresholds,
            current_pid: Pid::from_u32(std::process::id()),
        }
    }

    pub fn thresholds(&self) -> &MemoryThresholds {
        &self.thresholds
    }

    /// Get RAM statistics
    pub fn get_stats(&mut self) -> RamStats {
        self.system.refresh_memory();
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.current_pid]), false);

        let total_mb = self.system.total_memory() / BYTES_PER_MB;
        let used_mb = self.system.used_memory() / BYTES_PER_MB;
        let available_mb = self.system.available_memory() / BYTES_PER_MB;

        let process_mb = self
            .system
            .process(self.current_pid)
            .map(|p| p.memory() / BYTES_PER_MB)
            .unwrap_or(0);

        let percent_used = if total_mb > 0 {
            (used_mb as f32 / total_mb as f32) * 100.0
        } else {
            0.0
        };

        RamStats {
            total_mb,
            used_mb,
            available_mb,
            process_mb,
            percent_used,
            pressure: self.thresholds.pressure_for(percent_used),
        }
    }

    /// Resident size in MB if it exceeds the process warning threshold.
    pub fn check_process(&mut self) -> Option<u64> {
        let stats = self.get_stats();
        tracing::debug!(
            "Memory usage: {}MB (system {:.0}% used, {:?})",
            stats.process_mb,
            stats.percent_used,
            stats.pressure
        );
        (stats.process_mb > self.thresholds.process_warning_mb).then_some(stats.process_mb)
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_stats() {
        let mut monitor = MemoryMonitor::new();
        let stats = monitor.get_stats();

        assert!(stats.total_mb > 0);
        assert!(stats.percent_used >= 0.0);
        assert!(stats.percent_used <= 100.0);
    }

    #[test]
    fn test_pressure_levels() {
        let thresholds = MemoryThresholds::default();
        assert_eq!(thresholds.pressure_for(50.0), MemoryPressure::Normal);
        assert_eq!(thresholds.pressure_for(80.0), MemoryPressure::Warning);
        assert_eq!(thresholds.pressure_for(95.5), MemoryPressure::Critical);
    }

    #[test]
    fn test_process_check_against_threshold() {
        let mut generous = MemoryMonitor::with_thresholds(MemoryThresholds {
            process_warning_mb: u64::MAX,
            ..Default::default()
        });
        assert_eq!(generous.check_process(), None);

        let mut strict = MemoryMonitor::with_thresholds(MemoryThresholds {
            process_warning_mb: 0,
            ..Default::default()
        });
        // A running test binary always holds at least a megabyte.
        assert!(strict.check_process().is_some());
    }
}
