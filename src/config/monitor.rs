//! Run monitoring and stop-detection configuration

use serde::{Deserialize, Serialize};

/// Run monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// A non-terminal run without progress for longer than this is stuck
    pub idle_threshold_secs: u64,
    /// Automatic recoveries per campaign before an operator must step in
    pub max_recovery_attempts: u32,
    /// Completed runs below both floors count as soft failures
    pub min_pages_floor: u32,
    pub min_records_floor: u64,
    /// Campaign ticks allowed to run at the same time
    pub max_concurrent_ticks: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            idle_threshold_secs: 300,
            max_recovery_attempts: 3,
            min_pages_floor: 5,
            min_records_floor: 20,
            max_concurrent_ticks: 8,
        }
    }
}
