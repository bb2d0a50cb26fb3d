//! Maintenance (orphan reaping, deletion finishing) configuration.

use serde::{Deserialize, Serialize};

/// Settings for the background maintenance pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Unreferenced blobs younger than this are left alone, since their
    /// metadata commit may still be in flight.
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_seconds: u64,
    /// Temporary write files older than this are treated as abandoned.
    #[serde(default = "default_temp_max_age")]
    pub temp_max_age_seconds: u64,
    /// Interval between passes when running in a loop.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            orphan_grace_seconds: default_orphan_grace(),
            temp_max_age_seconds: default_temp_max_age(),
            interval_seconds: default_interval(),
        }
    }
}

fn default_orphan_grace() -> u64 {
    3600
}

fn default_temp_max_age() -> u64 {
    86_400
}

fn default_interval() -> u64 {
    900
}
