//! Collector configuration.

use crate::error::{Result, VsphereError};
use crate::filter::{FilterErrorPolicy, InventoryFilter};
use crate::types::VmHostDimension;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of one monitored vCenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// vCenter address; also the display name when the gateway reports none
    pub host: String,
    pub interval_seconds: u64,
    /// How often the inventory and counter catalog are rebuilt
    pub inventory_refresh_interval_seconds: u64,
    /// Objects per performance query; 0 queries everything at once
    pub perf_batch_size: usize,
    /// Filter expression over `Datacenter` and `Cluster`
    pub filter: String,
    pub vm_host_dimension: VmHostDimension,
    pub filter_error_policy: FilterErrorPolicy,
    pub log_level: String,
    pub metrics_port: Option<u16>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            interval_seconds: 10,
            inventory_refresh_interval_seconds: 60,
            perf_batch_size: 10,
            filter: String::new(),
            vm_host_dimension: VmHostDimension::Ip,
            filter_error_policy: FilterErrorPolicy::Keep,
            log_level: "info".to_string(),
            metrics_port: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| VsphereError::IoError { path: path.to_path_buf(), source: e })?;
        serde_json::from_str(&content).map_err(|e| VsphereError::InvalidConfig {
            reason: format!("Failed to parse config: {}", e),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(VsphereError::InvalidConfig {
                reason: "interval_seconds must be greater than zero".to_string(),
            });
        }
        self.build_filter().map(|_| ())
    }

    /// Compile the configured filter expression.
    pub fn build_filter(&self) -> Result<InventoryFilter> {
        Ok(InventoryFilter::new(&self.filter)?.with_error_policy(self.filter_error_policy))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn inventory_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.inventory_refresh_interval_seconds)
    }
}
