//! vSphere collector core.
//!
//! Discovers hosts and VMs of a vCenter-like server, resolves performance
//! counters and streams realtime samples as dimensioned points.

pub mod config;
pub mod counters;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod inventory;
pub mod monitor;
pub mod observability;
pub mod perf;
pub mod types;

// Re-export commonly used items
pub use config::MonitorConfig;
pub use error::{Result, VsphereError};
pub use filter::{FilterErrorPolicy, InventoryFilter};
pub use gateway::Gateway;
pub use inventory::InventoryService;
pub use monitor::{TimeService, VsphereInfoService, VsphereMonitor};
pub use observability::{init as init_observability, init_from as init_observability_from};
pub use perf::{OutputPoint, PointSink, PointsService};
pub use types::{Inventory, InventoryObject, Mor, VmHostDimension, VsphereInfo};
