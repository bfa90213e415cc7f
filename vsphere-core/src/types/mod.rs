//! Core domain types for the collector.

pub mod entity;
pub mod inventory;
pub mod mor;
pub mod perf;

// Re-exports
pub use entity::{
    ClusterComputeResource, ComputeResource, Datacenter, Folder, GuestInfo, HostSystem,
    ManagedEntity, PowerState, VirtualMachine,
};
pub use inventory::{Dimensions, Inventory, InventoryObject, VmHostDimension, VsphereInfo};
pub use mor::{EntityKind, Mor};
pub use perf::{
    MetricInfo, MetricInfosByKey, MetricKind, PerfCounterInfo, PerfEntityMetric, PerfMetricId,
    PerfMetricSeries, PerfQuerySpec, PerfSampleInfo, PerformanceManager, StatsType, Unit,
    REALTIME_METRICS_INTERVAL,
};
