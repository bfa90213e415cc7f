//! Remote API abstraction.
//!
//! Every service talks to the management server through the `Gateway` trait.
//! Session handling, TLS and the wire protocol live in the implementation;
//! timeouts and cancellation surface as ordinary `Err` results.

use crate::error::Result;
use crate::types::{
    EntityKind, InventoryObject, ManagedEntity, Mor, PerfEntityMetric, PerfMetricId,
    PerformanceManager,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod fake;

pub use fake::FakeGateway;

/// Gateway to a vCenter-like management server.
///
/// Implementations must be safe for sequential reuse across collection cycles.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Reference of the root inventory folder.
    fn top_level_folder_ref(&self) -> Mor;

    /// Fetch the performance counter catalog.
    async fn retrieve_performance_manager(&self) -> Result<PerformanceManager>;

    /// Fetch the properties of `mor` in the shape named by `kind`.
    async fn retrieve_ref_properties(&self, mor: &Mor, kind: EntityKind) -> Result<ManagedEntity>;

    /// List the series available on one object.
    async fn query_available_perf_metric(&self, mor: &Mor) -> Result<Vec<PerfMetricId>>;

    /// Query up to `max_sample` recent samples for every object in `objects`.
    ///
    /// Objects without metric IDs must be left out of the request
    /// (see `PerfQuerySpec::for_objects`).
    async fn query_perf(
        &self,
        objects: &[InventoryObject],
        max_sample: i32,
    ) -> Result<Vec<PerfEntityMetric>>;

    /// Current time on the server clock.
    async fn retrieve_current_time(&self) -> Result<DateTime<Utc>>;

    /// Name of the server, used for the `vcenter` dimension.
    fn vcenter_name(&self) -> &str;
}
