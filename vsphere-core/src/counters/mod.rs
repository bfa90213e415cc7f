//! Performance counter metadata.
//!
//! Indexes the server's counter catalog by key and attaches the available
//! series to every inventory object.

use crate::error::{Result, VsphereError};
use crate::gateway::Gateway;
use crate::observability::metrics;
use crate::types::{Inventory, MetricInfo, MetricInfosByKey, PerfCounterInfo};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub mod naming;

pub use naming::{camel_to_snake_case, metric_name, metric_unit};

pub struct MetricsService {
    gateway: Arc<dyn Gateway>,
}

impl MetricsService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Fetch the counter catalog and index it by counter key.
    ///
    /// Failure is fatal for the cycle: without the catalog nothing can be named.
    #[instrument(skip(self))]
    pub async fn retrieve_perf_counter_index(&self) -> Result<MetricInfosByKey> {
        let pm = self.gateway.retrieve_performance_manager().await.map_err(|e| {
            error!(error = %e, "retrievePerformanceManager failed");
            metrics::record_gateway_error("retrievePerformanceManager");
            e
        })?;
        if pm.perf_counter.is_empty() {
            return Err(VsphereError::CounterCatalog {
                reason: "server returned no performance counters".to_string(),
            });
        }
        let idx = index_perf_counters_by_key(&pm.perf_counter);
        info!(counters = idx.len(), "Performance counters indexed");
        Ok(idx)
    }

    /// Query the available series of every inventory object.
    ///
    /// An object whose query fails keeps no metric IDs and is left out of
    /// performance queries.
    #[instrument(skip_all, fields(objects = inv.len()))]
    pub async fn populate_inv_metrics(&self, inv: &mut Inventory) {
        let mut failed = 0usize;
        for obj in &mut inv.objects {
            match self.gateway.query_available_perf_metric(&obj.mor).await {
                Ok(ids) => obj.metric_ids = ids,
                Err(e) => {
                    warn!(mor = %obj.mor, error = %e, "queryAvailablePerfMetric failed");
                    metrics::record_gateway_error("queryAvailablePerfMetric");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            warn!(failed, "Some inventory objects have no available metrics");
        }
    }
}

/// Index counters by key, deriving each one's metric name and unit.
pub fn index_perf_counters_by_key(counters: &[PerfCounterInfo]) -> MetricInfosByKey {
    counters
        .iter()
        .map(|counter| {
            let info = MetricInfo {
                metric_name: metric_name(counter),
                counter_key: counter.key,
                stats_type: counter.stats_type,
                unit: metric_unit(&counter.group_key, &counter.name_key),
            };
            (counter.key, info)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::InventoryFilter;
    use crate::gateway::fake::{FakeGateway, FAKE_METRIC_KEY};
    use crate::inventory::InventoryService;
    use crate::types::{StatsType, Unit, VmHostDimension};

    #[tokio::test]
    async fn test_retrieve_perf_counter_index() {
        let svc = MetricsService::new(Arc::new(FakeGateway::new(1)));
        let idx = svc.retrieve_perf_counter_index().await.unwrap();

        let info = &idx[&FAKE_METRIC_KEY];
        assert_eq!(info.metric_name, "vsphere.cpu_core_utilization_percent");
        assert_eq!(info.counter_key, FAKE_METRIC_KEY);
        assert_eq!(info.stats_type, StatsType::Delta);
        assert_eq!(info.unit, Some(Unit::Percent));
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let svc = MetricsService::new(Arc::new(FakeGateway::new(1).with_failing_catalog()));
        let err = svc.retrieve_perf_counter_index().await.unwrap_err();
        assert_eq!(err.operation(), Some("retrievePerformanceManager"));
    }

    #[tokio::test]
    async fn test_populate_inv_metrics_skips_failures() {
        let gateway: Arc<dyn Gateway> =
            Arc::new(FakeGateway::new(1).with_failing_available_metrics("vm-0"));
        let inv_svc = InventoryService::new(
            gateway.clone(),
            InventoryFilter::keep_all(),
            VmHostDimension::Ip,
        );
        let mut inv = inv_svc.retrieve_inventory().await.unwrap();

        MetricsService::new(gateway).populate_inv_metrics(&mut inv).await;

        assert_eq!(inv.len(), 4);
        for obj in &inv.objects {
            if obj.mor.value == "vm-0" {
                assert!(obj.metric_ids.is_empty());
            } else {
                assert_eq!(obj.metric_ids.len(), 1);
            }
        }
    }

    #[test]
    fn test_index_keeps_every_counter() {
        let counters = vec![
            PerfCounterInfo {
                key: 1,
                group_key: "mem".to_string(),
                name_key: "swapped".to_string(),
                ..Default::default()
            },
            PerfCounterInfo {
                key: 2,
                group_key: "gpu".to_string(),
                name_key: "temperature".to_string(),
                stats_type: StatsType::Rate,
                ..Default::default()
            },
        ];
        let idx = index_perf_counters_by_key(&counters);
        assert_eq!(idx[&1].metric_name, "vsphere.mem_swapped_kb");
        assert_eq!(idx[&2].metric_name, "vsphere.gpu_temperature");
        assert_eq!(idx[&2].unit, None);
    }
}
