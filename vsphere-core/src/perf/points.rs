//! Conversion of performance query results into output points.

use super::pager::PerfFetcher;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::observability::metrics;
use crate::types::inventory::{DIM_INSTANCE, DIM_VCENTER};
use crate::types::{Dimensions, MetricKind, PerfEntityMetric, VsphereInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// A single time-stamped sample ready for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPoint {
    pub metric: String,
    pub dimensions: Dimensions,
    pub value: f64,
    pub kind: MetricKind,
    pub timestamp: DateTime<Utc>,
}

/// Destination of emitted points.
///
/// Points are handed over one at a time as each page is converted, so the
/// caller decides what is buffered.
pub trait PointSink {
    fn emit(&mut self, point: OutputPoint);
}

impl<F> PointSink for F
where
    F: FnMut(OutputPoint),
{
    fn emit(&mut self, point: OutputPoint) {
        self(point)
    }
}

/// Summary of one `fetch_points` run.
#[derive(Debug, Default)]
struct FetchStats {
    emitted: u64,
    latest: Option<DateTime<Utc>>,
}

impl FetchStats {
    fn observe(&mut self, timestamp: DateTime<Utc>) {
        self.emitted += 1;
        if self.latest.map_or(true, |latest| timestamp > latest) {
            self.latest = Some(timestamp);
        }
    }
}

pub struct PointsService {
    gateway: Arc<dyn Gateway>,
    fetcher: PerfFetcher,
    fallback_vcenter: String,
}

impl PointsService {
    /// A `page_size` of zero queries the whole inventory at once.
    pub fn new(gateway: Arc<dyn Gateway>, page_size: usize) -> Self {
        Self { gateway, fetcher: PerfFetcher::new(page_size), fallback_vcenter: String::new() }
    }

    /// `vcenter` dimension used when the gateway reports an empty name.
    pub fn with_fallback_vcenter(mut self, name: impl Into<String>) -> Self {
        self.fallback_vcenter = name.into();
        self
    }

    /// Query every inventory object and stream the samples into `sink`.
    ///
    /// Returns the timestamp of the newest emitted sample, or `None` when
    /// nothing was emitted. A failed page aborts the run; points from earlier
    /// pages have already been delivered.
    #[instrument(skip_all, fields(objects = info.inventory.len(), max_samples = max_samples))]
    pub async fn fetch_points<S>(
        &self,
        info: &VsphereInfo,
        max_samples: i32,
        sink: &mut S,
    ) -> Result<Option<DateTime<Utc>>>
    where
        S: PointSink + ?Sized,
    {
        let started = Instant::now();
        let vcenter = match self.gateway.vcenter_name() {
            "" => self.fallback_vcenter.as_str(),
            name => name,
        };
        let per_series = usize::try_from(max_samples).unwrap_or(0).max(1);
        let mut stats = FetchStats::default();

        let mut pages =
            self.fetcher.inv_iterator(self.gateway.as_ref(), &info.inventory.objects, max_samples);
        let mut more = pages.has_next();
        while more {
            let (next, page) = pages.next_inv_page().await?;
            more = next;
            let before = stats.emitted;
            for entity_metric in page {
                convert(info, vcenter, entity_metric, per_series, sink, &mut stats);
            }
            metrics::record_points_emitted(stats.emitted - before);
        }

        metrics::record_phase_duration("points", started.elapsed().as_secs_f64());
        info!(points = stats.emitted, pages = pages.num_pages(), "Points fetched");
        Ok(stats.latest)
    }
}

fn convert<S>(
    info: &VsphereInfo,
    vcenter: &str,
    entity_metric: PerfEntityMetric,
    per_series: usize,
    sink: &mut S,
    stats: &mut FetchStats,
) where
    S: PointSink + ?Sized,
{
    let entity = &entity_metric.entity.value;
    for series in &entity_metric.value {
        let Some(metric_info) = info.metric_infos_by_key.get(&series.id.counter_id) else {
            debug!(counter = series.id.counter_id, "Skipping series of unknown counter");
            metrics::record_skipped("unknown_counter");
            continue;
        };
        let Some(dims) = info.inventory.dimensions(entity) else {
            debug!(entity = %entity, "Skipping series of unknown entity");
            metrics::record_skipped("unknown_entity");
            continue;
        };

        let samples = entity_metric.sample_info.iter().zip(&series.value).take(per_series);
        for (sample, raw) in samples {
            let mut dimensions = dims.clone();
            dimensions.insert(DIM_VCENTER.to_string(), vcenter.to_string());
            if !series.id.instance.is_empty() {
                dimensions.insert(DIM_INSTANCE.to_string(), series.id.instance.clone());
            }
            sink.emit(OutputPoint {
                metric: metric_info.metric_name.clone(),
                dimensions,
                value: metric_info.scale(*raw),
                kind: metric_info.kind(),
                timestamp: sample.timestamp,
            });
            stats.observe(sample.timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::index_perf_counters_by_key;
    use crate::gateway::fake::{FakeGateway, FAKE_METRIC_KEY, FAKE_VCENTER_NAME};
    use crate::types::{Inventory, InventoryObject, Mor, PerfCounterInfo, PerfMetricId, StatsType};
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn catalog() -> crate::types::MetricInfosByKey {
        index_perf_counters_by_key(&[PerfCounterInfo {
            key: FAKE_METRIC_KEY,
            group_key: "cpu".to_string(),
            name_key: "coreUtilization".to_string(),
            unit_key: "percent".to_string(),
            stats_type: StatsType::Delta,
        }])
    }

    fn info_with(n: usize, catalog: crate::types::MetricInfosByKey) -> VsphereInfo {
        let mut inventory = Inventory::new();
        for i in 0..n {
            let mut dims = BTreeMap::new();
            dims.insert("vm_name".to_string(), format!("vm {i}"));
            inventory.add_object(Mor::new("VirtualMachine", format!("vm-{i}")), dims);
        }
        for obj in &mut inventory.objects {
            obj.metric_ids =
                vec![PerfMetricId { counter_id: FAKE_METRIC_KEY, instance: String::new() }];
        }
        VsphereInfo { inventory, metric_infos_by_key: catalog }
    }

    #[tokio::test]
    async fn test_fetch_points_converts_samples() {
        let gateway = Arc::new(FakeGateway::new(1));
        let svc = PointsService::new(gateway.clone(), 10);
        let info = info_with(2, catalog());

        let mut points = Vec::new();
        let latest =
            svc.fetch_points(&info, 1, &mut |p: OutputPoint| points.push(p)).await.unwrap();

        assert_eq!(points.len(), 2);
        let pt = &points[0];
        assert_eq!(pt.metric, "vsphere.cpu_core_utilization_percent");
        assert_eq!(pt.value, 1.11);
        assert_eq!(pt.kind, MetricKind::Counter);
        assert_eq!(pt.dimensions["vcenter"], FAKE_VCENTER_NAME);
        assert_eq!(pt.dimensions["ref_id"], "vm-0");
        assert_eq!(pt.dimensions["object_type"], "VirtualMachine");
        assert!(!pt.dimensions.contains_key("instance"));
        assert_eq!(latest, Some(pt.timestamp));
    }

    #[tokio::test]
    async fn test_series_instance_becomes_dimension() {
        let svc = PointsService::new(Arc::new(FakeGateway::new(1)), 10);
        let mut info = info_with(2, catalog());
        info.inventory.objects[0].metric_ids =
            vec![PerfMetricId { counter_id: FAKE_METRIC_KEY, instance: "instance-0".to_string() }];

        let mut points = Vec::new();
        svc.fetch_points(&info, 1, &mut |p: OutputPoint| points.push(p)).await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].dimensions["ref_id"], "vm-0");
        assert_eq!(points[0].dimensions["instance"], "instance-0");
        assert!(!points[1].dimensions.contains_key("instance"));
    }

    #[tokio::test]
    async fn test_vcenter_falls_back_to_configured_host() {
        let gateway = Arc::new(FakeGateway::new(1).with_vcenter_name(""));
        let svc = PointsService::new(gateway, 10).with_fallback_vcenter("vc.example");
        let info = info_with(1, catalog());

        let mut points = Vec::new();
        svc.fetch_points(&info, 1, &mut |p: OutputPoint| points.push(p)).await.unwrap();

        assert_eq!(points[0].dimensions["vcenter"], "vc.example");
    }

    #[tokio::test]
    async fn test_max_samples_bounds_each_series() {
        let gateway = Arc::new(FakeGateway::new(1));
        let now = gateway.retrieve_current_time().await.unwrap();
        let svc = PointsService::new(gateway, 0);
        let info = info_with(3, catalog());

        let mut points = Vec::new();
        let latest =
            svc.fetch_points(&info, 4, &mut |p: OutputPoint| points.push(p)).await.unwrap();

        assert_eq!(points.len(), 12);
        assert_eq!(latest, Some(now));
        let oldest = points.iter().map(|p| p.timestamp).min().unwrap();
        assert_eq!(now - oldest, Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_unknown_counter_is_skipped() {
        let svc = PointsService::new(Arc::new(FakeGateway::new(1)), 10);
        let info = info_with(3, Default::default());

        let mut emitted = 0usize;
        let mut sink = |_: OutputPoint| emitted += 1;
        let latest = svc.fetch_points(&info, 1, &mut sink).await.unwrap();

        assert_eq!(emitted, 0);
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_skipped() {
        let gateway = Arc::new(FakeGateway::new(1));
        let svc = PointsService::new(gateway, 10);
        let mut info = info_with(2, catalog());
        let mut stray = InventoryObject::new(Mor::new("VirtualMachine", "vm-stray"));
        stray.metric_ids = info.inventory.objects[0].metric_ids.clone();
        info.inventory.objects.push(stray);

        let mut points = Vec::new();
        svc.fetch_points(&info, 1, &mut |p: OutputPoint| points.push(p)).await.unwrap();

        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.dimensions["ref_id"] != "vm-stray"));
    }

    #[tokio::test]
    async fn test_paged_and_unpaged_emit_same_points() {
        let info = info_with(17, catalog());

        let mut single = Vec::new();
        PointsService::new(Arc::new(FakeGateway::new(2)), 0)
            .fetch_points(&info, 1, &mut |p: OutputPoint| single.push(p))
            .await
            .unwrap();

        let paged_gateway = Arc::new(FakeGateway::new(2));
        let mut paged = Vec::new();
        PointsService::new(paged_gateway.clone(), 4)
            .fetch_points(&info, 1, &mut |p: OutputPoint| paged.push(p))
            .await
            .unwrap();

        assert_eq!(paged_gateway.perf_calls(), vec![4, 4, 4, 4, 1]);
        assert_eq!(single.len(), 34);
        assert_eq!(paged, single);
    }

    #[tokio::test]
    async fn test_page_failure_aborts() {
        let gateway = Arc::new(FakeGateway::new(1).with_failing_perf_call(1));
        let svc = PointsService::new(gateway.clone(), 2);
        let info = info_with(5, catalog());

        let mut points = Vec::new();
        let err =
            svc.fetch_points(&info, 1, &mut |p: OutputPoint| points.push(p)).await.unwrap_err();

        assert_eq!(err.operation(), Some("queryPerf"));
        assert_eq!(points.len(), 2);
        assert_eq!(gateway.perf_calls(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_empty_inventory_makes_no_calls() {
        let gateway = Arc::new(FakeGateway::new(1));
        let svc = PointsService::new(gateway.clone(), 10);
        let info = VsphereInfo { inventory: Inventory::new(), metric_infos_by_key: catalog() };

        let mut points = Vec::new();
        let latest =
            svc.fetch_points(&info, 1, &mut |p: OutputPoint| points.push(p)).await.unwrap();
        assert_eq!(latest, None);
        assert!(points.is_empty());
        assert!(gateway.perf_calls().is_empty());
    }
}
