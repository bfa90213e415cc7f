//! Collection driver.
//!
//! Loads the inventory once, refreshes it on a slower cadence and on every
//! tick requests the samples the server produced since the previous tick.

use crate::config::MonitorConfig;
use crate::counters::MetricsService;
use crate::error::{Result, VsphereError};
use crate::gateway::Gateway;
use crate::inventory::InventoryService;
use crate::observability::metrics;
use crate::perf::{PointSink, PointsService};
use crate::types::{VsphereInfo, REALTIME_METRICS_INTERVAL};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Builds a complete [`VsphereInfo`]: inventory, counter index and the
/// available series of every object.
pub struct VsphereInfoService {
    inventory: InventoryService,
    metrics: MetricsService,
}

impl VsphereInfoService {
    pub fn new(inventory: InventoryService, metrics: MetricsService) -> Self {
        Self { inventory, metrics }
    }

    pub async fn retrieve_vsphere_info(&self) -> Result<VsphereInfo> {
        let started = Instant::now();
        let mut inventory = self.inventory.retrieve_inventory().await?;
        let metric_infos_by_key = self.metrics.retrieve_perf_counter_index().await?;
        self.metrics.populate_inv_metrics(&mut inventory).await;
        metrics::record_phase_duration("inventory", started.elapsed().as_secs_f64());
        Ok(VsphereInfo { inventory, metric_infos_by_key })
    }
}

/// Reads the server clock.
pub struct TimeService {
    gateway: Arc<dyn Gateway>,
}

impl TimeService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn retrieve_current_time(&self) -> Result<DateTime<Utc>> {
        self.gateway.retrieve_current_time().await.inspect_err(|e| {
            metrics::record_gateway_error("currentTime");
            warn!(error = %e, "Failed to read server time");
        })
    }
}

/// Periodic collector for one vCenter.
pub struct VsphereMonitor {
    config: MonitorConfig,
    info_svc: VsphereInfoService,
    time_svc: TimeService,
    points_svc: PointsService,
    vsphere_info: Option<VsphereInfo>,
    last_load_time: Option<DateTime<Utc>>,
    last_point_time: Option<DateTime<Utc>>,
}

impl VsphereMonitor {
    /// Wire up the services. Fails when the configuration is invalid.
    pub fn new(gateway: Arc<dyn Gateway>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let inventory = InventoryService::new(
            gateway.clone(),
            config.build_filter()?,
            config.vm_host_dimension,
        );
        let info_svc = VsphereInfoService::new(inventory, MetricsService::new(gateway.clone()));
        let points_svc = PointsService::new(gateway.clone(), config.perf_batch_size)
            .with_fallback_vcenter(config.host.clone());
        Ok(Self {
            config,
            info_svc,
            time_svc: TimeService::new(gateway),
            points_svc,
            vsphere_info: None,
            last_load_time: None,
            last_point_time: None,
        })
    }

    pub fn vsphere_info(&self) -> Option<&VsphereInfo> {
        self.vsphere_info.as_ref()
    }

    /// Load the inventory unless it has already been loaded.
    pub async fn first_time_setup(&mut self) -> Result<()> {
        if self.vsphere_info.is_some() {
            return Ok(());
        }
        self.reload_vsphere_info().await
    }

    /// Rebuild the inventory and counter index.
    ///
    /// On failure the previous inventory stays in use and the reload is
    /// attempted again on the next tick.
    pub async fn reload_vsphere_info(&mut self) -> Result<()> {
        let info = self.info_svc.retrieve_vsphere_info().await?;
        let loaded_at = self.time_svc.retrieve_current_time().await?;
        info!(
            objects = info.inventory.len(),
            counters = info.metric_infos_by_key.len(),
            "Inventory loaded"
        );
        self.vsphere_info = Some(info);
        self.last_load_time = Some(loaded_at);
        Ok(())
    }

    /// Whether more than the refresh interval has passed since the last load.
    pub fn is_time_for_reload(&self, now: DateTime<Utc>) -> bool {
        let Some(loaded_at) = self.last_load_time else {
            return true;
        };
        // A server clock that went backwards never makes a reload due.
        let elapsed = (now - loaded_at).to_std().unwrap_or_default();
        let interval = self.config.inventory_refresh_interval();
        let due = elapsed > interval;
        debug!(
            elapsed_secs = elapsed.as_secs(),
            interval_secs = interval.as_secs(),
            due,
            "Reload check"
        );
        due
    }

    /// Realtime intervals the server has completed since the newest sample
    /// already collected. The first retrieval asks for one.
    pub fn num_samples_required(&self, now: DateTime<Utc>) -> i32 {
        let Some(last) = self.last_point_time else {
            return 1;
        };
        let elapsed = (now - last).num_seconds().max(0);
        let samples = elapsed / i64::from(REALTIME_METRICS_INTERVAL);
        debug!(%now, %last, elapsed, samples, "Samples required");
        i32::try_from(samples).unwrap_or(i32::MAX)
    }

    /// Fetch every sample available since the previous call into `sink`.
    pub async fn generate_points<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: PointSink + ?Sized,
    {
        let Some(info) = self.vsphere_info.as_ref() else {
            return Ok(());
        };
        let now = self.time_svc.retrieve_current_time().await?;
        let samples = self.num_samples_required(now);
        if samples == 0 {
            debug!("No new samples available");
            return Ok(());
        }
        if let Some(latest) = self.points_svc.fetch_points(info, samples, sink).await? {
            self.last_point_time = Some(latest);
        }
        Ok(())
    }

    /// Run one collection cycle.
    #[instrument(skip_all)]
    pub async fn collect<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: PointSink + ?Sized,
    {
        let started = Instant::now();
        if self.vsphere_info.is_none() {
            self.first_time_setup().await?;
        } else {
            let now = self.time_svc.retrieve_current_time().await?;
            if self.is_time_for_reload(now) {
                if let Err(e) = self.reload_vsphere_info().await {
                    error!(error = %e, "Failed to reload inventory, keeping the previous one");
                }
            }
        }
        let result = self.generate_points(sink).await;
        metrics::record_phase_duration("cycle", started.elapsed().as_secs_f64());
        result
    }

    /// Collect on every interval tick until `shutdown` fires.
    ///
    /// A failed cycle is logged and retried on the next tick. A shutdown that
    /// arrives mid-cycle drops the cycle at its current gateway call.
    pub async fn run<S>(&mut self, sink: &mut S, mut shutdown: broadcast::Receiver<()>)
    where
        S: PointSink + ?Sized,
    {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.config.interval_seconds, "Starting collection");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let outcome = tokio::select! {
                        res = self.collect(sink) => res,
                        _ = shutdown.recv() => Err(VsphereError::Cancelled),
                    };
                    match outcome {
                        Ok(()) => {}
                        Err(VsphereError::Cancelled) => break,
                        Err(e) => error!(error = %e, "Collection cycle failed"),
                    }
                }
            }
        }
        info!("Collection stopped");
    }
}
