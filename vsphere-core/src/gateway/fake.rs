//! In-process gateway that serves a small synthetic inventory.
//!
//! The tree is one datacenter (`foo dc`) whose host folder holds one cluster
//! (`foo cluster`, one host) and one standalone compute resource (one host).
//! Every host runs one VM. References are minted as they are fetched
//! (`cluster-0`, `host-0`, `freehost-1`, `vm-0`, ...).
//!
//! With [`FakeGateway::with_nested_folders`] the datacenter sits one folder
//! below the root and the cluster one folder below the host folder; the
//! minted references stay the same.

use super::Gateway;
use crate::error::{Result, VsphereError};
use crate::types::{
    ClusterComputeResource, ComputeResource, Datacenter, EntityKind, Folder, GuestInfo, HostSystem,
    InventoryObject, ManagedEntity, Mor, PerfCounterInfo, PerfEntityMetric, PerfMetricId,
    PerfMetricSeries, PerfQuerySpec, PerfSampleInfo, PerformanceManager, PowerState, StatsType,
    VirtualMachine, REALTIME_METRICS_INTERVAL,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Counter key of the single counter in the fake catalog.
pub const FAKE_METRIC_KEY: i32 = 42;

/// Raw value of every fake sample.
pub const FAKE_SAMPLE_VALUE: i64 = 111;

pub const FAKE_VCENTER_NAME: &str = "my-vc";

const TOP_FOLDER: &str = "top";
const HOST_FOLDER: &str = "group-h1";
const DATACENTER_FOLDER: &str = "group-d2";
const NESTED_HOST_FOLDER: &str = "group-h2";

#[derive(Default)]
struct TypeCounter {
    cluster: AtomicUsize,
    compute: AtomicUsize,
    host: AtomicUsize,
    vm: AtomicUsize,
}

/// Scriptable fake of the management server.
pub struct FakeGateway {
    num_metrics_per_inv_obj: usize,
    type_counts: TypeCounter,
    metric_id_counter: AtomicI32,
    failing_refs: HashSet<String>,
    failing_metric_refs: HashSet<String>,
    fail_catalog_after: Option<usize>,
    catalog_calls: AtomicUsize,
    fail_perf_call: Option<usize>,
    stall_perf_calls: bool,
    nested_folders: bool,
    powered_off_vms: bool,
    powered_off_hosts: HashSet<String>,
    vcenter_name: String,
    perf_calls: Mutex<Vec<usize>>,
    current_time: Mutex<DateTime<Utc>>,
}

impl FakeGateway {
    /// Fake that returns `num_metrics_per_inv_obj` entity records per queried object.
    pub fn new(num_metrics_per_inv_obj: usize) -> Self {
        Self {
            num_metrics_per_inv_obj,
            type_counts: TypeCounter::default(),
            metric_id_counter: AtomicI32::new(0),
            failing_refs: HashSet::new(),
            failing_metric_refs: HashSet::new(),
            fail_catalog_after: None,
            catalog_calls: AtomicUsize::new(0),
            fail_perf_call: None,
            stall_perf_calls: false,
            nested_folders: false,
            powered_off_vms: false,
            powered_off_hosts: HashSet::new(),
            vcenter_name: FAKE_VCENTER_NAME.to_string(),
            perf_calls: Mutex::new(Vec::new()),
            current_time: Mutex::new(DateTime::<Utc>::UNIX_EPOCH + Duration::days(19_700)),
        }
    }

    /// Property lookups of this MOR value fail.
    pub fn with_failing_ref(mut self, value: impl Into<String>) -> Self {
        self.failing_refs.insert(value.into());
        self
    }

    /// Available-metric queries of this MOR value fail.
    pub fn with_failing_available_metrics(mut self, value: impl Into<String>) -> Self {
        self.failing_metric_refs.insert(value.into());
        self
    }

    /// The counter catalog cannot be retrieved.
    pub fn with_failing_catalog(self) -> Self {
        self.with_failing_catalog_after(0)
    }

    /// The first `calls` catalog retrievals succeed, every later one fails.
    pub fn with_failing_catalog_after(mut self, calls: usize) -> Self {
        self.fail_catalog_after = Some(calls);
        self
    }

    /// The `call`-th (zero based) `query_perf` invocation fails.
    pub fn with_failing_perf_call(mut self, call: usize) -> Self {
        self.fail_perf_call = Some(call);
        self
    }

    /// `query_perf` records the call and then never returns.
    pub fn with_stalled_perf_calls(mut self) -> Self {
        self.stall_perf_calls = true;
        self
    }

    /// Put the datacenter and the cluster one folder deeper.
    pub fn with_nested_folders(mut self) -> Self {
        self.nested_folders = true;
        self
    }

    /// The host with this MOR value reports itself as powered off.
    pub fn with_powered_off_host(mut self, value: impl Into<String>) -> Self {
        self.powered_off_hosts.insert(value.into());
        self
    }

    /// Every VM reports itself as powered off.
    pub fn with_powered_off_vms(mut self) -> Self {
        self.powered_off_vms = true;
        self
    }

    pub fn with_vcenter_name(mut self, name: impl Into<String>) -> Self {
        self.vcenter_name = name.into();
        self
    }

    /// Object counts of every `query_perf` call so far, in call order.
    pub fn perf_calls(&self) -> Vec<usize> {
        lock(&self.perf_calls).clone()
    }

    pub fn set_current_time(&self, now: DateTime<Utc>) {
        *lock(&self.current_time) = now;
    }

    fn create_ref(kind: EntityKind, prefix: &str, counter: &AtomicUsize) -> Mor {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Mor::new(kind.type_name(), format!("{prefix}-{n}"))
    }

    fn folder(&self, mor: &Mor) -> Folder {
        let folder_ref = |value: &str| Mor::new(EntityKind::Folder.type_name(), value);
        let datacenter = || Mor::new(EntityKind::Datacenter.type_name(), "dc-1");
        let cluster = || {
            Self::create_ref(
                EntityKind::ClusterComputeResource,
                "cluster",
                &self.type_counts.cluster,
            )
        };
        let free_standing = || {
            Self::create_ref(EntityKind::ComputeResource, "compute", &self.type_counts.compute)
        };

        let (name, child_entity) = match mor.value.as_str() {
            TOP_FOLDER if self.nested_folders => {
                ("Datacenters", vec![folder_ref(DATACENTER_FOLDER)])
            }
            TOP_FOLDER => ("Datacenters", vec![datacenter()]),
            DATACENTER_FOLDER => ("region", vec![datacenter()]),
            NESTED_HOST_FOLDER => ("rack", vec![cluster()]),
            _ if self.nested_folders => {
                ("host", vec![folder_ref(NESTED_HOST_FOLDER), free_standing()])
            }
            _ => ("host", vec![cluster(), free_standing()]),
        };
        Folder { name: name.to_string(), child_entity }
    }

    fn synthetic_series(&self, spec: &PerfQuerySpec) -> PerfEntityMetric {
        let samples = spec.max_sample.max(1) as usize;
        let end = *lock(&self.current_time);
        let step = Duration::seconds(i64::from(REALTIME_METRICS_INTERVAL));
        let sample_info = (0..samples)
            .map(|i| PerfSampleInfo {
                timestamp: end - step * (samples - 1 - i) as i32,
                interval: REALTIME_METRICS_INTERVAL,
            })
            .collect();
        // Echo the instance of the first queried metric, as a server would.
        let instance = spec.metric_id.first().map(|id| id.instance.clone()).unwrap_or_default();
        PerfEntityMetric {
            entity: spec.entity.clone(),
            sample_info,
            value: vec![PerfMetricSeries {
                id: PerfMetricId { counter_id: FAKE_METRIC_KEY, instance },
                value: vec![FAKE_SAMPLE_VALUE; samples],
            }],
        }
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new(1)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Gateway for FakeGateway {
    fn top_level_folder_ref(&self) -> Mor {
        Mor::new(EntityKind::Folder.type_name(), TOP_FOLDER)
    }

    async fn retrieve_performance_manager(&self) -> Result<PerformanceManager> {
        let call = self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_catalog_after.is_some_and(|after| call >= after) {
            return Err(VsphereError::gateway(
                "retrievePerformanceManager",
                anyhow!("performance manager unavailable"),
            ));
        }
        Ok(PerformanceManager {
            perf_counter: vec![PerfCounterInfo {
                key: FAKE_METRIC_KEY,
                group_key: "cpu".to_string(),
                name_key: "coreUtilization".to_string(),
                unit_key: "percent".to_string(),
                stats_type: StatsType::Delta,
            }],
        })
    }

    async fn retrieve_ref_properties(&self, mor: &Mor, kind: EntityKind) -> Result<ManagedEntity> {
        if self.failing_refs.contains(&mor.value) {
            return Err(VsphereError::gateway(
                "retrieveRefProperties",
                anyhow!("no such object: {mor}"),
            ));
        }
        let entity = match kind {
            EntityKind::Folder => ManagedEntity::Folder(self.folder(mor)),
            EntityKind::Datacenter => ManagedEntity::Datacenter(Datacenter {
                name: "foo dc".to_string(),
                host_folder: Mor::new(EntityKind::Folder.type_name(), HOST_FOLDER),
            }),
            EntityKind::ClusterComputeResource => {
                ManagedEntity::ClusterComputeResource(ClusterComputeResource {
                    name: "foo cluster".to_string(),
                    host: vec![Self::create_ref(
                        EntityKind::HostSystem,
                        "host",
                        &self.type_counts.host,
                    )],
                })
            }
            EntityKind::ComputeResource => ManagedEntity::ComputeResource(ComputeResource {
                name: "4.4.4.4".to_string(),
                host: vec![Self::create_ref(
                    EntityKind::HostSystem,
                    "freehost",
                    &self.type_counts.host,
                )],
            }),
            EntityKind::HostSystem => ManagedEntity::HostSystem(HostSystem {
                name: "4.4.4.4".to_string(),
                os_type: "foo os type".to_string(),
                power_state: if self.powered_off_hosts.contains(&mor.value) {
                    PowerState::PoweredOff
                } else {
                    PowerState::PoweredOn
                },
                vm: vec![Self::create_ref(EntityKind::VirtualMachine, "vm", &self.type_counts.vm)],
            }),
            EntityKind::VirtualMachine => ManagedEntity::VirtualMachine(VirtualMachine {
                name: "foo vm".to_string(),
                guest_id: "foo guest id".to_string(),
                power_state: if self.powered_off_vms {
                    PowerState::PoweredOff
                } else {
                    PowerState::PoweredOn
                },
                guest: GuestInfo {
                    ip_address: "1.2.3.4".to_string(),
                    host_name: "foo.host.name".to_string(),
                    guest_family: "fooFam".to_string(),
                    guest_full_name: "fooFullName".to_string(),
                },
            }),
        };
        Ok(entity)
    }

    async fn query_available_perf_metric(&self, mor: &Mor) -> Result<Vec<PerfMetricId>> {
        if self.failing_metric_refs.contains(&mor.value) {
            return Err(VsphereError::gateway(
                "queryAvailablePerfMetric",
                anyhow!("no metrics for {mor}"),
            ));
        }
        let counter_id = self.metric_id_counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![PerfMetricId { counter_id, instance: format!("instance-{counter_id}") }])
    }

    async fn query_perf(
        &self,
        objects: &[InventoryObject],
        max_sample: i32,
    ) -> Result<Vec<PerfEntityMetric>> {
        let call = {
            let mut calls = lock(&self.perf_calls);
            calls.push(objects.len());
            calls.len() - 1
        };
        if self.fail_perf_call == Some(call) {
            return Err(VsphereError::gateway("queryPerf", anyhow!("query {call} rejected")));
        }
        if self.stall_perf_calls {
            std::future::pending::<()>().await;
        }

        let specs = PerfQuerySpec::for_objects(objects, max_sample);
        let mut out = Vec::with_capacity(specs.len() * self.num_metrics_per_inv_obj);
        for spec in &specs {
            for _ in 0..self.num_metrics_per_inv_obj {
                out.push(self.synthetic_series(spec));
            }
        }
        Ok(out)
    }

    async fn retrieve_current_time(&self) -> Result<DateTime<Utc>> {
        Ok(*lock(&self.current_time))
    }

    fn vcenter_name(&self) -> &str {
        &self.vcenter_name
    }
}
