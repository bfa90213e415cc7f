//! Memory profile of point retrieval.
//!
//! Runs 100,000 objects with 10 series each (1,000,000 points) through
//! `fetch_points` and checks with a counting allocator that the working set
//! stays bounded by a page, not by the cycle.
//!
//! Lives in its own test binary because it installs a global allocator.
//!
//! ```bash
//! cargo test --release --test streaming_memory
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vsphere_core::counters::index_perf_counters_by_key;
use vsphere_core::gateway::fake::{FakeGateway, FAKE_METRIC_KEY};
use vsphere_core::types::{PerfCounterInfo, PerfMetricId, StatsType};
use vsphere_core::{Inventory, Mor, OutputPoint, PointsService, VsphereInfo};

const OBJECTS: usize = 100_000;
const METRICS_PER_OBJECT: usize = 10;
const PAGE_SIZE: usize = 100;

/// Peak growth allowed while streaming; one page of raw results is a few
/// hundred KiB, a fully buffered cycle is hundreds of MiB.
const MAX_PEAK_GROWTH: usize = 8 * 1024 * 1024;
/// Growth still allowed once retrieval has returned.
const MAX_RESIDUAL_GROWTH: usize = 256 * 1024;

/// Wraps an allocator and tracks live and peak bytes.
struct CountingAllocator<A: GlobalAlloc> {
    inner: A,
}

static LIVE: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

fn grow(size: usize) {
    let live = LIVE.fetch_add(size, Ordering::Relaxed) + size;
    PEAK.fetch_max(live, Ordering::Relaxed);
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        LIVE.fetch_sub(layout.size(), Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            if new_size > layout.size() {
                grow(new_size - layout.size());
            } else {
                LIVE.fetch_sub(layout.size() - new_size, Ordering::Relaxed);
            }
        }
        new_ptr
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator<System> = CountingAllocator { inner: System };

fn large_info() -> VsphereInfo {
    let mut inventory = Inventory::new();
    for i in 0..OBJECTS {
        let mut dims = BTreeMap::new();
        dims.insert("vm_name".to_string(), format!("vm {i}"));
        dims.insert("datacenter".to_string(), "dc".to_string());
        inventory.add_object(Mor::new("VirtualMachine", format!("vm-{i}")), dims);
    }
    for obj in &mut inventory.objects {
        obj.metric_ids =
            vec![PerfMetricId { counter_id: FAKE_METRIC_KEY, instance: String::new() }];
    }
    let metric_infos_by_key = index_perf_counters_by_key(&[PerfCounterInfo {
        key: FAKE_METRIC_KEY,
        group_key: "cpu".to_string(),
        name_key: "coreUtilization".to_string(),
        unit_key: "percent".to_string(),
        stats_type: StatsType::Delta,
    }]);
    VsphereInfo { inventory, metric_infos_by_key }
}

#[tokio::test(flavor = "current_thread")]
async fn test_streaming_keeps_working_set_bounded() {
    let gateway = Arc::new(FakeGateway::new(METRICS_PER_OBJECT));
    let svc = PointsService::new(gateway.clone(), PAGE_SIZE);
    let info = large_info();

    let mut emitted = 0usize;
    let mut value_sum = 0.0f64;
    let mut sink = |p: OutputPoint| {
        emitted += 1;
        value_sum += p.value;
    };

    let baseline = LIVE.load(Ordering::Relaxed);
    PEAK.store(baseline, Ordering::Relaxed);

    let latest = svc.fetch_points(&info, 1, &mut sink).await.unwrap();

    let peak = PEAK.load(Ordering::Relaxed);
    let after = LIVE.load(Ordering::Relaxed);

    assert_eq!(emitted, OBJECTS * METRICS_PER_OBJECT);
    assert!((value_sum - 1.11 * emitted as f64).abs() < 1.0);
    assert!(latest.is_some());
    assert_eq!(gateway.perf_calls().len(), OBJECTS / PAGE_SIZE);

    let peak_growth = peak.saturating_sub(baseline);
    let residual = after.saturating_sub(baseline);
    assert!(
        peak_growth < MAX_PEAK_GROWTH,
        "peak grew by {peak_growth} bytes while streaming"
    );
    assert!(residual < MAX_RESIDUAL_GROWTH, "{residual} bytes still live after retrieval");
}
