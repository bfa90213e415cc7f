//! Self-telemetry of the collector.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register all collector metrics with descriptions.
pub fn register_core_metrics() {
    // Inventory
    describe_gauge!("vsphere_inventory_objects", "Objects in the last inventory (by object_type)");
    describe_counter!(
        "vsphere_inventory_nodes_filtered_total",
        "Clusters and hosts pruned by the inventory filter"
    );
    describe_counter!(
        "vsphere_inventory_subtrees_skipped_total",
        "Subtrees skipped because a property fetch failed"
    );

    // Retrieval
    describe_counter!("vsphere_points_emitted_total", "Points handed to the sink");
    describe_counter!(
        "vsphere_records_skipped_total",
        "Perf series skipped during conversion (by reason)"
    );
    describe_counter!("vsphere_perf_pages_total", "Performance query pages fetched");

    // Gateway
    describe_counter!(
        "vsphere_gateway_errors_total",
        "Failed gateway calls (by operation)"
    );

    // Cycle
    describe_histogram!(
        "vsphere_phase_duration_seconds",
        "Duration of a collection phase (by phase: inventory, points, cycle)"
    );
}

pub fn set_inventory_size(object_type: &str, count: usize) {
    gauge!("vsphere_inventory_objects", "object_type" => object_type.to_string()).set(count as f64);
}

pub fn record_filtered() {
    counter!("vsphere_inventory_nodes_filtered_total").increment(1);
}

pub fn record_subtree_skipped() {
    counter!("vsphere_inventory_subtrees_skipped_total").increment(1);
}

pub fn record_points_emitted(count: u64) {
    counter!("vsphere_points_emitted_total").increment(count);
}

pub fn record_skipped(reason: &'static str) {
    counter!("vsphere_records_skipped_total", "reason" => reason).increment(1);
}

pub fn record_page() {
    counter!("vsphere_perf_pages_total").increment(1);
}

pub fn record_gateway_error(operation: &'static str) {
    counter!("vsphere_gateway_errors_total", "operation" => operation).increment(1);
}

pub fn record_phase_duration(phase: &'static str, duration_secs: f64) {
    histogram!("vsphere_phase_duration_seconds", "phase" => phase).record(duration_secs);
}
