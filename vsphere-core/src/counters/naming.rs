//! Metric name derivation.
//!
//! `cpu` / `coreUtilization` becomes `vsphere.cpu_core_utilization_percent`:
//! camelCase runs are snake cased, dots become underscores and a unit suffix
//! is appended when the counter is in the unit table.

use crate::types::{PerfCounterInfo, Unit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const PREFIX: &str = "vsphere.";

static CAMEL: Lazy<Regex> = Lazy::new(|| Regex::new("[[:upper:]]+").expect("valid regex"));

/// Units keyed by counter group, then counter name.
static METRIC_UNITS: Lazy<HashMap<&'static str, HashMap<&'static str, Unit>>> = Lazy::new(|| {
    use Unit::*;

    let table: &[(&str, &[(&str, Unit)])] = &[
        (
            "cpu",
            &[
                ("coreUtilization", Percent),
                ("costop", Ms),
                ("demand", Mhz),
                ("demandEntitlementRatio", Percent),
                ("entitlement", Mhz),
                ("idle", Ms),
                ("latency", Percent),
                ("maxlimited", Ms),
                ("overlap", Ms),
                ("readiness", Percent),
                ("ready", Ms),
                ("reservedCapacity", Mhz),
                ("run", Ms),
                ("swapwait", Ms),
                ("system", Ms),
                ("totalCapacity", Mhz),
                ("usage", Percent),
                ("used", Ms),
                ("utilization", Percent),
                ("wait", Ms),
            ],
        ),
        (
            "datastore",
            &[
                ("datastoreVMObservedLatency", Ms),
                ("maxTotalLatency", Ms),
                ("read", Kbs),
                ("sizeNormalizedDatastoreLatency", Ms),
                ("totalReadLatency", Ms),
                ("totalWriteLatency", Ms),
                ("write", Kbs),
            ],
        ),
        (
            "disk",
            &[
                ("deviceLatency", Ms),
                ("deviceReadLatency", Ms),
                ("deviceWriteLatency", Ms),
                ("kernelLatency", Ms),
                ("kernelReadLatency", Ms),
                ("kernelWriteLatency", Ms),
                ("maxTotalLatency", Ms),
                ("queueLatency", Ms),
                ("queueReadLatency", Ms),
                ("queueWriteLatency", Ms),
                ("read", Kbs),
                ("totalReadLatency", Ms),
                ("totalWriteLatency", Ms),
                ("usage", Kbs),
                ("write", Kbs),
            ],
        ),
        ("hbr", &[("hbrNetRx", Kbs), ("hbrNetTx", Kbs)]),
        (
            "mem",
            &[
                ("active", Kb),
                ("activewrite", Kb),
                ("compressed", Kb),
                ("compressionRate", Kbs),
                ("consumed", Kb),
                ("decompressionRate", Kbs),
                ("entitlement", Kb),
                ("granted", Kb),
                ("heap", Kb),
                ("heapfree", Kb),
                ("latency", Percent),
                ("llSwapIn", Kb),
                ("llSwapInRate", Kbs),
                ("llSwapOut", Kb),
                ("llSwapOutRate", Kbs),
                ("llSwapUsed", Kb),
                ("lowfreethreshold", Kb),
                ("overhead", Kb),
                ("overheadMax", Kb),
                ("overheadTouched", Kb),
                ("reservedCapacity", Mb),
                ("shared", Kb),
                ("sharedcommon", Kb),
                ("swapin", Kb),
                ("swapinRate", Kbs),
                ("swapout", Kb),
                ("swapoutRate", Kbs),
                ("swapped", Kb),
                ("swaptarget", Kb),
                ("swapused", Kb),
                ("sysUsage", Kb),
                ("totalCapacity", Mb),
                ("unreserved", Kb),
                ("usage", Percent),
                ("vmfs.pbc.capMissRatio", Percent),
                ("vmfs.pbc.overhead", Kb),
                ("vmfs.pbc.size", Mb),
                ("vmfs.pbc.sizeMax", Mb),
                ("vmfs.pbc.workingSet", Tb),
                ("vmfs.pbc.workingSetMax", Tb),
                ("vmmemctl", Kb),
                ("vmmemctltarget", Kb),
                ("zero", Kb),
                ("zipSaved", Kb),
                ("zipped", Kb),
            ],
        ),
        (
            "net",
            &[
                ("bytesRx", Kbs),
                ("bytesTx", Kbs),
                ("received", Kbs),
                ("transmitted", Kbs),
                ("usage", Kbs),
            ],
        ),
        ("power", &[("energy", Joules), ("power", Watts), ("powerCap", Watts)]),
        (
            "rescpu",
            &[
                ("actav15", Percent),
                ("actav5", Percent),
                ("actpk1", Percent),
                ("actpk15", Percent),
                ("actpk5", Percent),
                ("maxLimited1", Percent),
                ("maxLimited15", Percent),
                ("maxLimited5", Percent),
                ("runav1", Percent),
                ("runav15", Percent),
                ("runav5", Percent),
                ("runpk1", Percent),
                ("runpk15", Percent),
                ("runpk5", Percent),
                ("samplePeriod", Ms),
            ],
        ),
        (
            "storageAdapter",
            &[
                ("maxTotalLatency", Ms),
                ("read", Kbs),
                ("totalReadLatency", Ms),
                ("totalWriteLatency", Ms),
                ("write", Kbs),
            ],
        ),
        (
            "storagePath",
            &[
                ("maxTotalLatency", Ms),
                ("read", Kbs),
                ("totalReadLatency", Ms),
                ("totalWriteLatency", Ms),
                ("write", Kbs),
            ],
        ),
        (
            "sys",
            &[
                ("osUptime", Seconds),
                ("resourceCpuAct1", Percent),
                ("resourceCpuAct5", Percent),
                ("resourceCpuAllocMax", Mhz),
                ("resourceCpuMaxLimited1", Percent),
                ("resourceCpuMaxLimited5", Percent),
                ("resourceCpuRun1", Percent),
                ("resourceCpuRun5", Percent),
                ("resourceCpuUsage", Mhz),
                ("resourceMemAllocMax", Kb),
                ("resourceMemAllocMin", Kb),
                ("resourceMemConsumed", Kb),
                ("resourceMemCow", Kb),
                ("resourceMemMapped", Kb),
                ("resourceMemOverhead", Kb),
                ("resourceMemShared", Kb),
                ("resourceMemSwapped", Kb),
                ("resourceMemTouched", Kb),
                ("resourceMemZero", Kb),
                ("uptime", Seconds),
            ],
        ),
        (
            "virtualDisk",
            &[
                ("read", Kbs),
                ("totalReadLatency", Ms),
                ("totalWriteLatency", Ms),
                ("write", Kbs),
            ],
        ),
    ];

    table.iter().map(|(group, names)| (*group, names.iter().copied().collect())).collect()
});

/// Unit of a counter, if it has an entry in the unit table.
pub fn metric_unit(group: &str, name: &str) -> Option<Unit> {
    METRIC_UNITS.get(group).and_then(|names| names.get(name)).copied()
}

/// Insert `_` before every run of uppercase letters and lowercase the run.
pub fn camel_to_snake_case(input: &str) -> String {
    CAMEL
        .replace_all(input, |caps: &regex::Captures<'_>| format!("_{}", caps[0].to_lowercase()))
        .into_owned()
}

/// Derive the output metric name of a counter.
pub fn metric_name(counter: &PerfCounterInfo) -> String {
    let base = format!("{}_{}", counter.group_key, counter.name_key);
    let mut name = format!("{PREFIX}{}", camel_to_snake_case(&base).replace('.', "_"));
    if let Some(unit) = metric_unit(&counter.group_key, &counter.name_key) {
        name.push('_');
        name.push_str(unit.suffix());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(group: &str, name: &str) -> PerfCounterInfo {
        PerfCounterInfo {
            group_key: group.to_string(),
            name_key: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_core_utilization_name() {
        assert_eq!(
            metric_name(&counter("cpu", "coreUtilization")),
            "vsphere.cpu_core_utilization_percent"
        );
    }

    #[test]
    fn test_dotted_and_camel_names() {
        assert_eq!(
            metric_name(&counter("mem", "vmfs.pbc.capMissRatio")),
            "vsphere.mem_vmfs_pbc_cap_miss_ratio_percent"
        );
        assert_eq!(
            metric_name(&counter("storageAdapter", "totalReadLatency")),
            "vsphere.storage_adapter_total_read_latency_ms"
        );
        assert_eq!(metric_name(&counter("disk", "read")), "vsphere.disk_read_kbs");
        assert_eq!(metric_name(&counter("mem", "swapped")), "vsphere.mem_swapped_kb");
    }

    #[test]
    fn test_uppercase_runs_collapse() {
        assert_eq!(
            camel_to_snake_case("datastoreVMObservedLatency"),
            "datastore_vmobserved_latency"
        );
    }

    #[test]
    fn test_unknown_counter_has_no_suffix() {
        assert_eq!(metric_name(&counter("gpu", "mem.used")), "vsphere.gpu_mem_used");
        assert_eq!(metric_unit("cpu", "nope"), None);
    }
}
