//! Performance manager domain types.

use super::inventory::InventoryObject;
use super::mor::Mor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sampling period of realtime statistics, in seconds.
pub const REALTIME_METRICS_INTERVAL: i32 = 20;

/// How a counter's samples relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsType {
    /// Point-in-time value
    #[default]
    Absolute,
    /// Change since the previous sample
    Delta,
    /// Change per second over the sample period
    Rate,
}

/// Kind of the emitted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl From<StatsType> for MetricKind {
    fn from(stats: StatsType) -> Self {
        match stats {
            StatsType::Delta => Self::Counter,
            StatsType::Absolute | StatsType::Rate => Self::Gauge,
        }
    }
}

/// Unit suffix appended to a derived metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Percent,
    Ms,
    Mhz,
    /// Kilobytes per second
    Kbs,
    Kb,
    Mb,
    Tb,
    Joules,
    Watts,
    Seconds,
}

impl Unit {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Ms => "ms",
            Self::Mhz => "mhz",
            Self::Kbs => "kbs",
            Self::Kb => "kb",
            Self::Mb => "mb",
            Self::Tb => "tb",
            Self::Joules => "joules",
            Self::Watts => "watts",
            Self::Seconds => "seconds",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Metadata of one performance counter as published by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfCounterInfo {
    pub key: i32,

    /// Counter group, e.g. `cpu`
    pub group_key: String,

    /// Counter name within the group, e.g. `coreUtilization`
    pub name_key: String,

    /// Server-side unit key, e.g. `percent`
    pub unit_key: String,

    pub stats_type: StatsType,
}

/// The server's counter catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceManager {
    pub perf_counter: Vec<PerfCounterInfo>,
}

/// One concrete series available on an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerfMetricId {
    pub counter_id: i32,

    /// Device instance, empty for the aggregate series
    pub instance: String,
}

/// Per-object query built for a page of inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfQuerySpec {
    pub entity: Mor,
    pub metric_id: Vec<PerfMetricId>,
    pub max_sample: i32,
    pub interval_id: i32,
}

impl PerfQuerySpec {
    /// Build query specs for a slice of inventory.
    ///
    /// Objects without available metrics are left out: the server rejects
    /// specs with an empty metric list.
    pub fn for_objects(objects: &[InventoryObject], max_sample: i32) -> Vec<Self> {
        objects
            .iter()
            .filter(|obj| !obj.metric_ids.is_empty())
            .map(|obj| Self {
                entity: obj.mor.clone(),
                metric_id: obj.metric_ids.clone(),
                max_sample,
                interval_id: REALTIME_METRICS_INTERVAL,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfSampleInfo {
    pub timestamp: DateTime<Utc>,
    pub interval: i32,
}

/// Values of one counter/instance for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfMetricSeries {
    pub id: PerfMetricId,
    pub value: Vec<i64>,
}

/// Raw query result for one entity. `sample_info[i]` describes `value[_].value[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfEntityMetric {
    pub entity: Mor,
    pub sample_info: Vec<PerfSampleInfo>,
    pub value: Vec<PerfMetricSeries>,
}

/// Naming and typing information resolved for one counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    pub metric_name: String,
    pub counter_key: i32,
    pub stats_type: StatsType,
    pub unit: Option<Unit>,
}

impl MetricInfo {
    /// Convert a raw sample to the reported value.
    ///
    /// Percentages arrive in hundredths of a percent.
    pub fn scale(&self, raw: i64) -> f64 {
        match self.unit {
            Some(Unit::Percent) => raw as f64 / 100.0,
            _ => raw as f64,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.stats_type.into()
    }
}

/// Counter key to metric metadata.
pub type MetricInfosByKey = HashMap<i32, MetricInfo>;
