//! Inventory produced by one traversal of the server's object tree.

use super::mor::Mor;
use super::perf::{MetricInfosByKey, PerfMetricId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DIM_DATACENTER: &str = "datacenter";
pub const DIM_CLUSTER: &str = "cluster";
pub const DIM_ESX_IP: &str = "esx_ip";
pub const DIM_REF_ID: &str = "ref_id";
pub const DIM_OBJECT_TYPE: &str = "object_type";
pub const DIM_VM_NAME: &str = "vm_name";
pub const DIM_GUEST_ID: &str = "guest_id";
pub const DIM_VM_IP: &str = "vm_ip";
pub const DIM_HOST: &str = "host";
pub const DIM_GUEST_FAMILY: &str = "guest_family";
pub const DIM_GUEST_FULLNAME: &str = "guest_fullname";
pub const DIM_VCENTER: &str = "vcenter";
pub const DIM_INSTANCE: &str = "instance";

/// Ordered dimension set of one inventory object.
pub type Dimensions = BTreeMap<String, String>;

/// Source of the `host` dimension on VM objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmHostDimension {
    /// Guest IP address reported by VM tools
    #[default]
    Ip,
    /// Guest hostname reported by VM tools
    Hostname,
    /// Omit the `host` dimension
    Disable,
}

/// A host or VM retained by the traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryObject {
    pub mor: Mor,

    /// Series available on this object; empty until populated
    pub metric_ids: Vec<PerfMetricId>,
}

impl InventoryObject {
    pub fn new(mor: Mor) -> Self {
        Self { mor, metric_ids: Vec::new() }
    }
}

/// Flat result of an inventory traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub objects: Vec<InventoryObject>,

    /// Dimensions keyed by MOR value
    pub dimension_map: HashMap<String, Dimensions>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an object together with its dimensions.
    ///
    /// `ref_id` and `object_type` are always set from the reference. A reference
    /// seen twice keeps its first position and its latest dimensions.
    pub fn add_object(&mut self, mor: Mor, mut dims: Dimensions) {
        dims.insert(DIM_REF_ID.to_string(), mor.value.clone());
        dims.insert(DIM_OBJECT_TYPE.to_string(), mor.kind.clone());
        if self.dimension_map.insert(mor.value.clone(), dims).is_none() {
            self.objects.push(InventoryObject::new(mor));
        }
    }

    pub fn dimensions(&self, mor_value: &str) -> Option<&Dimensions> {
        self.dimension_map.get(mor_value)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Everything the points retrieval phase needs from discovery.
#[derive(Debug, Clone, Default)]
pub struct VsphereInfo {
    pub inventory: Inventory,
    pub metric_infos_by_key: MetricInfosByKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_object_sets_identity_dims() {
        let mut inv = Inventory::new();
        let mut dims = Dimensions::new();
        dims.insert(DIM_DATACENTER.to_string(), "dc".to_string());

        inv.add_object(Mor::new("HostSystem", "host-1"), dims);

        let dims = inv.dimensions("host-1").unwrap();
        assert_eq!(dims[DIM_REF_ID], "host-1");
        assert_eq!(dims[DIM_OBJECT_TYPE], "HostSystem");
        assert_eq!(dims[DIM_DATACENTER], "dc");
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn test_duplicate_reference_is_recorded_once() {
        let mut inv = Inventory::new();
        inv.add_object(Mor::new("VirtualMachine", "vm-1"), Dimensions::new());
        inv.add_object(Mor::new("VirtualMachine", "vm-1"), Dimensions::new());

        assert_eq!(inv.len(), 1);
        assert_eq!(inv.dimension_map.len(), 1);
    }

    #[test]
    fn test_host_dimension_deserializes_lowercase() {
        let policy: VmHostDimension = serde_json::from_str("\"hostname\"").unwrap();
        assert_eq!(policy, VmHostDimension::Hostname);
        assert_eq!(VmHostDimension::default(), VmHostDimension::Ip);
    }
}
