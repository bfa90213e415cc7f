//! Managed object references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type names the server uses for the entities the collector walks.
pub const FOLDER_TYPE: &str = "Folder";
pub const DATACENTER_TYPE: &str = "Datacenter";
pub const CLUSTER_COMPUTE_TYPE: &str = "ClusterComputeResource";
pub const COMPUTE_TYPE: &str = "ComputeResource";
pub const HOST_TYPE: &str = "HostSystem";
pub const VM_TYPE: &str = "VirtualMachine";

/// Opaque `(type, value)` identifier of a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mor {
    /// Entity type, e.g. `HostSystem`
    #[serde(rename = "type")]
    pub kind: String,

    /// Server-assigned identifier, e.g. `host-42`
    pub value: String,
}

impl Mor {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self { kind: kind.into(), value: value.into() }
    }

    /// Entity kind this reference points at, if it is one the walk understands.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        EntityKind::from_type_name(&self.kind)
    }
}

impl fmt::Display for Mor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Property shape requested from the gateway for a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Folder,
    Datacenter,
    ClusterComputeResource,
    ComputeResource,
    HostSystem,
    VirtualMachine,
}

impl EntityKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            FOLDER_TYPE => Some(Self::Folder),
            DATACENTER_TYPE => Some(Self::Datacenter),
            CLUSTER_COMPUTE_TYPE => Some(Self::ClusterComputeResource),
            COMPUTE_TYPE => Some(Self::ComputeResource),
            HOST_TYPE => Some(Self::HostSystem),
            VM_TYPE => Some(Self::VirtualMachine),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Folder => FOLDER_TYPE,
            Self::Datacenter => DATACENTER_TYPE,
            Self::ClusterComputeResource => CLUSTER_COMPUTE_TYPE,
            Self::ComputeResource => COMPUTE_TYPE,
            Self::HostSystem => HOST_TYPE,
            Self::VirtualMachine => VM_TYPE,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_type_names() {
        for kind in [
            EntityKind::Folder,
            EntityKind::Datacenter,
            EntityKind::ClusterComputeResource,
            EntityKind::ComputeResource,
            EntityKind::HostSystem,
            EntityKind::VirtualMachine,
        ] {
            assert_eq!(EntityKind::from_type_name(kind.type_name()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_type_has_no_kind() {
        let mor = Mor::new("StoragePod", "group-p1");
        assert_eq!(mor.entity_kind(), None);
        assert_eq!(mor.to_string(), "StoragePod:group-p1");
    }
}
