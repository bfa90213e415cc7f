//! Property shapes of the managed entities the inventory walk visits.

use super::mor::{EntityKind, Mor};
use crate::error::{Result, VsphereError};
use serde::{Deserialize, Serialize};

/// Power state reported for hosts and VMs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    #[default]
    PoweredOn,
    PoweredOff,
    Suspended,
    /// Host standby or an unreachable entity
    Unknown,
}

/// Container of other entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    pub child_entity: Vec<Mor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datacenter {
    pub name: String,

    /// Root folder of the datacenter's compute resources
    pub host_folder: Mor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterComputeResource {
    pub name: String,
    pub host: Vec<Mor>,
}

/// Standalone compute resource (a host outside any cluster).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeResource {
    pub name: String,
    pub host: Vec<Mor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSystem {
    /// Management address of the ESX host
    pub name: String,
    pub os_type: String,
    pub power_state: PowerState,
    pub vm: Vec<Mor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub name: String,
    pub guest_id: String,
    pub power_state: PowerState,
    pub guest: GuestInfo,
}

/// Guest tools information of a VM. Empty strings when tools are not running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub ip_address: String,
    pub host_name: String,
    pub guest_family: String,
    pub guest_full_name: String,
}

/// Properties of one entity, as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManagedEntity {
    Folder(Folder),
    Datacenter(Datacenter),
    ClusterComputeResource(ClusterComputeResource),
    ComputeResource(ComputeResource),
    HostSystem(HostSystem),
    VirtualMachine(VirtualMachine),
}

macro_rules! expect_variant {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Unwrap a `", stringify!($variant), "`, or fail naming the reference.")]
        pub fn $fn_name(self, mor: &Mor) -> Result<$ty> {
            match self {
                Self::$variant(inner) => Ok(inner),
                other => Err(VsphereError::UnexpectedEntity {
                    mor: mor.to_string(),
                    expected: EntityKind::$variant.to_string(),
                    actual: other.kind().to_string(),
                }),
            }
        }
    };
}

impl ManagedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Folder(_) => EntityKind::Folder,
            Self::Datacenter(_) => EntityKind::Datacenter,
            Self::ClusterComputeResource(_) => EntityKind::ClusterComputeResource,
            Self::ComputeResource(_) => EntityKind::ComputeResource,
            Self::HostSystem(_) => EntityKind::HostSystem,
            Self::VirtualMachine(_) => EntityKind::VirtualMachine,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Folder(e) => &e.name,
            Self::Datacenter(e) => &e.name,
            Self::ClusterComputeResource(e) => &e.name,
            Self::ComputeResource(e) => &e.name,
            Self::HostSystem(e) => &e.name,
            Self::VirtualMachine(e) => &e.name,
        }
    }

    expect_variant!(into_folder, Folder, Folder);
    expect_variant!(into_datacenter, Datacenter, Datacenter);
    expect_variant!(into_cluster, ClusterComputeResource, ClusterComputeResource);
    expect_variant!(into_compute, ComputeResource, ComputeResource);
    expect_variant!(into_host, HostSystem, HostSystem);
    expect_variant!(into_vm, VirtualMachine, VirtualMachine);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_variant_mismatch_names_reference() {
        let mor = Mor::new("HostSystem", "host-7");
        let entity = ManagedEntity::Folder(Folder::default());

        let err = entity.into_host(&mor).unwrap_err();
        match err {
            VsphereError::UnexpectedEntity { mor, expected, actual } => {
                assert_eq!(mor, "HostSystem:host-7");
                assert_eq!(expected, "HostSystem");
                assert_eq!(actual, "Folder");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_into_variant_match() {
        let mor = Mor::new("VirtualMachine", "vm-1");
        let vm = VirtualMachine { name: "web-1".to_string(), ..Default::default() };
        let entity = ManagedEntity::VirtualMachine(vm.clone());

        assert_eq!(entity.name(), "web-1");
        assert_eq!(entity.into_vm(&mor).unwrap(), vm);
    }
}
