//! Inventory discovery.
//!
//! Walks the server's object tree from the root folder and keeps hosts and
//! VMs, each with the dimensions collected on the way down:
//!
//! ```text
//! Folder ─► Datacenter ─► host Folder ─┬─► Cluster ─► Host ─► VM
//!                                      └─► ComputeResource ─► Host ─► VM
//! ```
//!
//! Clusters and hosts rejected by the filter are pruned before any of their
//! children are fetched. A failed property fetch skips that subtree only.

use crate::error::Result;
use crate::filter::{FilterContext, InventoryFilter};
use crate::gateway::Gateway;
use crate::observability::metrics;
use crate::types::inventory::{
    DIM_CLUSTER, DIM_DATACENTER, DIM_ESX_IP, DIM_GUEST_FAMILY, DIM_GUEST_FULLNAME, DIM_GUEST_ID,
    DIM_HOST, DIM_VM_IP, DIM_VM_NAME,
};
use crate::types::{
    Dimensions, EntityKind, Inventory, Mor, PowerState, VirtualMachine, VmHostDimension,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Dimensions inherited from ancestors, in the order they were added.
type DimPairs = Vec<(&'static str, String)>;

/// A node waiting to be visited.
struct Visit {
    mor: Mor,
    kind: EntityKind,
    dims: DimPairs,
}

fn pair_value<'a>(dims: &'a DimPairs, key: &str) -> &'a str {
    dims.iter().rev().find(|(k, _)| *k == key).map(|(_, v)| v.as_str()).unwrap_or("")
}

fn amend_dims(target: &mut Dimensions, dims: &DimPairs) {
    for (key, value) in dims {
        target.insert((*key).to_string(), value.clone());
    }
}

/// Traverses the inventory tree and returns all hosts and VMs.
pub struct InventoryService {
    gateway: Arc<dyn Gateway>,
    filter: InventoryFilter,
    host_dim: VmHostDimension,
}

impl InventoryService {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        filter: InventoryFilter,
        host_dim: VmHostDimension,
    ) -> Self {
        Self { gateway, filter, host_dim }
    }

    /// Walk the tree and build a fresh inventory.
    ///
    /// Only a failure to read the root folder is returned; every other
    /// failure is logged and its subtree left out.
    #[instrument(skip(self), fields(vcenter = %self.gateway.vcenter_name()))]
    pub async fn retrieve_inventory(&self) -> Result<Inventory> {
        let started = Instant::now();
        let root = self.gateway.top_level_folder_ref();
        let root_folder = self
            .gateway
            .retrieve_ref_properties(&root, EntityKind::Folder)
            .await
            .inspect_err(|_| metrics::record_gateway_error("retrieveRefProperties"))?
            .into_folder(&root)?;

        let mut inv = Inventory::new();
        let mut pending = Vec::new();
        Self::push_children(&mut pending, &root_folder.child_entity, None, &DimPairs::new());

        while let Some(visit) = pending.pop() {
            let mor = visit.mor.clone();
            if let Err(e) = self.visit(visit, &mut inv, &mut pending).await {
                warn!(mor = %mor, error = %e, "Skipping inventory subtree");
                metrics::record_subtree_skipped();
            }
        }

        let hosts = inv
            .objects
            .iter()
            .filter(|o| o.mor.entity_kind() == Some(EntityKind::HostSystem))
            .count();
        metrics::set_inventory_size(EntityKind::HostSystem.type_name(), hosts);
        metrics::set_inventory_size(EntityKind::VirtualMachine.type_name(), inv.len() - hosts);
        info!(
            hosts,
            vms = inv.len() - hosts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Inventory retrieved"
        );
        Ok(inv)
    }

    /// Queue `children` so they are visited in server order.
    ///
    /// With `kind` unset the kind is taken from each reference; references of
    /// kinds the walk does not follow are ignored.
    fn push_children(
        pending: &mut Vec<Visit>,
        children: &[Mor],
        kind: Option<EntityKind>,
        dims: &DimPairs,
    ) {
        for child in children.iter().rev() {
            match kind.or_else(|| child.entity_kind()) {
                Some(kind) => pending.push(Visit { mor: child.clone(), kind, dims: dims.clone() }),
                None => debug!(mor = %child, "inventory: ignoring unsupported child"),
            }
        }
    }

    fn keep(&self, dims: &DimPairs, what: &str) -> bool {
        let ctx = FilterContext {
            datacenter: pair_value(dims, DIM_DATACENTER),
            cluster: pair_value(dims, DIM_CLUSTER),
        };
        let (keep, err) = self.filter.keep(&ctx);
        if let Some(e) = err {
            warn!(error = %e, keep, "Inventory filter evaluation failed");
        }
        if !keep {
            debug!(datacenter = ctx.datacenter, cluster = ctx.cluster, "{} filtered", what);
            metrics::record_filtered();
        }
        keep
    }

    async fn visit(
        &self,
        visit: Visit,
        inv: &mut Inventory,
        pending: &mut Vec<Visit>,
    ) -> Result<()> {
        let Visit { mor, kind, mut dims } = visit;
        let entity = self
            .gateway
            .retrieve_ref_properties(&mor, kind)
            .await
            .inspect_err(|_| metrics::record_gateway_error("retrieveRefProperties"))?;
        debug!(kind = %entity.kind(), name = entity.name(), "inventory: visiting");

        match kind {
            EntityKind::Folder => {
                let folder = entity.into_folder(&mor)?;
                Self::push_children(pending, &folder.child_entity, None, &dims);
            }
            EntityKind::Datacenter => {
                let dc = entity.into_datacenter(&mor)?;
                dims.push((DIM_DATACENTER, dc.name));
                pending.push(Visit { mor: dc.host_folder, kind: EntityKind::Folder, dims });
            }
            EntityKind::ClusterComputeResource => {
                let cluster = entity.into_cluster(&mor)?;
                dims.push((DIM_CLUSTER, cluster.name));
                if self.keep(&dims, "cluster") {
                    let hosts = Some(EntityKind::HostSystem);
                    Self::push_children(pending, &cluster.host, hosts, &dims);
                }
            }
            EntityKind::ComputeResource => {
                let compute = entity.into_compute(&mor)?;
                Self::push_children(pending, &compute.host, Some(EntityKind::HostSystem), &dims);
            }
            EntityKind::HostSystem => {
                let host = entity.into_host(&mor)?;
                debug!(name = %host.name, os_type = %host.os_type, "inventory: host");
                if host.power_state == PowerState::PoweredOff {
                    debug!(name = %host.name, "inventory: host powered off");
                    return Ok(());
                }
                // Standalone hosts meet the filter here for the first time.
                if !self.keep(&dims, "host") {
                    return Ok(());
                }
                dims.push((DIM_ESX_IP, host.name));
                let mut host_dims = Dimensions::new();
                amend_dims(&mut host_dims, &dims);
                inv.add_object(mor, host_dims);
                Self::push_children(pending, &host.vm, Some(EntityKind::VirtualMachine), &dims);
            }
            EntityKind::VirtualMachine => {
                let vm = entity.into_vm(&mor)?;
                if vm.power_state == PowerState::PoweredOff {
                    debug!(name = %vm.name, "inventory: vm powered off");
                    return Ok(());
                }
                let mut vm_dims = self.vm_dims(vm);
                amend_dims(&mut vm_dims, &dims);
                inv.add_object(mor, vm_dims);
            }
        }
        Ok(())
    }

    fn vm_dims(&self, vm: VirtualMachine) -> Dimensions {
        let host = match self.host_dim {
            VmHostDimension::Ip => Some(vm.guest.ip_address.clone()),
            VmHostDimension::Hostname => Some(vm.guest.host_name),
            VmHostDimension::Disable => None,
        };

        let mut dims = Dimensions::new();
        dims.insert(DIM_VM_NAME.to_string(), vm.name);
        dims.insert(DIM_GUEST_ID.to_string(), vm.guest_id);
        // Guest tools values are empty while tools are not running.
        for (key, value) in [
            (DIM_VM_IP, Some(vm.guest.ip_address)),
            (DIM_GUEST_FAMILY, Some(vm.guest.guest_family)),
            (DIM_GUEST_FULLNAME, Some(vm.guest.guest_full_name)),
            (DIM_HOST, host),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                dims.insert(key.to_string(), value);
            }
        }
        dims
    }
}
