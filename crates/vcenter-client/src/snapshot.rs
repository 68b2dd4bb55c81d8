//! Snapshot tree lookup and batched snapshot tasks.
//!
//! Snapshots are only reachable through the vim25 object model, so every
//! batch operation walks the VMs one at a time: REST detail fetch for the
//! BIOS UUID, bridge lookup, optional snapshot tree search, task dispatch.
//! All dispatched tasks are awaited together at the end.
//!
//! The returned map records whether a task was *dispatched* for each VM. A
//! task that later fails keeps its `true`; the failure is logged.

use crate::error::VcenterResult;
use crate::types::*;
use crate::vim::VimBridge;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;

use log::{debug, info, warn};

/// Pre-order flatten: each node before its descendants, subtrees left to
/// right. Iterative, so tree depth is unbounded.
pub fn flatten_snapshots(roots: &[SnapshotNode]) -> Vec<&SnapshotNode> {
    let mut flat = Vec::new();
    let mut stack: Vec<&SnapshotNode> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        flat.push(node);
        stack.extend(node.children.iter().rev());
    }
    flat
}

/// First snapshot named exactly `name` in flatten order.
pub fn find_snapshot_by_name<'a>(roots: &'a [SnapshotNode], name: &str) -> Option<&'a SnapshotNode> {
    flatten_snapshots(roots).into_iter().find(|s| s.name == name)
}

#[derive(Debug, Clone, Copy)]
enum NamedSnapshotAction {
    Revert,
    Remove { remove_children: bool },
}

/// Batched snapshot operations over REST-listed VMs.
pub struct SnapshotManager<'a, B: VimBridge + ?Sized> {
    client: &'a VsphereClient,
    bridge: &'a B,
}

impl<'a, B: VimBridge + ?Sized> SnapshotManager<'a, B> {
    pub fn new(client: &'a VsphereClient, bridge: &'a B) -> Self {
        Self { client, bridge }
    }

    /// REST identity → vim25 handle. `None` means the VM is skipped.
    pub async fn resolve_vm(&self, vm: &Vm) -> VcenterResult<Option<ManagedObjectRef>> {
        let identity = VmManager::new(self.client).vm_identity(vm).await?;
        let handle = self.bridge.find_vm_by_bios_uuid(&identity.bios_uuid).await?;
        if handle.is_none() {
            warn!(
                "No vim25 object for {} (bios uuid {}), skipping",
                vm.vm, identity.bios_uuid
            );
        }
        Ok(handle)
    }

    /// Snapshot every resolvable VM.
    pub async fn create_vms_snapshot(
        &self,
        vms: &[Vm],
        spec: &SnapshotSpec,
    ) -> VcenterResult<BatchResult> {
        let mut stats = initial_stats(vms);
        let mut tasks = Vec::new();

        for vm in vms {
            let Some(handle) = self.resolve_vm(vm).await? else {
                continue;
            };
            tasks.push(self.bridge.create_snapshot(&handle, spec).await?);
            stats.insert(vm.vm.clone(), true);
        }

        self.wait_all(&tasks).await?;
        Ok(stats)
    }

    /// Revert each VM to its first snapshot named `name`.
    pub async fn revert_vms_to_snapshot(&self, vms: &[Vm], name: &str) -> VcenterResult<BatchResult> {
        self.for_named_snapshot(vms, name, NamedSnapshotAction::Revert)
            .await
    }

    /// Remove each VM's first snapshot named `name`.
    pub async fn delete_vms_snapshot(
        &self,
        vms: &[Vm],
        name: &str,
        remove_children: bool,
    ) -> VcenterResult<BatchResult> {
        self.for_named_snapshot(vms, name, NamedSnapshotAction::Remove { remove_children })
            .await
    }

    async fn for_named_snapshot(
        &self,
        vms: &[Vm],
        name: &str,
        action: NamedSnapshotAction,
    ) -> VcenterResult<BatchResult> {
        let mut stats = initial_stats(vms);
        let mut tasks = Vec::new();

        for vm in vms {
            let Some(handle) = self.resolve_vm(vm).await? else {
                continue;
            };

            let tree = self.bridge.snapshot_tree(&handle).await?;
            let Some(snapshot) = find_snapshot_by_name(&tree, name) else {
                debug!("{} has no snapshot named {name:?}", vm.vm);
                continue;
            };

            let task = match action {
                NamedSnapshotAction::Revert => {
                    self.bridge.revert_to_snapshot(&snapshot.snapshot).await?
                }
                NamedSnapshotAction::Remove { remove_children } => {
                    self.bridge
                        .remove_snapshot(&snapshot.snapshot, remove_children)
                        .await?
                }
            };
            tasks.push(task);
            stats.insert(vm.vm.clone(), true);
        }

        self.wait_all(&tasks).await?;
        Ok(stats)
    }

    async fn wait_all(&self, tasks: &[ManagedObjectRef]) -> VcenterResult<Vec<TaskOutcome>> {
        let outcomes = self.bridge.wait_for_tasks(tasks).await?;
        for outcome in &outcomes {
            if let TaskState::Error(ref message) = outcome.state {
                warn!("Snapshot task {} failed: {message}", outcome.task);
            }
        }
        info!(
            "{} of {} snapshot tasks succeeded",
            outcomes.iter().filter(|o| o.succeeded()).count(),
            tasks.len()
        );
        Ok(outcomes)
    }
}

fn initial_stats(vms: &[Vm]) -> BatchResult {
    vms.iter().map(|vm| (vm.vm.clone(), false)).collect()
}
