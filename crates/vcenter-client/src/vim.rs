//! Seam to the vim25 object model.
//!
//! Snapshot operations are not reached through the REST identity of a VM:
//! callers resolve the VM's BIOS UUID to a managed object reference first and
//! then drive snapshot tasks on that reference. `SoapVimClient` is the
//! production implementation.

use crate::error::VcenterResult;
use crate::types::{ManagedObjectRef, SnapshotNode, SnapshotSpec, TaskOutcome};

use async_trait::async_trait;

#[async_trait]
pub trait VimBridge: Send + Sync {
    /// `SearchIndex.FindByUuid` with `vmSearch = true`; `None` when nothing matches.
    async fn find_vm_by_bios_uuid(&self, uuid: &str) -> VcenterResult<Option<ManagedObjectRef>>;

    /// Root snapshot list of `vm`; empty when it has no snapshots.
    async fn snapshot_tree(&self, vm: &ManagedObjectRef) -> VcenterResult<Vec<SnapshotNode>>;

    /// Start `CreateSnapshot_Task`, returning the task handle.
    async fn create_snapshot(
        &self,
        vm: &ManagedObjectRef,
        spec: &SnapshotSpec,
    ) -> VcenterResult<ManagedObjectRef>;

    /// Start `RevertToSnapshot_Task`, returning the task handle.
    async fn revert_to_snapshot(&self, snapshot: &ManagedObjectRef) -> VcenterResult<ManagedObjectRef>;

    /// Start `RemoveSnapshot_Task`, returning the task handle.
    async fn remove_snapshot(
        &self,
        snapshot: &ManagedObjectRef,
        remove_children: bool,
    ) -> VcenterResult<ManagedObjectRef>;

    /// Wait until every task is terminal. Outcomes follow the input order.
    async fn wait_for_tasks(&self, tasks: &[ManagedObjectRef]) -> VcenterResult<Vec<TaskOutcome>>;
}
