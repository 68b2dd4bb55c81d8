//! Aggregate service façade for the vCenter client.
//!
//! `VcenterService` owns the REST `VsphereClient` and the vim25 bridge and
//! exposes every operation. Embedders that share one service across tasks
//! hold `VcenterServiceState = Arc<Mutex<VcenterService>>`.

use crate::error::{VcenterError, VcenterResult};
use crate::folder::FolderManager;
use crate::snapshot::SnapshotManager;
use crate::soap::SoapVimClient;
use crate::types::*;
use crate::vim::VimBridge;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;

use log::info;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe handle for embedders.
pub type VcenterServiceState = Arc<Mutex<VcenterService>>;

/// Top-level service that aggregates the REST and vim25 sides.
pub struct VcenterService<B: VimBridge = SoapVimClient> {
    client: VsphereClient,
    bridge: B,
}

impl VcenterService<SoapVimClient> {
    /// Authenticate against both surfaces of a vCenter / ESXi host.
    pub async fn connect(config: VsphereConfig) -> VcenterResult<Self> {
        let mut client = VsphereClient::new(&config)?;
        client.login().await?;
        let bridge = SoapVimClient::connect(&config).await?;
        info!("Connected to {}", client.base_url());
        Ok(Self { client, bridge })
    }

    /// Close both sessions. Failures are logged, not returned.
    pub async fn disconnect(&mut self) -> VcenterResult<()> {
        self.bridge.logout().await?;
        self.client.logout().await
    }
}

impl<B: VimBridge> VcenterService<B> {
    /// Assemble a service from an authenticated client and a bridge.
    pub fn with_bridge(client: VsphereClient, bridge: B) -> Self {
        Self { client, bridge }
    }

    pub fn client(&self) -> &VsphereClient {
        &self.client
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Whether the REST session is active.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    fn require_client(&self) -> VcenterResult<&VsphereClient> {
        if self.client.is_connected() {
            Ok(&self.client)
        } else {
            Err(VcenterError::connection("Not connected to vCenter. Call connect first."))
        }
    }

    /// Check if the REST session is still valid.
    pub async fn check_session(&self) -> VcenterResult<bool> {
        if !self.client.is_connected() {
            return Ok(false);
        }
        self.client.check_session().await
    }

    /// Get current config (without password).
    pub fn config_safe(&self) -> VsphereConfigSafe {
        VsphereConfigSafe::from(self.client.config())
    }

    // ── Inventory ───────────────────────────────────────────────────

    pub async fn list_vms(&self, folders: &[Folder]) -> VcenterResult<Vec<Vm>> {
        VmManager::new(self.require_client()?).list_vms(folders).await
    }

    pub async fn list_folders(
        &self,
        folders: &[Folder],
        parent_folders: &[Folder],
    ) -> VcenterResult<Vec<Folder>> {
        FolderManager::new(self.require_client()?)
            .list_folders(folders, parent_folders)
            .await
    }

    pub async fn get_vm_info(&self, vm: &Vm) -> VcenterResult<Value> {
        VmManager::new(self.require_client()?).get_vm_info(vm).await
    }

    // ── Power ───────────────────────────────────────────────────────

    pub async fn reboot_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        VmManager::new(self.require_client()?).reboot_vm(vm).await
    }

    pub async fn start_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        VmManager::new(self.require_client()?).start_vm(vm).await
    }

    pub async fn stop_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        VmManager::new(self.require_client()?).stop_vm(vm).await
    }

    pub async fn suspend_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        VmManager::new(self.require_client()?).suspend_vm(vm).await
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Snapshot every VM; memory is dumped, the guest is not quiesced
    /// unless `spec` says otherwise.
    pub async fn create_vms_snapshot(
        &self,
        vms: &[Vm],
        spec: &SnapshotSpec,
    ) -> VcenterResult<BatchResult> {
        SnapshotManager::new(self.require_client()?, &self.bridge)
            .create_vms_snapshot(vms, spec)
            .await
    }

    pub async fn revert_vms_to_snapshot(&self, vms: &[Vm], name: &str) -> VcenterResult<BatchResult> {
        SnapshotManager::new(self.require_client()?, &self.bridge)
            .revert_vms_to_snapshot(vms, name)
            .await
    }

    /// Remove the named snapshot on every VM, keeping its children.
    pub async fn delete_vms_snapshot(&self, vms: &[Vm], name: &str) -> VcenterResult<BatchResult> {
        SnapshotManager::new(self.require_client()?, &self.bridge)
            .delete_vms_snapshot(vms, name, false)
            .await
    }
}
