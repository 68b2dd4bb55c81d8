//! VM inventory and power control via the vSphere REST API.

use crate::error::VcenterResult;
use crate::types::*;
use crate::vsphere::VsphereClient;

use log::{debug, warn};
use reqwest::StatusCode;
use serde_json::Value;

/// High-level VM operations backed by `VsphereClient`.
pub struct VmManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List VMs, restricted to `folders` when non-empty.
    pub async fn list_vms(&self, folders: &[Folder]) -> VcenterResult<Vec<Vm>> {
        let params: Vec<(String, String)> = folders
            .iter()
            .map(|f| ("folders".to_string(), f.folder.clone()))
            .collect();

        let payloads: Vec<Value> = self
            .client
            .get_with_params("/api/vcenter/vm", &params)
            .await?;
        debug!("Listed {} VMs", payloads.len());
        payloads.iter().map(Vm::from_payload).collect()
    }

    /// Raw VM detail payload (GET /api/vcenter/vm/{vm}).
    pub async fn get_vm_info(&self, vm: &Vm) -> VcenterResult<Value> {
        let path = format!("/api/vcenter/vm/{}", vm.vm);
        self.client.get::<Value>(&path).await
    }

    /// Hardware identity of a VM, decoded from its detail payload.
    pub async fn vm_identity(&self, vm: &Vm) -> VcenterResult<VmIdentity> {
        let info = self.get_vm_info(vm).await?;
        VmIdentity::from_vm_info(&info)
    }

    // ── Power operations ────────────────────────────────────────────

    /// Run a power action; `true` only when vCenter answers 204.
    pub async fn power(&self, vm: &Vm, action: PowerAction) -> VcenterResult<bool> {
        let path = format!("/api/vcenter/vm/{}/power", vm.vm);
        let params = [("action".to_string(), action.as_str().to_string())];
        let status = self.client.post_status(&path, &params).await?;

        if status != StatusCode::NO_CONTENT {
            warn!("Power {} on {} returned HTTP {}", action.as_str(), vm.vm, status.as_u16());
            return Ok(false);
        }
        Ok(true)
    }

    /// Hard reset a VM.
    pub async fn reboot_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        self.power(vm, PowerAction::Reset).await
    }

    /// Power on a VM.
    pub async fn start_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        self.power(vm, PowerAction::Start).await
    }

    /// Power off a VM (hard).
    pub async fn stop_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        self.power(vm, PowerAction::Stop).await
    }

    /// Suspend a VM.
    pub async fn suspend_vm(&self, vm: &Vm) -> VcenterResult<bool> {
        self.power(vm, PowerAction::Suspend).await
    }
}
