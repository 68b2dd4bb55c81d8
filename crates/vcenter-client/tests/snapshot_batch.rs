//! Batched snapshot operations: REST identity lookup against a mock vCenter,
//! vim25 side replaced by a recording in-memory bridge.

use async_trait::async_trait;
use mockito::{Mock, ServerGuard};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use vcenter_client::snapshot::SnapshotManager;
use vcenter_client::*;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create(ManagedObjectRef, String),
    Revert(ManagedObjectRef),
    Remove(ManagedObjectRef, bool),
}

#[derive(Default)]
struct FakeBridge {
    by_uuid: HashMap<String, ManagedObjectRef>,
    trees: HashMap<String, Vec<SnapshotNode>>,
    failing: bool,
    calls: Mutex<Vec<Call>>,
    waits: Mutex<Vec<Vec<ManagedObjectRef>>>,
}

impl FakeBridge {
    fn with_vm(mut self, uuid: &str, vm: &str) -> Self {
        self.by_uuid
            .insert(uuid.into(), ManagedObjectRef::new("VirtualMachine", vm));
        self
    }

    fn with_tree(mut self, vm: &str, tree: Vec<SnapshotNode>) -> Self {
        self.trees.insert(vm.into(), tree);
        self
    }

    fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn waits(&self) -> Vec<Vec<ManagedObjectRef>> {
        self.waits.lock().unwrap().clone()
    }

    fn dispatch(&self, call: Call) -> ManagedObjectRef {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        ManagedObjectRef::new("Task", format!("task-{}", calls.len()))
    }
}

#[async_trait]
impl VimBridge for FakeBridge {
    async fn find_vm_by_bios_uuid(&self, uuid: &str) -> VcenterResult<Option<ManagedObjectRef>> {
        Ok(self.by_uuid.get(uuid).cloned())
    }

    async fn snapshot_tree(&self, vm: &ManagedObjectRef) -> VcenterResult<Vec<SnapshotNode>> {
        Ok(self.trees.get(&vm.value).cloned().unwrap_or_default())
    }

    async fn create_snapshot(
        &self,
        vm: &ManagedObjectRef,
        spec: &SnapshotSpec,
    ) -> VcenterResult<ManagedObjectRef> {
        Ok(self.dispatch(Call::Create(vm.clone(), spec.name.clone())))
    }

    async fn revert_to_snapshot(&self, snapshot: &ManagedObjectRef) -> VcenterResult<ManagedObjectRef> {
        Ok(self.dispatch(Call::Revert(snapshot.clone())))
    }

    async fn remove_snapshot(
        &self,
        snapshot: &ManagedObjectRef,
        remove_children: bool,
    ) -> VcenterResult<ManagedObjectRef> {
        Ok(self.dispatch(Call::Remove(snapshot.clone(), remove_children)))
    }

    async fn wait_for_tasks(&self, tasks: &[ManagedObjectRef]) -> VcenterResult<Vec<TaskOutcome>> {
        self.waits.lock().unwrap().push(tasks.to_vec());
        let state = if self.failing {
            TaskState::Error("Insufficient disk space on datastore".into())
        } else {
            TaskState::Success
        };
        Ok(tasks
            .iter()
            .map(|task| TaskOutcome {
                task: task.clone(),
                state: state.clone(),
            })
            .collect())
    }
}

fn snap(name: &str, id: &str) -> SnapshotNode {
    SnapshotNode::new(name, ManagedObjectRef::new("VirtualMachineSnapshot", id))
}

fn vm(id: &str) -> Vm {
    Vm::from_payload(&json!({ "vm": id, "name": id, "power_state": "POWERED_ON" })).unwrap()
}

async fn rest_client(server: &mut ServerGuard) -> (VsphereClient, Mock) {
    let session = server
        .mock("POST", "/api/session")
        .with_status(201)
        .with_body("\"batch-token\"")
        .create_async()
        .await;
    let mut client = VsphereClient::new(&VsphereConfig {
        host: server.url(),
        username: "ops".into(),
        password: "ops".into(),
        ..Default::default()
    })
    .unwrap();
    client.login().await.unwrap();
    (client, session)
}

async fn vm_detail(server: &mut ServerGuard, id: &str, bios_uuid: &str) -> Mock {
    server
        .mock("GET", format!("/api/vcenter/vm/{id}").as_str())
        .with_status(200)
        .with_body(
            json!({
                "name": id,
                "power_state": "POWERED_ON",
                "identity": { "bios_uuid": bios_uuid, "instance_uuid": format!("inst-{id}"), "name": id }
            })
            .to_string(),
        )
        .create_async()
        .await
}

fn expected(pairs: &[(&str, bool)]) -> BatchResult {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[tokio::test]
async fn create_skips_unresolvable_vms() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;
    let _d2 = vm_detail(&mut server, "vm-2", "uuid-2").await;
    let _d3 = vm_detail(&mut server, "vm-3", "uuid-3").await;

    let bridge = FakeBridge::default()
        .with_vm("uuid-1", "vm-101")
        .with_vm("uuid-3", "vm-103");
    let spec = SnapshotSpec::new("pre-patch", "before monthly patching");

    let result = SnapshotManager::new(&client, &bridge)
        .create_vms_snapshot(&[vm("vm-1"), vm("vm-2"), vm("vm-3")], &spec)
        .await
        .unwrap();

    assert_eq!(
        result,
        expected(&[("vm-1", true), ("vm-2", false), ("vm-3", true)])
    );
    assert_eq!(
        bridge.calls(),
        vec![
            Call::Create(ManagedObjectRef::new("VirtualMachine", "vm-101"), "pre-patch".into()),
            Call::Create(ManagedObjectRef::new("VirtualMachine", "vm-103"), "pre-patch".into()),
        ]
    );
    let waits = bridge.waits();
    assert_eq!(waits.len(), 1);
    assert_eq!(waits[0].len(), 2);
}

#[tokio::test]
async fn revert_only_where_the_name_exists() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;
    let _d2 = vm_detail(&mut server, "vm-2", "uuid-2").await;

    let bridge = FakeBridge::default()
        .with_vm("uuid-1", "vm-101")
        .with_vm("uuid-2", "vm-102")
        .with_tree(
            "vm-101",
            vec![snap("base", "snapshot-1").with_children(vec![snap("golden", "snapshot-2")])],
        )
        .with_tree("vm-102", vec![snap("base", "snapshot-9")]);

    let result = SnapshotManager::new(&client, &bridge)
        .revert_vms_to_snapshot(&[vm("vm-1"), vm("vm-2")], "golden")
        .await
        .unwrap();

    assert_eq!(result, expected(&[("vm-1", true), ("vm-2", false)]));
    assert_eq!(
        bridge.calls(),
        vec![Call::Revert(ManagedObjectRef::new(
            "VirtualMachineSnapshot",
            "snapshot-2"
        ))]
    );
}

#[tokio::test]
async fn vm_without_any_snapshot_is_skipped() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;

    let bridge = FakeBridge::default().with_vm("uuid-1", "vm-101");

    let result = SnapshotManager::new(&client, &bridge)
        .revert_vms_to_snapshot(&[vm("vm-1")], "golden")
        .await
        .unwrap();

    assert_eq!(result, expected(&[("vm-1", false)]));
    assert!(bridge.calls().is_empty());
    assert_eq!(bridge.waits(), vec![Vec::<ManagedObjectRef>::new()]);
}

#[tokio::test]
async fn delete_targets_first_match_in_tree_order() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;

    let bridge = FakeBridge::default().with_vm("uuid-1", "vm-101").with_tree(
        "vm-101",
        vec![
            snap("base", "snapshot-1").with_children(vec![snap("nightly", "snapshot-2")]),
            snap("nightly", "snapshot-3"),
        ],
    );

    let result = SnapshotManager::new(&client, &bridge)
        .delete_vms_snapshot(&[vm("vm-1")], "nightly", true)
        .await
        .unwrap();

    assert_eq!(result, expected(&[("vm-1", true)]));
    assert_eq!(
        bridge.calls(),
        vec![Call::Remove(
            ManagedObjectRef::new("VirtualMachineSnapshot", "snapshot-2"),
            true
        )]
    );
}

#[tokio::test]
async fn failed_tasks_still_count_as_dispatched() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;

    let bridge = FakeBridge::default().with_vm("uuid-1", "vm-101").failing();

    let result = SnapshotManager::new(&client, &bridge)
        .create_vms_snapshot(&[vm("vm-1")], &SnapshotSpec::new("x", ""))
        .await
        .unwrap();

    assert_eq!(result, expected(&[("vm-1", true)]));
}

#[tokio::test]
async fn rest_failure_aborts_the_batch() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;
    let _d2 = server
        .mock("GET", "/api/vcenter/vm/vm-2")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let bridge = FakeBridge::default().with_vm("uuid-1", "vm-101");

    let err = SnapshotManager::new(&client, &bridge)
        .create_vms_snapshot(&[vm("vm-1"), vm("vm-2")], &SnapshotSpec::new("x", ""))
        .await
        .unwrap_err();

    assert_eq!(err.kind, VcenterErrorKind::ApiError(500));
    assert_eq!(bridge.calls().len(), 1);
    assert!(bridge.waits().is_empty());
}

#[tokio::test]
async fn detail_without_bios_uuid_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = server
        .mock("GET", "/api/vcenter/vm/vm-1")
        .with_status(200)
        .with_body(json!({ "name": "vm-1", "identity": { "name": "vm-1" } }).to_string())
        .create_async()
        .await;

    let bridge = FakeBridge::default();
    let err = SnapshotManager::new(&client, &bridge)
        .create_vms_snapshot(&[vm("vm-1")], &SnapshotSpec::new("x", ""))
        .await
        .unwrap_err();

    assert_eq!(err.kind, VcenterErrorKind::MissingDataField);
}

#[tokio::test]
async fn empty_batch_returns_empty_map() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let bridge = FakeBridge::default();

    let result = SnapshotManager::new(&client, &bridge)
        .revert_vms_to_snapshot(&[], "golden")
        .await
        .unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
async fn service_delete_keeps_children() {
    let mut server = mockito::Server::new_async().await;
    let (client, _session) = rest_client(&mut server).await;
    let _d1 = vm_detail(&mut server, "vm-1", "uuid-1").await;

    let bridge = FakeBridge::default()
        .with_vm("uuid-1", "vm-101")
        .with_tree("vm-101", vec![snap("old", "snapshot-5")]);
    let service = VcenterService::with_bridge(client, bridge);

    let result = service.delete_vms_snapshot(&[vm("vm-1")], "old").await.unwrap();

    assert_eq!(result, expected(&[("vm-1", true)]));
    assert_eq!(
        service.bridge().calls(),
        vec![Call::Remove(
            ManagedObjectRef::new("VirtualMachineSnapshot", "snapshot-5"),
            false
        )]
    );
}

#[tokio::test]
async fn service_requires_a_session() {
    let server = mockito::Server::new_async().await;
    let client = VsphereClient::new(&VsphereConfig {
        host: server.url(),
        username: "ops".into(),
        ..Default::default()
    })
    .unwrap();
    let service = VcenterService::with_bridge(client, FakeBridge::default());

    assert!(!service.is_connected());
    assert!(!service.check_session().await.unwrap());
    let err = service.list_vms(&[]).await.unwrap_err();
    assert_eq!(err.kind, VcenterErrorKind::ConnectionError);
    assert_eq!(service.config_safe().username, "ops");
}
