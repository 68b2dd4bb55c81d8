//! Shared types for vCenter management.

use crate::decode::{FieldType, Payload, Presence};
use crate::error::{VcenterError, VcenterResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection / Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Top-level configuration for connecting to a vCenter / ESXi host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsphereConfig {
    /// Hostname ("vcenter.lab.local") or full base URL ("https://vcenter.lab.local")
    pub host: String,
    /// Port (default 443), ignored when `host` is a full URL
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username (e.g. "administrator@vsphere.local")
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS certificate verification (self-signed labs)
    #[serde(default)]
    pub insecure: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Delay between task state polls while waiting on vim25 tasks
    #[serde(default = "default_task_poll")]
    pub task_poll_interval_ms: u64,
    /// vim25 API version sent in the SOAPAction header
    #[serde(default = "default_vim_version")]
    pub vim_version: String,
}

fn default_port() -> u16 { 443 }
fn default_timeout() -> u64 { 15 }
fn default_connect_timeout() -> u64 { 10 }
fn default_task_poll() -> u64 { 500 }
fn default_vim_version() -> String { "8.0.0.0".to_string() }

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            port: default_port(),
            insecure: false,
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            task_poll_interval_ms: default_task_poll(),
            vim_version: default_vim_version(),
        }
    }
}

impl VsphereConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}:{}", host, self.port)
        }
    }

    /// vim25 SOAP endpoint.
    pub fn soap_url(&self) -> String {
        format!("{}/sdk", self.base_url())
    }

    /// Reject configs that cannot produce a working client.
    pub fn validate(&self) -> VcenterResult<()> {
        if self.host.trim().is_empty() {
            return Err(VcenterError::config("host must not be empty"));
        }
        if self.username.is_empty() {
            return Err(VcenterError::config("username must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(VcenterError::config("timeoutSecs must be greater than zero"));
        }
        url::Url::parse(&self.base_url())
            .map_err(|e| VcenterError::config(format!("invalid host {:?}: {e}", self.host)))?;
        Ok(())
    }
}

/// Config without the password, safe to hand back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsphereConfigSafe {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub insecure: bool,
}

impl From<&VsphereConfig> for VsphereConfigSafe {
    fn from(c: &VsphereConfig) -> Self {
        Self {
            host: c.host.clone(),
            port: c.port,
            username: c.username.clone(),
            insecure: c.insecure,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks an active vSphere REST session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsphereSession {
    pub base_url: String,
    pub username: String,
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Enumerations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmPowerState {
    PoweredOff,
    PoweredOn,
    Suspended,
}

pub const POWER_STATE_LABELS: &[(&str, VmPowerState)] = &[
    ("POWERED_OFF", VmPowerState::PoweredOff),
    ("POWERED_ON", VmPowerState::PoweredOn),
    ("SUSPENDED", VmPowerState::Suspended),
];

impl VmPowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            VmPowerState::PoweredOff => "POWERED_OFF",
            VmPowerState::PoweredOn => "POWERED_ON",
            VmPowerState::Suspended => "SUSPENDED",
        }
    }
}

impl fmt::Display for VmPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FolderType {
    Datacenter,
    Datastore,
    Host,
    Network,
    VirtualMachine,
}

pub const FOLDER_TYPE_LABELS: &[(&str, FolderType)] = &[
    ("DATACENTER", FolderType::Datacenter),
    ("DATASTORE", FolderType::Datastore),
    ("HOST", FolderType::Host),
    ("NETWORK", FolderType::Network),
    ("VIRTUAL_MACHINE", FolderType::VirtualMachine),
];

impl FolderType {
    pub fn as_str(self) -> &'static str {
        match self {
            FolderType::Datacenter => "DATACENTER",
            FolderType::Datastore => "DATASTORE",
            FolderType::Host => "HOST",
            FolderType::Network => "NETWORK",
            FolderType::VirtualMachine => "VIRTUAL_MACHINE",
        }
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power operations accepted by `POST /api/vcenter/vm/{vm}/power`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Reset,
    Start,
    Stop,
    Suspend,
}

impl PowerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::Reset => "reset",
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Suspend => "suspend",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Inventory records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// VM summary as returned by `GET /api/vcenter/vm`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Vm {
    /// vSphere identifier (e.g. "vm-42")
    pub vm: String,
    pub name: String,
    pub power_state: VmPowerState,
    pub cpu_count: Option<u64>,
    #[serde(rename = "memory_size_MiB")]
    pub memory_size_mib: Option<u64>,
}

impl Vm {
    pub fn from_payload(value: &Value) -> VcenterResult<Self> {
        let p = Payload::new("VM", value)?;
        p.validate(
            &[
                ("name", FieldType::String),
                ("power_state", FieldType::String),
                ("vm", FieldType::String),
            ],
            Presence::Required,
        )?;
        p.validate(
            &[
                ("cpu_count", FieldType::Integer),
                ("memory_size_MiB", FieldType::Integer),
            ],
            Presence::Optional,
        )?;

        Ok(Self {
            vm: p.str("vm")?.to_string(),
            name: p.str("name")?.to_string(),
            power_state: p.label("power_state", POWER_STATE_LABELS)?,
            cpu_count: p.opt_u64("cpu_count")?,
            memory_size_mib: p.opt_u64("memory_size_MiB")?,
        })
    }

    /// Memory size; the API reports MiB under the `MiB` name.
    pub fn memory_size_mb(&self) -> Option<u64> {
        self.memory_size_mib
    }
}

impl TryFrom<&Value> for Vm {
    type Error = VcenterError;

    fn try_from(value: &Value) -> VcenterResult<Self> {
        Self::from_payload(value)
    }
}

/// Folder summary as returned by `GET /api/vcenter/folder`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Folder {
    /// vSphere identifier (e.g. "group-v3")
    pub folder: String,
    pub name: String,
    #[serde(rename = "type")]
    pub folder_type: FolderType,
}

impl Folder {
    pub fn from_payload(value: &Value) -> VcenterResult<Self> {
        let p = Payload::new("Folder", value)?;
        p.validate(
            &[
                ("folder", FieldType::String),
                ("name", FieldType::String),
                ("type", FieldType::String),
            ],
            Presence::Required,
        )?;

        Ok(Self {
            folder: p.str("folder")?.to_string(),
            name: p.str("name")?.to_string(),
            folder_type: p.label("type", FOLDER_TYPE_LABELS)?,
        })
    }
}

impl TryFrom<&Value> for Folder {
    type Error = VcenterError;

    fn try_from(value: &Value) -> VcenterResult<Self> {
        Self::from_payload(value)
    }
}

/// The `identity` block of `GET /api/vcenter/vm/{vm}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VmIdentity {
    pub bios_uuid: String,
    pub instance_uuid: Option<String>,
    pub name: Option<String>,
}

impl VmIdentity {
    /// Decode from a full VM info payload.
    pub fn from_vm_info(info: &Value) -> VcenterResult<Self> {
        let p = Payload::new("VmInfo", info)?;
        p.validate(&[("identity", FieldType::Object)], Presence::Required)?;
        Self::from_payload_view(p.object("identity", "VmIdentity")?)
    }

    fn from_payload_view(p: Payload<'_>) -> VcenterResult<Self> {
        p.validate(&[("bios_uuid", FieldType::String)], Presence::Required)?;
        p.validate(
            &[("instance_uuid", FieldType::String), ("name", FieldType::String)],
            Presence::Optional,
        )?;

        Ok(Self {
            bios_uuid: p.str("bios_uuid")?.to_string(),
            instance_uuid: p.opt_str("instance_uuid")?.map(str::to_string),
            name: p.opt_str("name")?.map(str::to_string),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  vim25 object model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Managed object reference (`<obj type="VirtualMachine">vm-42</obj>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub mo_type: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(mo_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self { mo_type: mo_type.into(), value: value.into() }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mo_type, self.value)
    }
}

/// One node of a VM's snapshot tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    /// Display name; not unique within a tree
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Handle used to revert to / remove this snapshot
    pub snapshot: ManagedObjectRef,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    /// VM power state captured with the snapshot (vim25 label, e.g. "poweredOn")
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub quiesced: bool,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    /// Leaf node with only a name and handle set.
    pub fn new(name: impl Into<String>, snapshot: ManagedObjectRef) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            snapshot,
            id: None,
            create_time: None,
            state: None,
            quiesced: false,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<SnapshotNode>) -> Self {
        self.children = children;
        self
    }
}

/// Parameters for `CreateSnapshot_Task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Snapshot the VM's memory state
    #[serde(default = "default_true")]
    pub memory: bool,
    /// Quiesce the guest file system
    #[serde(default)]
    pub quiesce: bool,
}

fn default_true() -> bool { true }

impl SnapshotSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            memory: true,
            quiesce: false,
        }
    }
}

/// Terminal state of a vim25 task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Success,
    Error(String),
}

/// A dispatched task and the state it finished in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: ManagedObjectRef,
    pub state: TaskState,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Success
    }
}

/// Per-VM batch result keyed by VM identifier: `true` when a task was
/// dispatched for that VM.
pub type BatchResult = HashMap<String, bool>;
