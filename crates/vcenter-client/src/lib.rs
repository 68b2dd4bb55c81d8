//! # vCenter client
//!
//! VM and folder inventory, power control, and batched snapshot operations
//! against vCenter / ESXi. Inventory and power go through the vSphere REST
//! API; snapshots go through the vim25 SOAP object model.
//!
//! ## Modules
//!
//! - **types** — Config, session, inventory records, vim25 handles, snapshot tree
//! - **error** — Crate-specific error types
//! - **decode** — Field-by-field validation of untyped JSON payloads
//! - **vsphere** — vSphere REST API HTTP client with session-based auth
//! - **vm** — VM listing, detail, power actions
//! - **folder** — Folder listing
//! - **xml** — Element tree for SOAP responses
//! - **vim** — `VimBridge` trait (BIOS UUID lookup, snapshot tasks, wait-all)
//! - **soap** — vim25 SOAP implementation of `VimBridge`
//! - **snapshot** — Snapshot tree walk + batched create / revert / delete
//! - **service** — Aggregate facade

pub mod types;
pub mod error;
pub mod decode;
pub mod vsphere;
pub mod vm;
pub mod folder;
pub mod xml;
pub mod vim;
pub mod soap;
pub mod snapshot;
pub mod service;

pub use error::{VcenterError, VcenterErrorKind, VcenterResult};
pub use service::{VcenterService, VcenterServiceState};
pub use soap::SoapVimClient;
pub use types::*;
pub use vim::VimBridge;
pub use vsphere::VsphereClient;
