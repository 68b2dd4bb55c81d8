//! vim25 SOAP transport implementing [`VimBridge`].
//!
//! Speaks the legacy object model at `{base_url}/sdk`: retrieves the service
//! content to learn the session manager, search index and property collector
//! references (they differ between vCenter and standalone ESXi), logs in with
//! the session cookie kept by reqwest, and drives snapshot tasks. Task
//! completion is observed by polling `info.state` through the property
//! collector.

use crate::error::{VcenterError, VcenterResult};
use crate::types::*;
use crate::vim::VimBridge;
use crate::xml::{self, xml_escape, XmlElement};

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ─── Constants ───────────────────────────────────────────────────────

const NS_SOAPENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const NS_XSD: &str = "http://www.w3.org/2001/XMLSchema";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const NS_VIM25: &str = "urn:vim25";

// ─── Service content ─────────────────────────────────────────────────

/// The subset of `ServiceContent` this client needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContent {
    pub session_manager: ManagedObjectRef,
    pub search_index: ManagedObjectRef,
    pub property_collector: ManagedObjectRef,
    pub api_version: Option<String>,
}

// ─── Transport ───────────────────────────────────────────────────────

pub struct SoapVimClient {
    client: reqwest::Client,
    endpoint: String,
    soap_action: String,
    poll_interval: Duration,
    content: Option<ServiceContent>,
    logged_in: bool,
    request_counter: AtomicU64,
}

impl SoapVimClient {
    /// Build a transport from config (no round-trip yet).
    pub fn new(config: &VsphereConfig) -> VcenterResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| VcenterError::connection(format!("Failed to build SOAP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.soap_url(),
            soap_action: format!("{NS_VIM25}/{}", config.vim_version),
            poll_interval: Duration::from_millis(config.task_poll_interval_ms),
            content: None,
            logged_in: false,
            request_counter: AtomicU64::new(0),
        })
    }

    /// Build, fetch the service content and log in with the configured credentials.
    pub async fn connect(config: &VsphereConfig) -> VcenterResult<Self> {
        let mut client = Self::new(config)?;
        client.retrieve_service_content().await?;
        client.login(&config.username, &config.password).await?;
        Ok(client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn service_content(&self) -> Option<&ServiceContent> {
        self.content.as_ref()
    }

    fn require_content(&self) -> VcenterResult<&ServiceContent> {
        self.content
            .as_ref()
            .ok_or_else(|| VcenterError::connection("vim25 service content not retrieved yet"))
    }

    // ─── Session ─────────────────────────────────────────────────────

    /// `ServiceInstance.RetrieveServiceContent`.
    pub async fn retrieve_service_content(&mut self) -> VcenterResult<&ServiceContent> {
        let this = ManagedObjectRef::new("ServiceInstance", "ServiceInstance");
        let resp = self.invoke("RetrieveServiceContent", &this, "").await?;
        let content = parse_service_content(&resp)?;
        debug!(
            "vim25 service content: api {}, search index {}",
            content.api_version.as_deref().unwrap_or("?"),
            content.search_index
        );
        let content = self.content.insert(content);
        Ok(&*content)
    }

    /// `SessionManager.Login`; the session cookie is kept by the HTTP client.
    pub async fn login(&mut self, user: &str, password: &str) -> VcenterResult<()> {
        let session_manager = self.require_content()?.session_manager.clone();
        let args = format!(
            "<userName>{}</userName><password>{}</password>",
            xml_escape(user),
            xml_escape(password)
        );
        self.invoke("Login", &session_manager, &args).await?;
        self.logged_in = true;
        info!("vim25 session established for {user}");
        Ok(())
    }

    /// `SessionManager.Logout`, best effort.
    pub async fn logout(&mut self) -> VcenterResult<()> {
        if self.logged_in {
            if let Ok(content) = self.require_content() {
                let session_manager = content.session_manager.clone();
                if let Err(e) = self.invoke("Logout", &session_manager, "").await {
                    warn!("Ignoring failed vim25 logout: {e}");
                }
            }
        }
        self.logged_in = false;
        Ok(())
    }

    // ─── Property collector ──────────────────────────────────────────

    async fn retrieve_properties(
        &self,
        mo_type: &str,
        paths: &[&str],
        objects: &[&ManagedObjectRef],
    ) -> VcenterResult<XmlElement> {
        let collector = self.require_content()?.property_collector.clone();
        let path_set: String = paths
            .iter()
            .map(|p| format!("<pathSet>{}</pathSet>", xml_escape(p)))
            .collect();
        let object_set: String = objects
            .iter()
            .map(|o| format!("<objectSet>{}<skip>false</skip></objectSet>", mo_ref_xml("obj", o)))
            .collect();
        let args = format!(
            "<specSet><propSet><type>{}</type>{path_set}</propSet>{object_set}</specSet><options/>",
            xml_escape(mo_type)
        );
        self.invoke("RetrievePropertiesEx", &collector, &args).await
    }

    async fn task_states(
        &self,
        tasks: &[&ManagedObjectRef],
    ) -> VcenterResult<HashMap<ManagedObjectRef, Option<TaskState>>> {
        let resp = self
            .retrieve_properties("Task", &["info.state", "info.error"], tasks)
            .await?;
        Ok(parse_task_states(&resp))
    }

    // ─── Core ────────────────────────────────────────────────────────

    /// Call `method` on `this` and return its `<method>Response` element.
    async fn invoke(
        &self,
        method: &str,
        this: &ManagedObjectRef,
        args: &str,
    ) -> VcenterResult<XmlElement> {
        let body = envelope(&format!(
            r#"<{method} xmlns="{NS_VIM25}">{}{args}</{method}>"#,
            mo_ref_xml("_this", this)
        ));
        let text = self.send_raw(method, &body).await?;
        let root = xml::parse(&text)?;
        let response_name = format!("{method}Response");
        root.find(&response_name).cloned().ok_or_else(|| {
            VcenterError::parse(format!("vim25 response has no {response_name} element"))
        })
    }

    async fn send_raw(&self, method: &str, soap_body: &str) -> VcenterResult<String> {
        let req_id = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        headers.insert(
            HeaderName::from_static("soapaction"),
            HeaderValue::from_str(&self.soap_action)
                .map_err(|e| VcenterError::config(format!("Invalid SOAPAction: {e}")))?,
        );

        debug!("vim25 request #{req_id} {method} to {}", self.endpoint);
        trace!("vim25 request #{req_id} body:\n{soap_body}");

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(soap_body.to_string())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            VcenterError::parse(format!("Failed to read vim25 response body: {e}"))
        })?;
        trace!("vim25 response #{req_id}: status={status}, {} bytes", body.len());

        // Faults arrive as HTTP 500 with a regular envelope
        if let Some(fault) = extract_fault(&body) {
            error!("vim25 {method} fault (HTTP {}): {fault}", status.as_u16());
            return Err(VcenterError::soap_fault(format!("{method}: {fault}")));
        }
        if !status.is_success() {
            return Err(VcenterError::api(
                status.as_u16(),
                format!("vim25 {method} failed with HTTP {}", status.as_u16()),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl VimBridge for SoapVimClient {
    async fn find_vm_by_bios_uuid(&self, uuid: &str) -> VcenterResult<Option<ManagedObjectRef>> {
        let search_index = self.require_content()?.search_index.clone();
        let args = format!(
            "<uuid>{}</uuid><vmSearch>true</vmSearch>",
            xml_escape(uuid)
        );
        let resp = self.invoke("FindByUuid", &search_index, &args).await?;
        Ok(resp.child("returnval").and_then(parse_mo_ref))
    }

    async fn snapshot_tree(&self, vm: &ManagedObjectRef) -> VcenterResult<Vec<SnapshotNode>> {
        let resp = self
            .retrieve_properties(&vm.mo_type, &["snapshot"], &[vm])
            .await?;
        parse_snapshot_info(&resp)
    }

    async fn create_snapshot(
        &self,
        vm: &ManagedObjectRef,
        spec: &SnapshotSpec,
    ) -> VcenterResult<ManagedObjectRef> {
        let args = format!(
            "<name>{}</name><description>{}</description><memory>{}</memory><quiesce>{}</quiesce>",
            xml_escape(&spec.name),
            xml_escape(&spec.description),
            spec.memory,
            spec.quiesce
        );
        let resp = self.invoke("CreateSnapshot_Task", vm, &args).await?;
        task_ref(&resp, "CreateSnapshot_Task")
    }

    async fn revert_to_snapshot(&self, snapshot: &ManagedObjectRef) -> VcenterResult<ManagedObjectRef> {
        let resp = self.invoke("RevertToSnapshot_Task", snapshot, "").await?;
        task_ref(&resp, "RevertToSnapshot_Task")
    }

    async fn remove_snapshot(
        &self,
        snapshot: &ManagedObjectRef,
        remove_children: bool,
    ) -> VcenterResult<ManagedObjectRef> {
        let args = format!("<removeChildren>{remove_children}</removeChildren>");
        let resp = self.invoke("RemoveSnapshot_Task", snapshot, &args).await?;
        task_ref(&resp, "RemoveSnapshot_Task")
    }

    async fn wait_for_tasks(&self, tasks: &[ManagedObjectRef]) -> VcenterResult<Vec<TaskOutcome>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let mut finished: HashMap<ManagedObjectRef, TaskState> = HashMap::new();
        loop {
            let pending: Vec<&ManagedObjectRef> = tasks
                .iter()
                .filter(|t| !finished.contains_key(*t))
                .collect();
            if pending.is_empty() {
                break;
            }

            for (task, state) in self.task_states(&pending).await? {
                if let Some(state) = state {
                    debug!("Task {task} finished: {state:?}");
                    finished.insert(task, state);
                }
            }

            if tasks.iter().any(|t| !finished.contains_key(t)) {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Ok(tasks
            .iter()
            .filter_map(|t| {
                finished.get(t).map(|state| TaskOutcome {
                    task: t.clone(),
                    state: state.clone(),
                })
            })
            .collect())
    }
}

// ─── Envelope helpers ────────────────────────────────────────────────

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{NS_SOAPENV}" xmlns:xsd="{NS_XSD}" xmlns:xsi="{NS_XSI}">
  <soapenv:Body>{body}</soapenv:Body>
</soapenv:Envelope>"#
    )
}

fn mo_ref_xml(tag: &str, mo: &ManagedObjectRef) -> String {
    format!(
        r#"<{tag} type="{}">{}</{tag}>"#,
        xml_escape(&mo.mo_type),
        xml_escape(&mo.value)
    )
}

// ─── Response parsing ────────────────────────────────────────────────

fn parse_mo_ref(el: &XmlElement) -> Option<ManagedObjectRef> {
    let mo_type = el.attr("type")?;
    let value = el.text.trim();
    if value.is_empty() {
        return None;
    }
    Some(ManagedObjectRef::new(mo_type, value))
}

fn task_ref(resp: &XmlElement, method: &str) -> VcenterResult<ManagedObjectRef> {
    resp.child("returnval")
        .and_then(parse_mo_ref)
        .ok_or_else(|| VcenterError::task(format!("{method} returned no task reference")))
}

/// `faultstring` of a SOAP fault, if the body carries one.
fn extract_fault(body: &str) -> Option<String> {
    if !body.contains("Fault") {
        return None;
    }
    let root = xml::parse(body).ok()?;
    let fault = root.find("Fault")?;
    let message = fault
        .child_text("faultstring")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            fault
                .child("detail")
                .and_then(|d| d.children.first())
                .map(|d| d.name.clone())
        })
        .unwrap_or_else(|| "Unknown SOAP fault".to_string());
    Some(message)
}

fn parse_service_content(resp: &XmlElement) -> VcenterResult<ServiceContent> {
    let rv = resp
        .child("returnval")
        .ok_or_else(|| VcenterError::parse("RetrieveServiceContent returned no content"))?;
    let field = |name: &str| {
        rv.child(name)
            .and_then(parse_mo_ref)
            .ok_or_else(|| VcenterError::parse(format!("ServiceContent is missing {name}")))
    };

    Ok(ServiceContent {
        session_manager: field("sessionManager")?,
        search_index: field("searchIndex")?,
        property_collector: field("propertyCollector")?,
        api_version: rv
            .child("about")
            .and_then(|a| a.child_text("apiVersion"))
            .map(str::to_string),
    })
}

/// `VirtualMachine.snapshot` from a RetrievePropertiesEx response.
fn parse_snapshot_info(resp: &XmlElement) -> VcenterResult<Vec<SnapshotNode>> {
    let val = resp
        .children_named("returnval")
        .flat_map(|rv| rv.children_named("objects"))
        .flat_map(|o| o.children_named("propSet"))
        .find(|p| p.child_text("name").map(str::trim) == Some("snapshot"))
        .and_then(|p| p.child("val"));

    match val {
        Some(info) => info
            .children_named("rootSnapshotList")
            .map(parse_snapshot_node)
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn parse_snapshot_node(el: &XmlElement) -> VcenterResult<SnapshotNode> {
    let snapshot = el
        .child("snapshot")
        .and_then(parse_mo_ref)
        .ok_or_else(|| VcenterError::parse("Snapshot tree node has no snapshot reference"))?;

    let children = el
        .children_named("childSnapshotList")
        .map(parse_snapshot_node)
        .collect::<VcenterResult<Vec<_>>>()?;

    Ok(SnapshotNode {
        name: el.child_text("name").unwrap_or_default().to_string(),
        description: el.child_text("description").unwrap_or_default().to_string(),
        snapshot,
        id: el.child_text("id").and_then(|s| s.trim().parse().ok()),
        create_time: el
            .child_text("createTime")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|t| t.with_timezone(&chrono::Utc)),
        state: el.child_text("state").map(|s| s.trim().to_string()),
        quiesced: el.child_text("quiesced").map(str::trim) == Some("true"),
        children,
    })
}

/// Task states keyed by task; `None` while queued or running.
fn parse_task_states(resp: &XmlElement) -> HashMap<ManagedObjectRef, Option<TaskState>> {
    let mut states = HashMap::new();
    for object in resp
        .children_named("returnval")
        .flat_map(|rv| rv.children_named("objects"))
    {
        let Some(task) = object.child("obj").and_then(parse_mo_ref) else {
            continue;
        };

        let mut state = None;
        let mut message = None;
        for prop in object.children_named("propSet") {
            let Some(val) = prop.child("val") else { continue };
            match prop.child_text("name").map(str::trim) {
                Some("info.state") => state = Some(val.text.trim().to_string()),
                Some("info.error") => {
                    message = val
                        .child_text("localizedMessage")
                        .map(str::to_string)
                        .or_else(|| {
                            val.child("fault")
                                .and_then(|f| f.attr("xsi:type"))
                                .map(str::to_string)
                        });
                }
                _ => {}
            }
        }

        let terminal = match state.as_deref() {
            Some("success") => Some(TaskState::Success),
            Some("error") => Some(TaskState::Error(
                message.unwrap_or_else(|| "task failed without a message".to_string()),
            )),
            _ => None,
        };
        states.insert(task, terminal);
    }
    states
}
