//! Folder inventory via the vSphere REST API.

use crate::error::VcenterResult;
use crate::types::Folder;
use crate::vsphere::VsphereClient;

use log::debug;
use serde_json::Value;

pub struct FolderManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> FolderManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    /// List folders, filtered by identity and/or parent when the slices are
    /// non-empty.
    pub async fn list_folders(
        &self,
        folders: &[Folder],
        parent_folders: &[Folder],
    ) -> VcenterResult<Vec<Folder>> {
        let params: Vec<(String, String)> = folders
            .iter()
            .map(|f| ("folders".to_string(), f.folder.clone()))
            .chain(
                parent_folders
                    .iter()
                    .map(|f| ("parent_folders".to_string(), f.folder.clone())),
            )
            .collect();

        let payloads: Vec<Value> = self
            .client
            .get_with_params("/api/vcenter/folder", &params)
            .await?;
        debug!("Listed {} folders", payloads.len());
        payloads.iter().map(Folder::from_payload).collect()
    }
}
