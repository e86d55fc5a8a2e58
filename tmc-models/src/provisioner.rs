//! Provisioner models

use crate::Meta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub management_cluster_name: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioner {
    pub full_name: ProvisionerFullName,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerRequest {
    pub provisioner: Provisioner,
}

pub type ProvisionerResponse = ProvisionerRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProvisionersResponse {
    #[serde(default)]
    pub provisioners: Vec<Provisioner>,
    #[serde(default)]
    pub total_count: Option<String>,
}
