//! Management cluster models

use crate::{parse_enum, Health, Meta, Phase};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub name: String,
}

/// Kubernetes distribution backing a management cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KubernetesProviderType {
    #[default]
    VmwareTanzuKubernetesGrid,
    VmwareTanzuKubernetesGridService,
    VmwareTanzuKubernetesGridHosted,
}

impl KubernetesProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VmwareTanzuKubernetesGrid => "VMWARE_TANZU_KUBERNETES_GRID",
            Self::VmwareTanzuKubernetesGridService => "VMWARE_TANZU_KUBERNETES_GRID_SERVICE",
            Self::VmwareTanzuKubernetesGridHosted => "VMWARE_TANZU_KUBERNETES_GRID_HOSTED",
        }
    }
}

impl FromStr for KubernetesProviderType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_enum("kubernetes_provider_type", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterSpec {
    pub kubernetes_provider_type: KubernetesProviderType,
    pub default_cluster_group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_workload_cluster_proxy_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_workload_cluster_image_registry: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub health: Health,
    /// Registration manifest URL for TKGm management clusters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementCluster {
    pub full_name: ManagementClusterFullName,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: ManagementClusterSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ManagementClusterStatus>,
}

impl ManagementCluster {
    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementClusterRequest {
    pub management_cluster: ManagementCluster,
}

pub type ManagementClusterResponse = ManagementClusterRequest;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_from_str() {
        let kind: KubernetesProviderType = "VMWARE_TANZU_KUBERNETES_GRID_SERVICE".parse().unwrap();
        assert_eq!(kind, KubernetesProviderType::VmwareTanzuKubernetesGridService);
        assert_eq!(kind.as_str(), "VMWARE_TANZU_KUBERNETES_GRID_SERVICE");

        assert!("EKS".parse::<KubernetesProviderType>().is_err());
    }

    #[test]
    fn test_request_envelope_key() {
        let request = ManagementClusterRequest {
            management_cluster: ManagementCluster {
                full_name: ManagementClusterFullName {
                    org_id: None,
                    name: "tkgm".to_string(),
                },
                spec: ManagementClusterSpec {
                    default_cluster_group: "default".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["managementCluster"]["fullName"]["name"], "tkgm");
        assert_eq!(
            json["managementCluster"]["spec"]["kubernetesProviderType"],
            "VMWARE_TANZU_KUBERNETES_GRID"
        );
    }
}
