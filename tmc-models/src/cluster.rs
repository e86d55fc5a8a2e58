//! Cluster models

use crate::{Health, Meta, Phase};
use serde::{Deserialize, Serialize};

/// Management cluster and provisioner names used for attached clusters
pub const ATTACHED: &str = "attached";

/// Full name of a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub management_cluster_name: String,
    pub provisioner_name: String,
    pub name: String,
}

impl ClusterFullName {
    pub fn new(management_cluster_name: &str, provisioner_name: &str, name: &str) -> Self {
        Self {
            org_id: None,
            management_cluster_name: management_cluster_name.to_string(),
            provisioner_name: provisioner_name.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether this cluster was attached rather than provisioned
    pub fn is_attached(&self) -> bool {
        self.management_cluster_name == ATTACHED && self.provisioner_name == ATTACHED
    }
}

impl std::fmt::Display for ClusterFullName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.management_cluster_name, self.provisioner_name, self.name
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cluster_group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_registry: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesProvider {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub health: Health,
    /// Link to the agent installer manifest, populated after attach
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installer_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_provider: Option<KubernetesProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_server_version: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub full_name: ClusterFullName,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatus>,
}

impl Cluster {
    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

/// Create/update request and get/create response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRequest {
    pub cluster: Cluster,
}

pub type ClusterResponse = ClusterRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClustersResponse {
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub total_count: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_response_parses() {
        let resp: ClusterResponse = serde_json::from_value(serde_json::json!({
            "cluster": {
                "fullName": {
                    "orgId": "o",
                    "managementClusterName": "attached",
                    "provisionerName": "attached",
                    "name": "dev"
                },
                "meta": {"uid": "c:1"},
                "spec": {"clusterGroupName": "default"},
                "status": {
                    "phase": "READY",
                    "health": "HEALTHY",
                    "installerLink": "https://tmc.example.com/installer?id=1"
                }
            }
        }))
        .unwrap();

        assert!(resp.cluster.full_name.is_attached());
        assert_eq!(resp.cluster.phase(), Phase::Ready);
        assert_eq!(resp.cluster.spec.cluster_group_name, "default");
        assert_eq!(resp.cluster.full_name.to_string(), "attached/attached/dev");
    }

    #[test]
    fn test_cluster_without_status_has_unknown_phase() {
        let cluster = Cluster {
            full_name: ClusterFullName::new("mc", "prov", "c"),
            ..Default::default()
        };
        assert_eq!(cluster.phase(), Phase::Unknown);

        let json = serde_json::to_value(&ClusterRequest { cluster }).unwrap();
        assert!(json["cluster"].get("status").is_none());
    }
}
