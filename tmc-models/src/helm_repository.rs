//! Helm repository models (read only)

use crate::{Meta, Phase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositoryFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub management_cluster_name: String,
    pub provisioner_name: String,
    pub cluster_name: String,
    pub namespace_name: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositorySpec {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositoryStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepository {
    pub full_name: HelmRepositoryFullName,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: HelmRepositorySpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HelmRepositoryStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositoryResponse {
    pub helm_repository: HelmRepository,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helm_repository_response() {
        let resp: HelmRepositoryResponse = serde_json::from_value(serde_json::json!({
            "helmRepository": {
                "fullName": {
                    "managementClusterName": "attached",
                    "provisionerName": "attached",
                    "clusterName": "dev",
                    "namespaceName": "tanzu-helm-resources",
                    "name": "bitnami"
                },
                "spec": {"url": "https://charts.bitnami.com/bitnami"},
                "status": {"phase": "READY", "disabled": false}
            }
        }))
        .unwrap();

        let repo = resp.helm_repository;
        assert_eq!(repo.full_name.namespace_name, "tanzu-helm-resources");
        assert_eq!(repo.spec.url, "https://charts.bitnami.com/bitnami");
        assert_eq!(repo.status.map(|s| s.phase), Some(Phase::Ready));
    }
}
