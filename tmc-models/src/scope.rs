//! Scope full names for policies and source secrets
//!
//! A scoped entity hangs off exactly one parent: a cluster, a cluster group,
//! a workspace or the organization itself. On the wire the parent names are
//! flattened into the entity's full name.

use crate::cluster::ClusterFullName;
use serde::{Deserialize, Serialize};

/// Full name of a cluster group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGroupFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub name: String,
}

/// Full name of a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub name: String,
}

/// Full name of an organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

/// Which kind of parent a scoped entity is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Cluster,
    ClusterGroup,
    Workspace,
    Organization,
}

impl ScopeKind {
    /// Name of the matching Terraform scope block
    pub fn block_name(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::ClusterGroup => "cluster_group",
            Self::Workspace => "workspace",
            Self::Organization => "organization",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.block_name())
    }
}

/// Tagged parent of a scoped entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Cluster(ClusterFullName),
    ClusterGroup(ClusterGroupFullName),
    Workspace(WorkspaceFullName),
    Organization(OrganizationFullName),
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::Cluster(_) => ScopeKind::Cluster,
            Self::ClusterGroup(_) => ScopeKind::ClusterGroup,
            Self::Workspace(_) => ScopeKind::Workspace,
            Self::Organization(_) => ScopeKind::Organization,
        }
    }

    pub fn org_id(&self) -> Option<&str> {
        match self {
            Self::Cluster(f) => f.org_id.as_deref(),
            Self::ClusterGroup(f) => f.org_id.as_deref(),
            Self::Workspace(f) => f.org_id.as_deref(),
            Self::Organization(f) => f.org_id.as_deref(),
        }
    }
}

/// Wire full name of an entity attached to a [`Scope`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedFullName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    pub name: String,
}

impl ScopedFullName {
    pub fn new(scope: &Scope, name: impl Into<String>) -> Self {
        let mut full_name = Self {
            org_id: scope.org_id().map(String::from),
            name: name.into(),
            ..Default::default()
        };

        match scope {
            Scope::Cluster(cluster) => {
                full_name.management_cluster_name = Some(cluster.management_cluster_name.clone());
                full_name.provisioner_name = Some(cluster.provisioner_name.clone());
                full_name.cluster_name = Some(cluster.name.clone());
            }
            Scope::ClusterGroup(group) => {
                full_name.cluster_group_name = Some(group.name.clone());
            }
            Scope::Workspace(workspace) => {
                full_name.workspace_name = Some(workspace.name.clone());
            }
            Scope::Organization(_) => {}
        }

        full_name
    }

    /// Recover the parent from the flattened names.
    ///
    /// The most specific parent wins: a full name carrying a cluster name is
    /// cluster scoped even if other parent names leaked into the payload.
    pub fn scope(&self) -> Scope {
        let org_id = self.org_id.clone();

        if let Some(cluster_name) = &self.cluster_name {
            Scope::Cluster(ClusterFullName {
                org_id,
                management_cluster_name: self.management_cluster_name.clone().unwrap_or_default(),
                provisioner_name: self.provisioner_name.clone().unwrap_or_default(),
                name: cluster_name.clone(),
            })
        } else if let Some(group) = &self.cluster_group_name {
            Scope::ClusterGroup(ClusterGroupFullName {
                org_id,
                name: group.clone(),
            })
        } else if let Some(workspace) = &self.workspace_name {
            Scope::Workspace(WorkspaceFullName {
                org_id,
                name: workspace.clone(),
            })
        } else {
            Scope::Organization(OrganizationFullName { org_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_scope_flattens_parent_names() {
        let scope = Scope::Cluster(ClusterFullName {
            org_id: Some("org-1".to_string()),
            management_cluster_name: "attached".to_string(),
            provisioner_name: "attached".to_string(),
            name: "dev".to_string(),
        });

        let full_name = ScopedFullName::new(&scope, "baseline");
        let json = serde_json::to_value(&full_name).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "orgId": "org-1",
                "managementClusterName": "attached",
                "provisionerName": "attached",
                "clusterName": "dev",
                "name": "baseline"
            })
        );
        assert_eq!(full_name.scope(), scope);
    }

    #[test]
    fn test_organization_scope_when_no_parent() {
        let full_name: ScopedFullName =
            serde_json::from_value(serde_json::json!({"orgId": "o", "name": "p"})).unwrap();
        assert_eq!(full_name.scope().kind(), ScopeKind::Organization);
    }

    #[test]
    fn test_workspace_scope_round_trip() {
        let scope = Scope::Workspace(WorkspaceFullName {
            org_id: None,
            name: "ws".to_string(),
        });
        let full_name = ScopedFullName::new(&scope, "p");
        assert_eq!(full_name.workspace_name.as_deref(), Some("ws"));
        assert_eq!(full_name.scope(), scope);
        assert_eq!(scope.kind().to_string(), "workspace");
    }
}
