//! Scope disambiguation
//!
//! Policies and source secrets carry a `scope` block holding exactly one of
//! several sub-blocks. Construction picks the populated sub-block and tags
//! the resulting full name; flatten goes the other way.

use super::{invalid, populated_blocks, single_block, ResourceState};
use crate::schema::{Diagnostic, NestedBlock, SchemaAttribute, SchemaBlock};
use serde_json::json;
use tmc_models::cluster::{ClusterFullName, ATTACHED};
use tmc_models::scope::{
    ClusterGroupFullName, OrganizationFullName, Scope, ScopeKind, ScopedFullName,
    WorkspaceFullName,
};

pub const SCOPE: &str = "scope";

const ALL_KINDS: [ScopeKind; 4] = [
    ScopeKind::Cluster,
    ScopeKind::ClusterGroup,
    ScopeKind::Workspace,
    ScopeKind::Organization,
];

fn sub_block(kind: ScopeKind) -> SchemaBlock {
    match kind {
        ScopeKind::Cluster => SchemaBlock::new()
            .with_attribute(
                "management_cluster_name",
                SchemaAttribute::string()
                    .with_description("Name of the management cluster")
                    .optional()
                    .with_default(json!(ATTACHED)),
            )
            .with_attribute(
                "provisioner_name",
                SchemaAttribute::string()
                    .with_description("Provisioner of the cluster")
                    .optional()
                    .with_default(json!(ATTACHED)),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of this cluster")
                    .required(),
            )
            .with_description("The schema for cluster full name"),
        ScopeKind::ClusterGroup => SchemaBlock::new()
            .with_attribute(
                "cluster_group",
                SchemaAttribute::string()
                    .with_description("Name of the cluster group")
                    .required(),
            )
            .with_description("The schema for cluster group full name"),
        ScopeKind::Workspace => SchemaBlock::new()
            .with_attribute(
                "workspace",
                SchemaAttribute::string()
                    .with_description("Name of the workspace")
                    .required(),
            )
            .with_description("The schema for workspace full name"),
        ScopeKind::Organization => SchemaBlock::new()
            .with_attribute(
                "organization",
                SchemaAttribute::string()
                    .with_description("ID of the organization")
                    .required(),
            )
            .with_description("The schema for organization full name"),
    }
}

/// The `scope` block offering one sub-block per allowed kind
pub fn scope_block(allowed: &[ScopeKind]) -> NestedBlock {
    let mut block = SchemaBlock::new().with_description(&format!(
        "Scope for the resource, one of: {}",
        kind_list(allowed)
    ));
    for kind in allowed {
        block = block.with_block(kind.block_name(), NestedBlock::single(sub_block(*kind)));
    }
    NestedBlock::single(block).required().force_new()
}

fn kind_list(kinds: &[ScopeKind]) -> String {
    kinds
        .iter()
        .map(|k| k.block_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate the `scope` block without building anything
pub fn validate_scope(state: &ResourceState, allowed: &[ScopeKind]) -> Vec<Diagnostic> {
    match construct_scope(state, allowed, None) {
        Ok(_) => Vec::new(),
        Err(diags) => diags,
    }
}

/// Select the populated scope sub-block and build its full name.
///
/// Exactly one allowed sub-block must be populated.
pub fn construct_scope(
    state: &ResourceState,
    allowed: &[ScopeKind],
    org_id: Option<&str>,
) -> Result<Scope, Vec<Diagnostic>> {
    let block = state
        .get_block(SCOPE)
        .ok_or_else(|| vec![invalid(&[SCOPE], "scope block is required")])?;

    let names: Vec<&str> = ALL_KINDS.iter().map(|k| k.block_name()).collect();
    let populated = populated_blocks(&block, &names);

    let kinds: Vec<ScopeKind> = ALL_KINDS
        .iter()
        .copied()
        .filter(|k| populated.contains(&k.block_name()))
        .collect();

    if let Some(unsupported) = kinds.iter().find(|k| !allowed.contains(*k)) {
        return Err(vec![invalid(
            &[SCOPE, unsupported.block_name()],
            &format!(
                "{} scope is not supported for this resource, allowed scopes: {}",
                unsupported,
                kind_list(allowed)
            ),
        )]);
    }

    let kind = match kinds.as_slice() {
        [kind] => *kind,
        [] => {
            return Err(vec![invalid(
                &[SCOPE],
                &format!(
                    "no valid scope block found: one of {} must be specified",
                    kind_list(allowed)
                ),
            )])
        }
        many => {
            return Err(vec![invalid(
                &[SCOPE],
                &format!(
                    "found scopes: {}, but only one of {} is allowed",
                    kind_list(many),
                    kind_list(allowed)
                ),
            )])
        }
    };

    let sub = block.get_block(kind.block_name()).unwrap_or_default();
    let org_id = org_id.map(String::from);
    let required = |field: &str| {
        sub.get_non_empty(field).ok_or_else(|| {
            vec![invalid(
                &[SCOPE, kind.block_name(), field],
                &format!("{} is required in the {} scope", field, kind),
            )]
        })
    };

    let scope = match kind {
        ScopeKind::Cluster => Scope::Cluster(ClusterFullName {
            org_id,
            management_cluster_name: sub
                .get_non_empty("management_cluster_name")
                .unwrap_or_else(|| ATTACHED.to_string()),
            provisioner_name: sub
                .get_non_empty("provisioner_name")
                .unwrap_or_else(|| ATTACHED.to_string()),
            name: required("name")?,
        }),
        ScopeKind::ClusterGroup => Scope::ClusterGroup(ClusterGroupFullName {
            org_id,
            name: required("cluster_group")?,
        }),
        ScopeKind::Workspace => Scope::Workspace(WorkspaceFullName {
            org_id,
            name: required("workspace")?,
        }),
        ScopeKind::Organization => Scope::Organization(OrganizationFullName {
            org_id: Some(required("organization")?),
        }),
    };

    Ok(scope)
}

/// Flatten a tagged scope back into a `scope` block value
pub fn flatten_scope(scope: &Scope) -> serde_json::Value {
    let mut sub = ResourceState::new();
    match scope {
        Scope::Cluster(cluster) => {
            sub.set("management_cluster_name", json!(cluster.management_cluster_name));
            sub.set("provisioner_name", json!(cluster.provisioner_name));
            sub.set("name", json!(cluster.name));
        }
        Scope::ClusterGroup(group) => sub.set("cluster_group", json!(group.name)),
        Scope::Workspace(workspace) => sub.set("workspace", json!(workspace.name)),
        Scope::Organization(org) => {
            sub.set("organization", json!(org.org_id.clone().unwrap_or_default()))
        }
    }

    let mut block = ResourceState::new();
    block.set(scope.kind().block_name(), single_block(sub));
    single_block(block)
}

/// The scope a response reports for `full_name`.
///
/// Responses that name no parent decode as an organization scope without an
/// org id; `requested` is reported in that case.
pub fn reported_scope(full_name: &ScopedFullName, requested: &Scope) -> Scope {
    match full_name.scope() {
        Scope::Organization(OrganizationFullName { org_id: None }) => requested.clone(),
        scope => scope,
    }
}

/// Parse an import id of the form `<kind>:<parent>/<name>`.
///
/// Cluster parents are written `mc/provisioner/cluster`; organization parents
/// are written as the org id.
pub fn parse_scoped_import_id(id: &str, allowed: &[ScopeKind]) -> Result<(Scope, String), Vec<Diagnostic>> {
    let bad = || {
        vec![Diagnostic::error(&format!(
            "invalid import id {:?}, expected <scope>:<parent>/<name> with scope one of {}",
            id,
            kind_list(allowed)
        ))]
    };

    let (kind, rest) = id.split_once(':').ok_or_else(bad)?;
    let kind = allowed
        .iter()
        .copied()
        .find(|k| k.block_name() == kind)
        .ok_or_else(bad)?;
    let (parent, name) = rest.rsplit_once('/').ok_or_else(bad)?;
    if parent.is_empty() || name.is_empty() {
        return Err(bad());
    }

    let scope = match kind {
        ScopeKind::Cluster => {
            let parts: Vec<&str> = parent.split('/').collect();
            match parts.as_slice() {
                [mc, prov, cluster] => Scope::Cluster(ClusterFullName::new(mc, prov, cluster)),
                [cluster] => Scope::Cluster(ClusterFullName::new(ATTACHED, ATTACHED, cluster)),
                _ => return Err(bad()),
            }
        }
        ScopeKind::ClusterGroup => Scope::ClusterGroup(ClusterGroupFullName {
            org_id: None,
            name: parent.to_string(),
        }),
        ScopeKind::Workspace => Scope::Workspace(WorkspaceFullName {
            org_id: None,
            name: parent.to_string(),
        }),
        ScopeKind::Organization => Scope::Organization(OrganizationFullName {
            org_id: Some(parent.to_string()),
        }),
    };

    Ok((scope, name.to_string()))
}
