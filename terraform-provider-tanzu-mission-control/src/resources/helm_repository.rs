//! Helm repository data source

use super::meta::{flatten_meta, meta_block, META};
use super::scope::{construct_scope, flatten_scope, scope_block, validate_scope, SCOPE};
use super::{client_diagnostic, DataSource, ResourceResult, ResourceState};
use crate::client::TmcClient;
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde_json::json;
use tmc_models::helm_repository::{HelmRepository, HelmRepositoryFullName};
use tmc_models::scope::{Scope, ScopeKind};

const SCOPES: &[ScopeKind] = &[ScopeKind::Cluster];
const NAMESPACE_NAME: &str = "namespace_name";
const DEFAULT_NAMESPACE: &str = "tanzu-helm-resources";

fn construct_full_name(
    state: &ResourceState,
    org_id: Option<&str>,
) -> ResourceResult<(Scope, HelmRepositoryFullName)> {
    let scope = construct_scope(state, SCOPES, org_id)?;
    let Scope::Cluster(cluster) = &scope else {
        return Err(vec![Diagnostic::error("helm repositories are cluster scoped")]);
    };

    let full_name = HelmRepositoryFullName {
        org_id: cluster.org_id.clone(),
        management_cluster_name: cluster.management_cluster_name.clone(),
        provisioner_name: cluster.provisioner_name.clone(),
        cluster_name: cluster.name.clone(),
        namespace_name: state
            .get_non_empty(NAMESPACE_NAME)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        name: state.get_string("name").unwrap_or_default(),
    };
    Ok((scope, full_name))
}

pub fn flatten_helm_repository(repository: &HelmRepository, scope: &Scope) -> ResourceState {
    let status = repository.status.clone().unwrap_or_default();

    let mut state = ResourceState::new();
    state.set(
        "id",
        json!(repository
            .meta
            .uid
            .clone()
            .unwrap_or_else(|| repository.full_name.name.clone())),
    );
    state.set("name", json!(repository.full_name.name));
    state.set(NAMESPACE_NAME, json!(repository.full_name.namespace_name));
    state.set(SCOPE, flatten_scope(scope));
    state.set(META, flatten_meta(&repository.meta));
    state.set("url", json!(repository.spec.url));
    state.set("phase", json!(status.phase.to_string()));
    state.set("disabled", json!(status.disabled));
    state
}

/// Helm repository data source
pub struct HelmRepositoryDataSource;

impl HelmRepositoryDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HelmRepositoryDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for HelmRepositoryDataSource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_helm_repository"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Unique identifier of the Helm repository")
                    .computed(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the Helm repository")
                    .required(),
            )
            .with_attribute(
                NAMESPACE_NAME,
                SchemaAttribute::string()
                    .with_description("Namespace holding the Helm repository")
                    .optional()
                    .with_default(json!(DEFAULT_NAMESPACE)),
            )
            .with_attribute(
                "url",
                SchemaAttribute::string()
                    .with_description("Repository URL")
                    .computed(),
            )
            .with_attribute(
                "phase",
                SchemaAttribute::string()
                    .with_description("Phase of the Helm repository")
                    .computed(),
            )
            .with_attribute(
                "disabled",
                SchemaAttribute::bool()
                    .with_description("Whether the repository is disabled")
                    .computed(),
            )
            .with_block(SCOPE, scope_block(SCOPES))
            .with_block(META, meta_block())
            .with_description("Look up a Helm repository on a cluster");

        ResourceSchema::new(0, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        validate_scope(config, SCOPES)
    }

    async fn read(
        &self,
        client: &TmcClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (scope, full_name) = construct_full_name(config, client.org_id())?;
        let repository = client.get_helm_repository(&full_name).await.map_err(|e| {
            client_diagnostic(
                "get",
                &format!("helm repository entry, name : {}", full_name.name),
                &e,
            )
        })?;
        Ok(flatten_helm_repository(&repository, &scope))
    }
}
