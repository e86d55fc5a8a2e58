//! Provisioner resource and data source

use super::meta::{construct_meta, flatten_meta, merge_meta, meta_block, META};
use super::{client_diagnostic, CreateOutcome, DataSource, Resource, ResourceResult, ResourceState};
use crate::client::TmcClient;
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde_json::json;
use tmc_models::provisioner::{Provisioner, ProvisionerFullName};
use tracing::debug;

const MANAGEMENT_CLUSTER: &str = "management_cluster";

fn schema_block(force_new: bool) -> SchemaBlock {
    let name_attr = |desc: &str| {
        let attr = SchemaAttribute::string().with_description(desc).required();
        if force_new {
            attr.force_new()
        } else {
            attr
        }
    };

    SchemaBlock::new()
        .with_attribute(
            "id",
            SchemaAttribute::string()
                .with_description("Unique identifier of the provisioner")
                .computed(),
        )
        .with_attribute(
            MANAGEMENT_CLUSTER,
            name_attr("Name of the management cluster"),
        )
        .with_attribute("name", name_attr("Name of the provisioner"))
        .with_block(META, meta_block())
}

fn construct_full_name(state: &ResourceState, org_id: Option<&str>) -> ProvisionerFullName {
    ProvisionerFullName {
        org_id: org_id.map(String::from),
        management_cluster_name: state.get_string(MANAGEMENT_CLUSTER).unwrap_or_default(),
        name: state.get_string("name").unwrap_or_default(),
    }
}

pub fn construct_provisioner(state: &ResourceState, org_id: Option<&str>) -> Provisioner {
    Provisioner {
        full_name: construct_full_name(state, org_id),
        meta: construct_meta(state),
    }
}

pub fn flatten_provisioner(provisioner: &Provisioner) -> ResourceState {
    let full_name = &provisioner.full_name;
    let mut state = ResourceState::new();
    state.set(
        "id",
        json!(provisioner.meta.uid.clone().unwrap_or_else(|| format!(
            "{}/{}",
            full_name.management_cluster_name, full_name.name
        ))),
    );
    state.set(MANAGEMENT_CLUSTER, json!(full_name.management_cluster_name));
    state.set("name", json!(full_name.name));
    state.set(META, flatten_meta(&provisioner.meta));
    state
}

fn describe(full_name: &ProvisionerFullName) -> String {
    format!(
        "provisioner entry, name : {}, management cluster : {}",
        full_name.name, full_name.management_cluster_name
    )
}

/// Provisioner resource
pub struct ProvisionerResource;

impl ProvisionerResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProvisionerResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for ProvisionerResource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_provisioner"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(
            0,
            schema_block(true).with_description("Tanzu Mission Control provisioner"),
        )
    }

    async fn create(
        &self,
        client: &TmcClient,
        planned: &ResourceState,
    ) -> ResourceResult<CreateOutcome> {
        let request = construct_provisioner(planned, client.org_id());
        debug!(provisioner = %request.full_name.name, "creating provisioner");

        let provisioner = client
            .create_provisioner(&request)
            .await
            .map_err(|e| client_diagnostic("create", &describe(&request.full_name), &e))?;
        Ok(flatten_provisioner(&provisioner).into())
    }

    async fn read(
        &self,
        client: &TmcClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(current, client.org_id());

        match client.get_provisioner(&full_name).await {
            Ok(provisioner) => Ok(flatten_provisioner(&provisioner)),
            Err(e) if e.is_not_found() => Ok(ResourceState::new()),
            Err(e) => Err(client_diagnostic("get", &describe(&full_name), &e)),
        }
    }

    async fn update(
        &self,
        client: &TmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(current, client.org_id());

        let mut provisioner = client
            .get_provisioner(&full_name)
            .await
            .map_err(|e| client_diagnostic("get", &describe(&full_name), &e))?;
        merge_meta(&mut provisioner.meta, &construct_meta(planned));

        let updated = client
            .update_provisioner(&provisioner)
            .await
            .map_err(|e| client_diagnostic("update", &describe(&full_name), &e))?;
        Ok(flatten_provisioner(&updated))
    }

    async fn delete(&self, client: &TmcClient, current: &ResourceState) -> ResourceResult<()> {
        let full_name = construct_full_name(current, client.org_id());
        debug!(provisioner = %full_name.name, "deleting provisioner");

        match client.delete_provisioner(&full_name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(client_diagnostic("delete", &describe(&full_name), &e)),
        }
    }

    fn import_state(&self, id: &str) -> ResourceResult<ResourceState> {
        match id.split_once('/') {
            Some((mc, name)) if !mc.is_empty() && !name.is_empty() && !name.contains('/') => {
                let mut state = ResourceState::new();
                state.set(MANAGEMENT_CLUSTER, json!(mc));
                state.set("name", json!(name));
                Ok(state)
            }
            _ => Err(vec![Diagnostic::error(&format!(
                "invalid import id {:?}, expected <management_cluster>/<name>",
                id
            ))]),
        }
    }
}

/// Provisioner data source
pub struct ProvisionerDataSource;

impl ProvisionerDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProvisionerDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for ProvisionerDataSource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_provisioner"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(
            0,
            schema_block(false).with_description("Look up a Tanzu Mission Control provisioner"),
        )
    }

    async fn read(
        &self,
        client: &TmcClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(config, client.org_id());
        let provisioner = client
            .get_provisioner(&full_name)
            .await
            .map_err(|e| client_diagnostic("get", &describe(&full_name), &e))?;
        Ok(flatten_provisioner(&provisioner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut state = ResourceState::new();
        state.set(MANAGEMENT_CLUSTER, json!("tkgs-mc"));
        state.set("name", json!("dev-ns"));
        state.set(META, json!([{"labels": {"team": "a"}}]));

        let provisioner = construct_provisioner(&state, None);
        let flattened = flatten_provisioner(&provisioner);
        assert_eq!(flattened.get_string("id"), Some("tkgs-mc/dev-ns".to_string()));
        assert_eq!(construct_provisioner(&flattened, None), provisioner);
    }

    #[test]
    fn test_import_id() {
        let resource = ProvisionerResource::new();
        let state = resource.import_state("tkgs-mc/dev-ns").unwrap();
        assert_eq!(state.get_string(MANAGEMENT_CLUSTER), Some("tkgs-mc".to_string()));
        assert_eq!(state.get_string("name"), Some("dev-ns".to_string()));

        assert!(resource.import_state("dev-ns").is_err());
        assert!(resource.import_state("a/b/c").is_err());
        assert!(resource.import_state("/dev-ns").is_err());
    }
}
